//! Identifier types shared by the cart and order crates.

mod types;

pub use types::{
    BrandId, BuyerId, CartId, CartItemId, MessageId, OrderId, OrderItemId, ProductId, SellerId,
    SessionToken, VariantId,
};
