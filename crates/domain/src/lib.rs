//! Domain layer for the cart-to-order saga.
//!
//! This crate is free of I/O. It provides:
//! - `Money` and the catalog's `ProductSnapshot`
//! - Cart records, the merge-or-insert reconciliation rule, and totals
//! - Order records, the status progression, and assembly of an order from a cart

pub mod cart;
pub mod catalog;
pub mod error;
pub mod money;
pub mod order;

pub use cart::{
    Cart, CartItem, CartOwner, CartStatus, CartTotals, ItemType, LineKey, LineRefresh,
    ProductDetails, Reconciliation,
};
pub use catalog::{ProductSnapshot, ProductSource};
pub use error::DomainError;
pub use money::Money;
pub use order::{
    CheckoutRequest, CustomerContact, NewOrder, NewOrderItem, Order, OrderItem, OrderNumber,
    OrderSource, OrderStatus, ShippingAddress,
};
