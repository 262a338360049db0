//! Freezing a cart snapshot into an order.

use chrono::{DateTime, Utc};
use common::{BrandId, BuyerId, CartId, OrderId, OrderItemId, ProductId, SellerId, VariantId};
use serde::{Deserialize, Serialize};

use crate::Money;
use crate::cart::{Cart, CartItem, ItemType, ProductDetails};

use super::{
    CustomerContact, Order, OrderItem, OrderNumber, OrderSource, OrderStatus, ShippingAddress,
};

/// What the buyer supplies at checkout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutRequest {
    pub buyer_id: BuyerId,
    pub shipping_address: ShippingAddress,
    pub contact: CustomerContact,
    /// Currency used when there is no cart to take it from.
    pub currency: String,
}

/// An order line before it has been persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewOrderItem {
    pub item_type: ItemType,
    pub product_id: ProductId,
    pub variant_id: Option<VariantId>,
    pub brand_id: Option<BrandId>,
    pub seller_id: Option<SellerId>,
    pub details: ProductDetails,
    pub quantity: u32,
    pub unit_price: Money,
    pub subtotal: Money,
}

impl NewOrderItem {
    /// Freezes a cart line at its current unit price.
    pub fn freeze(item: &CartItem) -> Self {
        Self {
            item_type: item.item_type,
            product_id: item.product_id,
            variant_id: item.variant_id,
            brand_id: item.brand_id,
            seller_id: item.seller_id,
            details: item.details.clone(),
            quantity: item.quantity,
            unit_price: item.current_unit_price,
            subtotal: item.current_unit_price.multiply(item.quantity),
        }
    }
}

/// An order ready to be written in one transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewOrder {
    pub order_number: OrderNumber,
    pub buyer_id: BuyerId,
    pub source: OrderSource,
    pub currency: String,
    pub subtotal: Money,
    pub shipping_cost: Money,
    pub tax_amount: Money,
    pub discount_amount: Money,
    pub total_amount: Money,
    pub shipping_address: ShippingAddress,
    pub contact: CustomerContact,
    pub source_cart_id: Option<CartId>,
    pub items: Vec<NewOrderItem>,
    pub created_at: DateTime<Utc>,
}

impl NewOrder {
    /// Attaches the identity assigned by the store.
    pub fn persisted(self, id: OrderId) -> Order {
        let created_at = self.created_at;
        let items = self
            .items
            .into_iter()
            .map(|item| OrderItem {
                id: OrderItemId::new(),
                order_id: id,
                item_type: item.item_type,
                product_id: item.product_id,
                variant_id: item.variant_id,
                brand_id: item.brand_id,
                seller_id: item.seller_id,
                details: item.details,
                quantity: item.quantity,
                unit_price: item.unit_price,
                subtotal: item.subtotal,
                created_at,
            })
            .collect();

        Order {
            id,
            order_number: self.order_number,
            buyer_id: self.buyer_id,
            source: self.source,
            status: OrderStatus::Pending,
            currency: self.currency,
            subtotal: self.subtotal,
            shipping_cost: self.shipping_cost,
            tax_amount: self.tax_amount,
            discount_amount: self.discount_amount,
            total_amount: self.total_amount,
            shipping_address: self.shipping_address,
            contact: self.contact,
            source_cart_id: self.source_cart_id,
            items,
            paid_at: None,
            shipped_at: None,
            delivered_at: None,
            cancelled_at: None,
            created_at,
            updated_at: created_at,
        }
    }
}

/// Builds an order from the buyer's cart snapshot.
///
/// A missing cart is treated the same as an empty one. The order source is
/// `Seller` as soon as any line is seller-owned.
pub fn assemble_order(
    cart: Option<&Cart>,
    request: CheckoutRequest,
    order_number: OrderNumber,
    now: DateTime<Utc>,
) -> NewOrder {
    let lines: &[CartItem] = cart.map(|c| c.items.as_slice()).unwrap_or_default();

    let items: Vec<NewOrderItem> = lines.iter().map(NewOrderItem::freeze).collect();
    let subtotal: Money = items.iter().map(|item| item.subtotal).sum();
    let source = if items
        .iter()
        .any(|item| item.item_type == ItemType::SellerProduct)
    {
        OrderSource::Seller
    } else {
        OrderSource::Brand
    };

    let shipping_cost = Money::zero();
    let tax_amount = Money::zero();
    let discount_amount = Money::zero();

    NewOrder {
        order_number,
        buyer_id: request.buyer_id,
        source,
        currency: cart
            .map(|c| c.currency.clone())
            .unwrap_or(request.currency),
        subtotal,
        shipping_cost,
        tax_amount,
        discount_amount,
        total_amount: subtotal + shipping_cost + tax_amount - discount_amount,
        shipping_address: request.shipping_address,
        contact: request.contact,
        source_cart_id: cart.map(|c| c.id),
        items,
        created_at: now,
    }
}
