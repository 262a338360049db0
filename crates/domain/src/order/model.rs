//! Order and order line records.

use chrono::{DateTime, Utc};
use common::{BrandId, BuyerId, CartId, OrderId, OrderItemId, ProductId, SellerId, VariantId};
use serde::{Deserialize, Serialize};

use crate::cart::{ItemType, ProductDetails};
use crate::{DomainError, Money};

use super::{CustomerContact, OrderNumber, OrderStatus, ShippingAddress};

/// Whether an order is fulfilled by the platform or by a seller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OrderSource {
    #[default]
    Brand,
    Seller,
}

impl OrderSource {
    /// Returns the source name as stored.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderSource::Brand => "brand",
            OrderSource::Seller => "seller",
        }
    }
}

impl std::fmt::Display for OrderSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for OrderSource {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "brand" => Ok(OrderSource::Brand),
            "seller" => Ok(OrderSource::Seller),
            other => Err(DomainError::UnknownValue {
                kind: "order source",
                value: other.to_string(),
            }),
        }
    }
}

/// A frozen order line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: OrderItemId,
    pub order_id: OrderId,
    pub item_type: ItemType,
    pub product_id: ProductId,
    pub variant_id: Option<VariantId>,
    pub brand_id: Option<BrandId>,
    pub seller_id: Option<SellerId>,
    pub details: ProductDetails,
    pub quantity: u32,
    pub unit_price: Money,
    pub subtotal: Money,
    pub created_at: DateTime<Utc>,
}

/// A persisted order with its lines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub order_number: OrderNumber,
    pub buyer_id: BuyerId,
    pub source: OrderSource,
    pub status: OrderStatus,
    pub currency: String,

    pub subtotal: Money,
    pub shipping_cost: Money,
    pub tax_amount: Money,
    pub discount_amount: Money,
    pub total_amount: Money,

    pub shipping_address: ShippingAddress,
    pub contact: CustomerContact,
    /// Cart the order was assembled from, if there was one.
    pub source_cart_id: Option<CartId>,

    pub items: Vec<OrderItem>,

    pub paid_at: Option<DateTime<Utc>>,
    pub shipped_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Returns true if any line is fulfilled by the given seller.
    pub fn involves_seller(&self, seller_id: SellerId) -> bool {
        self.items
            .iter()
            .any(|item| item.seller_id == Some(seller_id))
    }

    /// Moves the order to a new status and stamps the matching timestamp.
    ///
    /// Returns the previous status.
    pub fn advance(&mut self, to: OrderStatus, now: DateTime<Utc>) -> Result<OrderStatus, DomainError> {
        let from = self.status;
        self.status = from.transition_to(to)?;
        match to {
            OrderStatus::Paid => self.paid_at = Some(now),
            OrderStatus::Shipped => self.shipped_at = Some(now),
            OrderStatus::Delivered => self.delivered_at = Some(now),
            OrderStatus::Cancelled => self.cancelled_at = Some(now),
            _ => {}
        }
        self.updated_at = now;
        Ok(from)
    }
}
