//! Cart and cart line records.

use chrono::{DateTime, Utc};
use common::{BrandId, BuyerId, CartId, CartItemId, ProductId, SellerId, SessionToken, VariantId};
use serde::{Deserialize, Serialize};

use crate::{DomainError, Money};

use super::CartTotals;

/// Lifecycle status of a cart.
///
/// ```text
/// Active ──┬──► Converted
///          ├──► Merged      (guest cart folded into a buyer cart)
///          ├──► Abandoned
///          └──► Expired
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CartStatus {
    #[default]
    Active,
    Merged,
    Converted,
    Abandoned,
    Expired,
}

impl CartStatus {
    /// Returns true if lines may still be added to or removed from the cart.
    pub fn accepts_items(&self) -> bool {
        matches!(self, CartStatus::Active)
    }

    /// Returns the status name as stored.
    pub fn as_str(&self) -> &'static str {
        match self {
            CartStatus::Active => "active",
            CartStatus::Merged => "merged",
            CartStatus::Converted => "converted",
            CartStatus::Abandoned => "abandoned",
            CartStatus::Expired => "expired",
        }
    }
}

impl std::fmt::Display for CartStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for CartStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(CartStatus::Active),
            "merged" => Ok(CartStatus::Merged),
            "converted" => Ok(CartStatus::Converted),
            "abandoned" => Ok(CartStatus::Abandoned),
            "expired" => Ok(CartStatus::Expired),
            other => Err(DomainError::UnknownValue {
                kind: "cart status",
                value: other.to_string(),
            }),
        }
    }
}

/// Fulfillment source of a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemType {
    /// Platform-owned (warehouse) product.
    BrandProduct,
    /// Third-party seller product.
    SellerProduct,
}

impl ItemType {
    /// Returns the item type name as stored.
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemType::BrandProduct => "brand_product",
            ItemType::SellerProduct => "seller_product",
        }
    }
}

impl std::fmt::Display for ItemType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ItemType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "brand_product" => Ok(ItemType::BrandProduct),
            "seller_product" => Ok(ItemType::SellerProduct),
            other => Err(DomainError::UnknownValue {
                kind: "item type",
                value: other.to_string(),
            }),
        }
    }
}

/// Who a cart belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "id")]
pub enum CartOwner {
    /// A signed-in buyer.
    Buyer(BuyerId),
    /// An anonymous session.
    Guest(SessionToken),
}

impl CartOwner {
    /// Returns the buyer id if the owner is a signed-in buyer.
    pub fn buyer_id(&self) -> Option<BuyerId> {
        match self {
            CartOwner::Buyer(id) => Some(*id),
            CartOwner::Guest(_) => None,
        }
    }

    /// Returns the session token if the owner is a guest.
    pub fn session(&self) -> Option<&SessionToken> {
        match self {
            CartOwner::Buyer(_) => None,
            CartOwner::Guest(token) => Some(token),
        }
    }
}

impl From<BuyerId> for CartOwner {
    fn from(id: BuyerId) -> Self {
        CartOwner::Buyer(id)
    }
}

impl From<SessionToken> for CartOwner {
    fn from(token: SessionToken) -> Self {
        CartOwner::Guest(token)
    }
}

impl std::fmt::Display for CartOwner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CartOwner::Buyer(id) => write!(f, "buyer:{id}"),
            CartOwner::Guest(token) => write!(f, "guest:{token}"),
        }
    }
}

/// Descriptive product fields frozen when a line is first created.
///
/// Shared between cart lines and order lines; an order line copies these
/// verbatim from the cart line it was frozen from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ProductDetails {
    pub product_name: String,
    pub variant_name: Option<String>,
    pub sku: Option<String>,
    pub image_url: Option<String>,
    pub brand_name: Option<String>,
    pub seller_name: Option<String>,
}

/// Identity of a line within a cart: at most one line per key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LineKey {
    pub item_type: ItemType,
    pub product_id: ProductId,
}

/// A line in a cart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartItem {
    pub id: CartItemId,
    pub cart_id: CartId,
    pub item_type: ItemType,
    pub product_id: ProductId,
    pub variant_id: Option<VariantId>,
    pub brand_id: Option<BrandId>,
    pub seller_id: Option<SellerId>,
    pub quantity: u32,

    /// Frozen descriptive fields.
    pub details: ProductDetails,
    /// Unit price captured when the line was created. Never refreshed.
    pub snapshot_unit_price: Money,
    pub compare_price: Option<Money>,

    /// Live unit price as of the last touch.
    pub current_unit_price: Money,
    /// Whether the live price differed from the snapshot at the last touch.
    pub price_changed: bool,
    pub price_last_checked_at: DateTime<Utc>,
    pub is_available: bool,
    pub availability_message: Option<String>,

    pub added_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CartItem {
    /// Returns the key this line is merged on.
    pub fn key(&self) -> LineKey {
        LineKey {
            item_type: self.item_type,
            product_id: self.product_id,
        }
    }

    /// Returns the line subtotal at the current unit price.
    pub fn subtotal(&self) -> Money {
        self.current_unit_price.multiply(self.quantity)
    }
}

/// A cart with its lines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cart {
    pub id: CartId,
    pub owner: CartOwner,
    pub status: CartStatus,
    pub currency: String,

    /// Cached `Σ quantity`, maintained by totals recalculation.
    pub item_count: u32,
    /// Cached `Σ quantity * current_unit_price`, maintained by totals recalculation.
    pub subtotal: Money,

    pub items: Vec<CartItem>,

    pub last_activity_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Cart {
    /// Creates an empty active cart.
    pub fn new_active(owner: CartOwner, currency: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: CartId::new(),
            owner,
            status: CartStatus::Active,
            currency: currency.into(),
            item_count: 0,
            subtotal: Money::zero(),
            items: Vec::new(),
            last_activity_at: now,
            created_at: now,
            updated_at: now,
        }
    }

    /// Returns the owning buyer, if any.
    pub fn buyer_id(&self) -> Option<BuyerId> {
        self.owner.buyer_id()
    }

    /// Returns true if the cart has no lines.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Finds the line with the given key.
    pub fn find_line(&self, key: &LineKey) -> Option<&CartItem> {
        self.items.iter().find(|item| item.key() == *key)
    }

    /// Finds the line for a product regardless of item type.
    pub fn find_product(&self, product_id: ProductId) -> Option<&CartItem> {
        self.items.iter().find(|item| item.product_id == product_id)
    }

    /// Derives totals from the lines currently held.
    pub fn computed_totals(&self) -> Result<CartTotals, DomainError> {
        CartTotals::from_items(&self.items)
    }

    /// Overwrites the cached totals.
    pub fn apply_totals(&mut self, totals: CartTotals, now: DateTime<Utc>) {
        self.item_count = totals.item_count;
        self.subtotal = totals.subtotal;
        self.last_activity_at = now;
        self.updated_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cart_status_roundtrip_through_str() {
        for status in [
            CartStatus::Active,
            CartStatus::Merged,
            CartStatus::Converted,
            CartStatus::Abandoned,
            CartStatus::Expired,
        ] {
            assert_eq!(status.as_str().parse::<CartStatus>().unwrap(), status);
        }
        assert!("deleted".parse::<CartStatus>().is_err());
    }

    #[test]
    fn test_only_active_cart_accepts_items() {
        assert!(CartStatus::Active.accepts_items());
        assert!(!CartStatus::Merged.accepts_items());
        assert!(!CartStatus::Converted.accepts_items());
    }

    #[test]
    fn test_item_type_serializes_snake_case() {
        let json = serde_json::to_string(&ItemType::SellerProduct).unwrap();
        assert_eq!(json, "\"seller_product\"");
        assert_eq!("brand_product".parse::<ItemType>().unwrap(), ItemType::BrandProduct);
    }

    #[test]
    fn test_owner_accessors() {
        let buyer = BuyerId::new();
        assert_eq!(CartOwner::from(buyer).buyer_id(), Some(buyer));

        let guest = CartOwner::from(SessionToken::new("s-1"));
        assert_eq!(guest.buyer_id(), None);
        assert_eq!(guest.session().map(|s| s.as_str()), Some("s-1"));
    }

    #[test]
    fn test_new_active_cart_is_empty() {
        let cart = Cart::new_active(BuyerId::new().into(), "IDR", Utc::now());
        assert_eq!(cart.status, CartStatus::Active);
        assert!(cart.is_empty());
        assert_eq!(cart.item_count, 0);
        assert!(cart.subtotal.is_zero());
    }
}
