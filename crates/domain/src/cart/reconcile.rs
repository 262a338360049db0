//! Merge-or-insert decision for add-to-cart requests.

use chrono::{DateTime, Utc};
use common::{CartId, CartItemId};

use crate::catalog::ProductSnapshot;
use crate::{DomainError, Money};

use super::{Cart, CartItem, LineKey, ProductDetails};

/// Message recorded on a line whose product the catalog reports as unavailable.
pub const UNAVAILABLE_MESSAGE: &str = "product is not available";

/// Live values applied to an existing line when it is touched again.
#[derive(Debug, Clone, PartialEq)]
pub struct LineRefresh {
    /// Quantity to add to the line.
    pub quantity_delta: u32,
    pub live_unit_price: Money,
    pub is_available: bool,
    pub availability_message: Option<String>,
    pub checked_at: DateTime<Utc>,
}

impl LineRefresh {
    /// Builds a refresh from the catalog's current view of the product.
    pub fn from_snapshot(product: &ProductSnapshot, quantity_delta: u32, now: DateTime<Utc>) -> Self {
        Self {
            quantity_delta,
            live_unit_price: product.price,
            is_available: product.is_available,
            availability_message: availability_message(product.is_available),
            checked_at: now,
        }
    }
}

fn availability_message(is_available: bool) -> Option<String> {
    (!is_available).then(|| UNAVAILABLE_MESSAGE.to_string())
}

impl CartItem {
    /// Builds a fresh line whose snapshot equals the live catalog values.
    pub fn from_snapshot(
        cart_id: CartId,
        product: &ProductSnapshot,
        quantity: u32,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: CartItemId::new(),
            cart_id,
            item_type: product.item_type(),
            product_id: product.product_id,
            variant_id: product.variant_id,
            brand_id: product.brand_id,
            seller_id: product.seller_id,
            quantity,
            details: ProductDetails {
                product_name: product.name.clone(),
                variant_name: product.variant_name.clone(),
                sku: product.sku.clone(),
                image_url: product.image_url.clone(),
                brand_name: product.brand_name.clone(),
                seller_name: product.seller_name.clone(),
            },
            snapshot_unit_price: product.price,
            compare_price: product.compare_price,
            current_unit_price: product.price,
            price_changed: false,
            price_last_checked_at: now,
            is_available: product.is_available,
            availability_message: availability_message(product.is_available),
            added_at: now,
            updated_at: now,
        }
    }

    /// Copies the line into another cart under a fresh id, keeping its snapshot.
    pub fn transfer_to(&self, cart_id: CartId, now: DateTime<Utc>) -> Self {
        Self {
            id: CartItemId::new(),
            cart_id,
            updated_at: now,
            ..self.clone()
        }
    }

    /// Adds quantity and refreshes the drift and availability fields.
    ///
    /// The frozen snapshot (details and `snapshot_unit_price`) is left alone.
    /// Nothing changes when the new quantity would overflow.
    pub fn absorb(&mut self, refresh: &LineRefresh) -> Result<(), DomainError> {
        self.quantity = add_quantities(self.quantity, refresh.quantity_delta)?;
        self.price_changed = self.snapshot_unit_price != refresh.live_unit_price;
        self.current_unit_price = refresh.live_unit_price;
        self.is_available = refresh.is_available;
        self.availability_message = refresh.availability_message.clone();
        self.price_last_checked_at = refresh.checked_at;
        self.updated_at = refresh.checked_at;
        Ok(())
    }

    /// Folds another cart's matching line into this one.
    ///
    /// Only the quantity moves. This line's live price, drift flag and
    /// availability stay as they are, since the other line may have been
    /// checked against the catalog longer ago.
    pub fn absorb_line(&mut self, other: &CartItem, now: DateTime<Utc>) -> Result<(), DomainError> {
        self.quantity = add_quantities(self.quantity, other.quantity)?;
        self.updated_at = now;
        Ok(())
    }
}

/// Adds two line quantities, rejecting a sum that does not fit.
pub(crate) fn add_quantities(current: u32, delta: u32) -> Result<u32, DomainError> {
    current
        .checked_add(delta)
        .ok_or(DomainError::InvalidQuantity {
            quantity: i64::from(current) + i64::from(delta),
        })
}

/// Outcome of reconciling an add-to-cart request against a cart.
#[derive(Debug, Clone, PartialEq)]
pub enum Reconciliation {
    /// Merge into the existing line.
    Merge {
        item_id: CartItemId,
        refresh: LineRefresh,
    },
    /// Insert a new line.
    Insert(CartItem),
}

/// Validates a requested quantity.
pub fn validate_quantity(quantity: i64) -> Result<u32, DomainError> {
    if quantity < 1 {
        return Err(DomainError::InvalidQuantity { quantity });
    }
    u32::try_from(quantity).map_err(|_| DomainError::InvalidQuantity { quantity })
}

/// Decides how an add of `quantity` units of `product` lands in `cart`.
pub fn reconcile(
    cart: &Cart,
    product: &ProductSnapshot,
    quantity: u32,
    now: DateTime<Utc>,
) -> Result<Reconciliation, DomainError> {
    if quantity == 0 {
        return Err(DomainError::InvalidQuantity { quantity: 0 });
    }

    let key = LineKey {
        item_type: product.item_type(),
        product_id: product.product_id,
    };

    Ok(match cart.find_line(&key) {
        Some(existing) => Reconciliation::Merge {
            item_id: existing.id,
            refresh: LineRefresh::from_snapshot(product, quantity, now),
        },
        None => Reconciliation::Insert(CartItem::from_snapshot(cart.id, product, quantity, now)),
    })
}
