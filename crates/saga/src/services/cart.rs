//! Cart read/write capability consumed by checkout.

use async_trait::async_trait;
use common::{BuyerId, CartId};
use domain::{Cart, CartTotals};

use crate::error::Result;

/// The cart operations the order side is allowed to call.
#[async_trait]
pub trait CartClient: Send + Sync {
    /// Returns the buyer's active cart with its lines, or `None` when the
    /// buyer has none.
    async fn get_active_cart(&self, buyer_id: BuyerId) -> Result<Option<Cart>>;

    /// Deletes every line of a cart, returning how many were removed.
    async fn delete_all_items(&self, cart_id: CartId) -> Result<u64>;

    /// Re-derives a cart's cached totals from its lines.
    async fn recalculate_totals(&self, cart_id: CartId) -> Result<CartTotals>;
}
