use async_trait::async_trait;
use common::{CartId, CartItemId};
use domain::{Cart, CartItem, CartOwner, CartStatus, CartTotals, LineRefresh};

use crate::Result;

/// Persistence contract for carts and their lines.
///
/// Every method is atomic on its own. No method takes a lock that outlives
/// the call, so callers compose them without cross-call transactions.
/// Multi-line changes that must not be seen half-done, such as a guest
/// merge, get a method of their own.
#[async_trait]
pub trait CartStore: Send + Sync {
    /// Returns the owner's active cart, creating an empty one if none exists.
    ///
    /// Concurrent calls for the same owner must all observe the same cart;
    /// at most one active cart per owner is ever stored.
    async fn get_or_create_active_cart(&self, owner: &CartOwner, currency: &str) -> Result<Cart>;

    /// Returns the owner's active cart with its lines, if any.
    async fn find_active_cart(&self, owner: &CartOwner) -> Result<Option<Cart>>;

    /// Returns a cart by id with its lines, whatever its status.
    async fn get_cart(&self, cart_id: CartId) -> Result<Option<Cart>>;

    /// Inserts a new line.
    ///
    /// Fails with `Conflict` if the cart already holds a line with the same
    /// item type and product.
    async fn insert_item(&self, item: CartItem) -> Result<CartItem>;

    /// Adds quantity to an existing line and refreshes its live fields in a
    /// single atomic write.
    async fn merge_item(&self, item_id: CartItemId, refresh: &LineRefresh) -> Result<CartItem>;

    /// Folds every line of the guest cart into the target cart and marks the
    /// guest cart `merged`, all or nothing.
    ///
    /// A guest line matching a target line adds its quantity and leaves the
    /// target line's live price and availability untouched; any other guest
    /// line moves across with its snapshot. Target totals are recomputed in
    /// the same write. Returns the number of lines folded, which is zero when
    /// the guest cart is no longer active, so a repeated merge changes nothing.
    async fn merge_carts(&self, guest_id: CartId, target_id: CartId) -> Result<usize>;

    /// Deletes one line.
    async fn remove_item(&self, cart_id: CartId, item_id: CartItemId) -> Result<()>;

    /// Deletes every line of a cart, returning how many were removed.
    async fn delete_all_items(&self, cart_id: CartId) -> Result<u64>;

    /// Re-derives the cached item count and subtotal from the stored lines
    /// and writes them, with a fresh last-activity time, in one statement.
    async fn recalculate_totals(&self, cart_id: CartId) -> Result<CartTotals>;

    /// Moves a cart to a new lifecycle status.
    async fn set_status(&self, cart_id: CartId, status: CartStatus) -> Result<()>;
}
