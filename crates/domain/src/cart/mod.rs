//! Cart data model, line reconciliation, and totals.

mod model;
mod reconcile;
mod totals;

pub use model::{Cart, CartItem, CartOwner, CartStatus, ItemType, LineKey, ProductDetails};
pub use reconcile::{
    LineRefresh, Reconciliation, UNAVAILABLE_MESSAGE, reconcile, validate_quantity,
};
pub use totals::CartTotals;
