//! Cart-level aggregates derived from lines.

use serde::{Deserialize, Serialize};

use crate::{DomainError, Money};

use super::CartItem;
use super::reconcile::add_quantities;

/// Item count and subtotal of a cart.
///
/// Always computed from the full set of lines, never adjusted by deltas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct CartTotals {
    pub item_count: u32,
    pub subtotal: Money,
}

impl CartTotals {
    /// Totals of a cart with no lines.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Sums quantities and line subtotals.
    ///
    /// Fails with `InvalidQuantity` when the item count does not fit.
    pub fn from_items<'a>(
        items: impl IntoIterator<Item = &'a CartItem>,
    ) -> Result<Self, DomainError> {
        items.into_iter().try_fold(Self::empty(), |acc, item| {
            Ok(Self {
                item_count: add_quantities(acc.item_count, item.quantity)?,
                subtotal: acc.subtotal + item.subtotal(),
            })
        })
    }
}
