//! Saga error types.

use std::time::Duration;

use common::{OrderId, ProductId};
use domain::DomainError;
use storage::StorageError;
use thiserror::Error;

/// Errors that can occur while reconciling carts and assembling orders.
#[derive(Debug, Error)]
pub enum SagaError {
    /// The catalog does not know the product.
    #[error("Product unavailable: {0}")]
    ProductUnavailable(ProductId),

    /// The owner has no active cart.
    #[error("Cart not found for {0}")]
    CartNotFound(String),

    /// The active cart has no line for the product.
    #[error("Cart item not found for product {0}")]
    ItemNotFound(ProductId),

    /// Order not found.
    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    /// The request was rejected before any write.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A collaborator answered with an error or could not be reached.
    #[error("{collaborator} unavailable: {reason}")]
    UpstreamUnavailable {
        collaborator: &'static str,
        reason: String,
    },

    /// A collaborator did not answer within its time budget.
    #[error("{collaborator} timed out after {after:?}")]
    UpstreamTimeout {
        collaborator: &'static str,
        after: Duration,
    },

    /// Storage error.
    #[error("Persistence error: {0}")]
    Persistence(#[from] StorageError),

    /// A side effect after the order commit failed.
    #[error("Post-commit step '{step}' failed: {reason}")]
    PostCommitSideEffect { step: &'static str, reason: String },

    /// Checkout was attempted with nothing in the cart.
    #[error("Cart is empty")]
    EmptyCart,

    /// Domain error.
    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),
}

impl SagaError {
    pub(crate) fn unavailable(collaborator: &'static str, reason: impl ToString) -> Self {
        SagaError::UpstreamUnavailable {
            collaborator,
            reason: reason.to_string(),
        }
    }
}

/// Convenience type alias for saga results.
pub type Result<T> = std::result::Result<T, SagaError>;
