use thiserror::Error;

/// Errors that can occur when reading or writing cart, order, and outbox records.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The record does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// A uniqueness rule rejected the write, or a guarded update found the
    /// record in an unexpected state.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The order number is already taken.
    #[error("Duplicate order number: {0}")]
    DuplicateOrderNumber(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A stored value could not be mapped back onto the domain model.
    #[error("Invalid stored value: {0}")]
    Decode(String),

    /// A domain rule refused the write; nothing was changed.
    #[error("Rejected: {0}")]
    Rejected(domain::DomainError),

    /// The store could not be reached.
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl StorageError {
    pub(crate) fn not_found(entity: &'static str, id: impl std::fmt::Display) -> Self {
        StorageError::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

impl From<domain::DomainError> for StorageError {
    fn from(err: domain::DomainError) -> Self {
        StorageError::Decode(err.to_string())
    }
}

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;
