//! Persistence for carts, orders, and the order outbox.
//!
//! Each concern has its own trait (`CartStore`, `OrderStore`, `OutboxStore`)
//! with an in-memory engine for tests and local runs and a PostgreSQL engine
//! built on `sqlx`.

pub mod cart;
pub mod error;
pub mod memory;
pub mod order;
pub mod outbox;
pub mod postgres;

pub use cart::CartStore;
pub use error::{Result, StorageError};
pub use memory::InMemoryStore;
pub use order::{OrderQuery, OrderStore};
pub use outbox::{OutboxMessage, OutboxStore};
pub use postgres::PostgresStore;
