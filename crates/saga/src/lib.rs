//! Cart-to-order consistency saga.
//!
//! Each step commits on its own local transaction; nothing spans services:
//! 1. Add to cart: catalog lookup, merge-or-insert of the line, totals recalculation
//! 2. Checkout: cart snapshot read, order assembly, one transaction for the
//!    order, its lines, and its outbox message
//! 3. Post-commit: best-effort cart clear and event delivery
//!
//! Collaborators (catalog, cart API, event sink) are injected as traits so the
//! engines run against in-memory fakes as readily as against remote services.

pub mod cart_service;
pub mod checkout;
pub mod config;
pub mod error;
pub mod messages;
pub mod order_service;
pub mod post_commit;
pub mod relay;
pub mod services;

pub use cart_service::{CartService, CartView};
pub use checkout::{Checkout, CheckoutCoordinator, CheckoutOutcome};
pub use config::SagaConfig;
pub use error::{Result, SagaError};
pub use order_service::OrderService;
pub use post_commit::{PostCommitOrchestrator, PostCommitReport};
pub use relay::{OutboxRelay, RelayOutcome};
pub use services::{
    CartClient, CatalogService, EventSink, HttpCatalogService, InMemoryCatalogService,
    InMemoryEventSink, TracingEventSink,
};
