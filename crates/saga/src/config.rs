//! Runtime knobs for the cart and checkout services.

use std::time::Duration;

/// Settings shared by the cart, checkout, and relay services.
#[derive(Debug, Clone)]
pub struct SagaConfig {
    /// Upper bound on a catalog lookup.
    pub catalog_timeout: Duration,

    /// Upper bound on each cart read or write made during checkout.
    pub cart_timeout: Duration,

    /// Upper bound on handing a new order's messages to the sink after commit.
    pub event_timeout: Duration,

    /// Currency given to newly created carts.
    pub currency: String,

    /// Fail checkout with `EmptyCart` instead of creating a zero-item order.
    pub reject_empty_checkout: bool,

    /// How many order numbers to try before giving up on a collision.
    pub order_number_attempts: u32,

    /// Messages the relay reads per pass.
    pub outbox_batch_size: usize,

    /// Delivery attempts before a message is left alone.
    pub outbox_max_attempts: u32,

    /// Pause between relay passes.
    pub outbox_poll_interval: Duration,
}

impl Default for SagaConfig {
    fn default() -> Self {
        Self {
            catalog_timeout: Duration::from_secs(5),
            cart_timeout: Duration::from_secs(10),
            event_timeout: Duration::from_secs(5),
            currency: "IDR".to_string(),
            reject_empty_checkout: false,
            order_number_attempts: 5,
            outbox_batch_size: 100,
            outbox_max_attempts: 10,
            outbox_poll_interval: Duration::from_secs(1),
        }
    }
}
