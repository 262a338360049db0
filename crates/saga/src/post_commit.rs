//! Side effects that run after an order has committed.

use std::sync::Arc;
use std::time::Duration;

use domain::Order;
use storage::OutboxStore;

use crate::config::SagaConfig;
use crate::error::SagaError;
use crate::relay::OutboxRelay;
use crate::services::{CartClient, bounded};

pub const STEP_CLEAR_CART: &str = "clear_cart";
pub const STEP_PUBLISH_EVENT: &str = "publish_event";

/// What the post-commit steps achieved. Never turned into a caller error.
#[derive(Debug, Default)]
pub struct PostCommitReport {
    /// The source cart was emptied and its totals recomputed.
    pub cart_cleared: bool,

    /// Outbox messages handed to the sink during this run.
    pub events_delivered: usize,

    /// Steps that failed, as `PostCommitSideEffect` errors.
    pub failures: Vec<SagaError>,
}

impl PostCommitReport {
    /// Returns true if every step succeeded.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Best-effort follow-up after order creation.
///
/// Clears the source cart and pushes this order's outbox messages towards the
/// sink. Failures are logged and counted; the order stands regardless. The
/// relay's background loop picks up anything not delivered here, including
/// messages that belong to other orders.
pub struct PostCommitOrchestrator<S: OutboxStore> {
    carts: Arc<dyn CartClient>,
    relay: OutboxRelay<S>,
    cart_timeout: Duration,
    event_timeout: Duration,
}

impl<S: OutboxStore> PostCommitOrchestrator<S> {
    /// Creates a new orchestrator.
    pub fn new(carts: Arc<dyn CartClient>, relay: OutboxRelay<S>, config: &SagaConfig) -> Self {
        Self {
            carts,
            relay,
            cart_timeout: config.cart_timeout,
            event_timeout: config.event_timeout,
        }
    }

    /// Runs every post-commit step for a freshly created order.
    #[tracing::instrument(skip(self, order), fields(order_id = %order.id))]
    pub async fn run(&self, order: &Order) -> PostCommitReport {
        let mut report = PostCommitReport::default();

        if let Some(cart_id) = order.source_cart_id {
            let cleared = bounded("cart", self.cart_timeout, async {
                self.carts.delete_all_items(cart_id).await?;
                self.carts.recalculate_totals(cart_id).await
            })
            .await;

            match cleared {
                Ok(_) => report.cart_cleared = true,
                Err(e) => report.failures.push(side_effect_failed(order, STEP_CLEAR_CART, e)),
            }
        }

        let published = bounded(
            "events",
            self.event_timeout,
            self.relay.deliver_for_order(order.id),
        )
        .await;

        match published {
            Ok(outcome) => {
                report.events_delivered = outcome.delivered;
                if outcome.failed > 0 {
                    let reason = format!("{} message(s) left for redelivery", outcome.failed);
                    report
                        .failures
                        .push(side_effect_failed(order, STEP_PUBLISH_EVENT, reason));
                }
            }
            Err(e) => report
                .failures
                .push(side_effect_failed(order, STEP_PUBLISH_EVENT, e)),
        }

        report
    }
}

fn side_effect_failed(order: &Order, step: &'static str, reason: impl ToString) -> SagaError {
    let reason = reason.to_string();
    metrics::counter!("post_commit_failures_total", "step" => step).increment(1);
    tracing::warn!(
        order_id = %order.id,
        order_number = %order.order_number,
        step,
        %reason,
        "post-commit step failed"
    );
    SagaError::PostCommitSideEffect { step, reason }
}
