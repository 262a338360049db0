//! Outbox relay: hands stored messages to the event sink.

use std::sync::Arc;
use std::time::Duration;

use common::OrderId;
use storage::{OutboxMessage, OutboxStore};
use tokio::sync::watch;

use crate::config::SagaConfig;
use crate::error::Result;
use crate::services::EventSink;

/// Counts from one relay pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayOutcome {
    pub delivered: usize,
    pub failed: usize,
}

/// Delivers pending outbox messages at least once.
///
/// A message is marked delivered only after the sink accepted it, so a crash
/// between the two leads to a redelivery rather than a loss.
#[derive(Clone)]
pub struct OutboxRelay<S: OutboxStore> {
    store: S,
    sink: Arc<dyn EventSink>,
    batch_size: usize,
    max_attempts: u32,
    poll_interval: Duration,
}

impl<S: OutboxStore> OutboxRelay<S> {
    /// Creates a new relay.
    pub fn new(store: S, sink: Arc<dyn EventSink>, config: &SagaConfig) -> Self {
        Self {
            store,
            sink,
            batch_size: config.outbox_batch_size,
            max_attempts: config.outbox_max_attempts,
            poll_interval: config.outbox_poll_interval,
        }
    }

    /// Makes one delivery pass over the pending messages.
    #[tracing::instrument(skip(self))]
    pub async fn run_once(&self) -> Result<RelayOutcome> {
        let pending = self
            .store
            .pending(self.batch_size, self.max_attempts)
            .await?;
        self.deliver(pending).await
    }

    /// Delivers the pending messages about one order and nothing else.
    #[tracing::instrument(skip(self))]
    pub async fn deliver_for_order(&self, order_id: OrderId) -> Result<RelayOutcome> {
        let pending = self
            .store
            .pending_for(order_id.into(), self.max_attempts)
            .await?;
        self.deliver(pending).await
    }

    async fn deliver(&self, pending: Vec<OutboxMessage>) -> Result<RelayOutcome> {
        let mut outcome = RelayOutcome::default();
        for message in pending {
            match self.sink.publish(&message.topic, &message.payload).await {
                Ok(()) => {
                    self.store.mark_delivered(message.id).await?;
                    metrics::counter!("outbox_delivered_total").increment(1);
                    outcome.delivered += 1;
                }
                Err(e) => {
                    self.store.record_failure(message.id, &e.to_string()).await?;
                    metrics::counter!("outbox_failed_total").increment(1);
                    tracing::warn!(
                        message_id = %message.id,
                        topic = %message.topic,
                        attempts = message.attempts + 1,
                        error = %e,
                        "outbox delivery failed"
                    );
                    outcome.failed += 1;
                }
            }
        }
        Ok(outcome)
    }

    /// Polls until `shutdown` flips to true.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.poll_interval);
        tracing::info!(interval = ?self.poll_interval, "outbox relay started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.run_once().await {
                        tracing::error!(error = %e, "outbox relay pass failed");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        tracing::info!("outbox relay stopped");
    }
}
