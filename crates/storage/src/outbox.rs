use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::MessageId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::Result;

/// A domain notification waiting to be handed to the event sink.
///
/// Written in the same local transaction as the change it announces and
/// delivered afterwards by a relay, at least once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboxMessage {
    /// Unique identifier for this message.
    pub id: MessageId,

    /// Topic the message is published under (e.g., "order.created").
    pub topic: String,

    /// The record the message is about.
    pub aggregate_id: Uuid,

    /// The message body as JSON.
    pub payload: serde_json::Value,

    /// Delivery attempts made so far.
    pub attempts: u32,

    /// Error from the most recent failed attempt.
    pub last_error: Option<String>,

    pub created_at: DateTime<Utc>,
    pub delivered_at: Option<DateTime<Utc>>,
}

impl OutboxMessage {
    /// Creates an undelivered message stamped with the current time.
    pub fn new(
        topic: impl Into<String>,
        aggregate_id: impl Into<Uuid>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            id: MessageId::new(),
            topic: topic.into(),
            aggregate_id: aggregate_id.into(),
            payload,
            attempts: 0,
            last_error: None,
            created_at: Utc::now(),
            delivered_at: None,
        }
    }

    /// Returns true once the message has been handed to the sink.
    pub fn is_delivered(&self) -> bool {
        self.delivered_at.is_some()
    }
}

/// Persistence contract for the delivery side of the outbox.
///
/// Messages are written by `OrderStore`; this trait only reads and acknowledges them.
#[async_trait]
pub trait OutboxStore: Send + Sync {
    /// Returns undelivered messages with fewer than `max_attempts` attempts,
    /// oldest first.
    async fn pending(&self, limit: usize, max_attempts: u32) -> Result<Vec<OutboxMessage>>;

    /// Returns undelivered messages about one record with fewer than
    /// `max_attempts` attempts, oldest first.
    async fn pending_for(&self, aggregate_id: Uuid, max_attempts: u32) -> Result<Vec<OutboxMessage>>;

    /// Marks a message as delivered.
    async fn mark_delivered(&self, id: MessageId) -> Result<()>;

    /// Counts a failed attempt and records its error.
    async fn record_failure(&self, id: MessageId, error: &str) -> Result<()>;
}
