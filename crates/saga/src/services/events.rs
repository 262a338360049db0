//! Event sink trait and implementations.

use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{Result, SagaError};

/// Fire-and-forget notification channel keyed by topic.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Hands one notification to the sink.
    async fn publish(&self, topic: &str, payload: &Value) -> Result<()>;
}

#[derive(Debug, Default)]
struct InMemoryEventSinkState {
    published: Vec<(String, Value)>,
    fail: bool,
    fail_topics: Vec<String>,
    delay: Option<Duration>,
}

/// In-memory event sink for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryEventSink {
    state: Arc<RwLock<InMemoryEventSinkState>>,
}

impl InMemoryEventSink {
    /// Creates a new empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the sink to reject every publish.
    pub fn set_fail(&self, fail: bool) {
        self.state.write().unwrap_or_else(PoisonError::into_inner).fail = fail;
    }

    /// Configures the sink to reject publishes under `topic` only.
    pub fn fail_topic(&self, topic: &str) {
        self.state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .fail_topics
            .push(topic.to_string());
    }

    /// Makes every publish wait for `delay` before it is accepted.
    pub fn set_delay(&self, delay: Duration) {
        self.state.write().unwrap_or_else(PoisonError::into_inner).delay = Some(delay);
    }

    /// Returns every published (topic, payload) pair in order.
    pub fn published(&self) -> Vec<(String, Value)> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .published
            .clone()
    }

    /// Returns the payloads published under `topic`.
    pub fn published_on(&self, topic: &str) -> Vec<Value> {
        self.published()
            .into_iter()
            .filter(|(t, _)| t == topic)
            .map(|(_, payload)| payload)
            .collect()
    }
}

#[async_trait]
impl EventSink for InMemoryEventSink {
    async fn publish(&self, topic: &str, payload: &Value) -> Result<()> {
        let delay = self.state.read().unwrap_or_else(PoisonError::into_inner).delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if state.fail || state.fail_topics.iter().any(|t| t == topic) {
            return Err(SagaError::unavailable("event_sink", "sink rejected message"));
        }
        state.published.push((topic.to_string(), payload.clone()));
        Ok(())
    }
}

/// Sink that writes each notification to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEventSink;

#[async_trait]
impl EventSink for TracingEventSink {
    async fn publish(&self, topic: &str, payload: &Value) -> Result<()> {
        tracing::info!(topic, %payload, "event published");
        Ok(())
    }
}
