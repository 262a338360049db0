//! Collaborator capability traits and their implementations.

pub mod cart;
pub mod catalog;
pub mod events;

use std::future::Future;
use std::time::Duration;

pub use cart::CartClient;
pub use catalog::{CatalogService, HttpCatalogService, InMemoryCatalogService};
pub use events::{EventSink, InMemoryEventSink, TracingEventSink};

use crate::error::{Result, SagaError};

/// Runs a collaborator call, turning an overrun into `UpstreamTimeout`.
pub(crate) async fn bounded<T>(
    collaborator: &'static str,
    after: Duration,
    call: impl Future<Output = Result<T>>,
) -> Result<T> {
    match tokio::time::timeout(after, call).await {
        Ok(result) => result,
        Err(_) => {
            metrics::counter!("upstream_timeouts_total", "collaborator" => collaborator)
                .increment(1);
            tracing::warn!(collaborator, ?after, "upstream call timed out");
            Err(SagaError::UpstreamTimeout {
                collaborator,
                after,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_bounded_times_out() {
        let result: Result<()> = bounded("catalog", Duration::from_millis(50), async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            Ok(())
        })
        .await;

        assert!(matches!(
            result,
            Err(SagaError::UpstreamTimeout {
                collaborator: "catalog",
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_bounded_passes_through() {
        let result = bounded("cart", Duration::from_secs(1), async { Ok(7) }).await;
        assert_eq!(result.unwrap(), 7);
    }
}
