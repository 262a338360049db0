//! API server entry point.

use std::error::Error;
use std::sync::Arc;

use api::Store;
use api::config::Config;
use metrics_exporter_prometheus::PrometheusHandle;
use saga::{
    CatalogService, EventSink, HttpCatalogService, InMemoryCatalogService, OutboxRelay,
    TracingEventSink,
};
use storage::{InMemoryStore, PostgresStore};
use tokio::signal;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    if config.log_json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Runs the HTTP server and the outbox relay until shutdown.
async fn serve<S: Store>(
    store: S,
    config: Config,
    metrics_handle: PrometheusHandle,
) -> Result<(), Box<dyn Error>> {
    let saga_config = config.saga_config();

    let catalog: Arc<dyn CatalogService> = match &config.catalog_url {
        Some(url) => {
            tracing::info!(%url, "using remote catalog");
            Arc::new(HttpCatalogService::new(
                url.as_str(),
                config.service_name.as_str(),
                config.service_secret.as_str(),
            ))
        }
        None => {
            tracing::warn!("CATALOG_URL not set, using an empty in-memory catalog");
            Arc::new(InMemoryCatalogService::new())
        }
    };
    let sink: Arc<dyn EventSink> = Arc::new(TracingEventSink);

    let relay = OutboxRelay::new(store.clone(), sink.clone(), &saga_config);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let relay_task = tokio::spawn(async move { relay.run(shutdown_rx).await });

    let state = api::create_default_state(store, catalog, sink, saga_config);
    let app = api::create_app(state, metrics_handle);

    let addr = config.addr();
    tracing::info!(%addr, "starting API server");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // The receiver may already be gone if the relay task panicked.
    let _ = shutdown_tx.send(true);
    if let Err(e) = relay_task.await {
        tracing::error!(error = %e, "outbox relay task failed");
    }

    tracing::info!("server shut down gracefully");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let config = Config::from_env();

    // 1. Initialize tracing
    init_tracing(&config);

    // 2. Install Prometheus metrics recorder
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new().install_recorder()?;

    // 3. Pick the storage engine and serve
    match config.database_url.clone() {
        Some(url) => {
            let store = PostgresStore::connect(&url).await?;
            store.run_migrations().await?;
            tracing::info!("connected to PostgreSQL, migrations applied");
            serve(store, config, metrics_handle).await
        }
        None => {
            tracing::warn!("DATABASE_URL not set, carts and orders live in memory");
            serve(InMemoryStore::new(), config, metrics_handle).await
        }
    }
}
