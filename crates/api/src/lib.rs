//! HTTP API server for the cart-to-order saga.
//!
//! Provides REST endpoints for carts, checkout, and order status, with
//! structured logging (tracing) and Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{delete, get, post};
use metrics_exporter_prometheus::PrometheusHandle;
use saga::{CartClient, CartService, CatalogService, CheckoutCoordinator, EventSink, OrderService, SagaConfig};
use storage::{CartStore, OrderStore, OutboxStore};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Everything the server needs from a storage engine.
pub trait Store: CartStore + OrderStore + OutboxStore + Clone + 'static {}

impl<T> Store for T where T: CartStore + OrderStore + OutboxStore + Clone + 'static {}

/// Shared application state accessible from all handlers.
pub struct AppState<S: Store> {
    pub cart_service: Arc<CartService<S>>,
    pub checkout: CheckoutCoordinator<S>,
    pub order_service: OrderService<S>,
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: Store>(state: Arc<AppState<S>>, metrics_handle: PrometheusHandle) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/cart", get(routes::cart::get::<S>))
        .route("/cart", delete(routes::cart::clear::<S>))
        .route("/cart/items", post(routes::cart::add_item::<S>))
        .route("/cart/items/{product_id}", delete(routes::cart::remove_item::<S>))
        .route("/cart/merge", post(routes::cart::merge::<S>))
        .route("/checkout", post(routes::checkout::create::<S>))
        .route("/orders", get(routes::orders::list::<S>))
        .route("/orders/{id}", get(routes::orders::get::<S>))
        .route("/orders/{id}/status", post(routes::orders::update_status::<S>))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Wires the cart, checkout, and order services over one store.
///
/// Checkout reads and clears carts through the cart service itself.
pub fn create_default_state<S: Store>(
    store: S,
    catalog: Arc<dyn CatalogService>,
    sink: Arc<dyn EventSink>,
    config: SagaConfig,
) -> Arc<AppState<S>> {
    let cart_service = Arc::new(CartService::new(store.clone(), catalog, config.clone()));
    let carts: Arc<dyn CartClient> = cart_service.clone();
    let checkout = CheckoutCoordinator::new(store.clone(), carts, sink, config);
    let order_service = OrderService::new(store);

    Arc::new(AppState {
        cart_service,
        checkout,
        order_service,
    })
}
