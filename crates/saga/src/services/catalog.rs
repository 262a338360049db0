//! Catalog lookup trait, in-memory fake, and HTTP client.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use common::{ProductId, SellerId};
use domain::{Money, ProductSnapshot, ProductSource};
use reqwest::StatusCode;
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::error::{Result, SagaError};

const COLLABORATOR: &str = "catalog";

/// Point-in-time product lookups.
#[async_trait]
pub trait CatalogService: Send + Sync {
    /// Returns the live snapshot of a product.
    ///
    /// Fails with `ProductUnavailable` when the catalog does not know it.
    async fn get_product(&self, product_id: ProductId) -> Result<ProductSnapshot>;
}

#[derive(Debug, Default)]
struct InMemoryCatalogState {
    products: HashMap<ProductId, ProductSnapshot>,
    fail: bool,
    delay: Option<Duration>,
    lookups: usize,
}

/// In-memory catalog for testing and local runs.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalogService {
    state: Arc<RwLock<InMemoryCatalogState>>,
}

impl InMemoryCatalogService {
    /// Creates a new empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a product.
    pub fn set_product(&self, product: ProductSnapshot) {
        self.write().products.insert(product.product_id, product);
    }

    /// Changes the live price of a known product.
    pub fn set_price(&self, product_id: ProductId, price: Money) {
        if let Some(product) = self.write().products.get_mut(&product_id) {
            product.price = price;
        }
    }

    /// Changes the availability of a known product.
    pub fn set_availability(&self, product_id: ProductId, is_available: bool) {
        if let Some(product) = self.write().products.get_mut(&product_id) {
            product.is_available = is_available;
        }
    }

    /// Configures every lookup to fail as if the catalog were down.
    pub fn set_fail(&self, fail: bool) {
        self.write().fail = fail;
    }

    /// Delays every lookup by `delay`.
    pub fn set_delay(&self, delay: Option<Duration>) {
        self.write().delay = delay;
    }

    /// Returns how many lookups were made.
    pub fn lookup_count(&self) -> usize {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .lookups
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, InMemoryCatalogState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl CatalogService for InMemoryCatalogService {
    async fn get_product(&self, product_id: ProductId) -> Result<ProductSnapshot> {
        let (delay, fail, product) = {
            let mut state = self.write();
            state.lookups += 1;
            (
                state.delay,
                state.fail,
                state.products.get(&product_id).cloned(),
            )
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if fail {
            return Err(SagaError::unavailable(COLLABORATOR, "catalog is down"));
        }
        product
            .map(ProductSnapshot::rounded)
            .ok_or(SagaError::ProductUnavailable(product_id))
    }
}

/// Catalog client for the product service's HTTP API.
///
/// Calls `GET {base_url}/api/products/{id}/taggable` with the caller's
/// service credentials.
#[derive(Debug, Clone)]
pub struct HttpCatalogService {
    client: reqwest::Client,
    base_url: String,
    service_name: String,
    service_secret: String,
}

#[derive(Debug, Deserialize)]
struct CatalogEnvelope {
    success: bool,
    data: Option<CatalogProduct>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CatalogProduct {
    id: ProductId,
    name: String,
    seller_id: Option<SellerId>,
    status: String,
    price: Decimal,
    primary_image_url: Option<String>,
    product_source: Option<String>,
}

impl CatalogProduct {
    fn into_snapshot(self) -> Result<ProductSnapshot> {
        let price = Money::new(self.price);
        if price.is_negative() {
            return Err(SagaError::unavailable(
                COLLABORATOR,
                format!("product {} has negative price {price}", self.id),
            ));
        }

        let mut snapshot = ProductSnapshot::new(self.id, self.name, price)
            .with_availability(self.status == "active");
        if let Some(seller_id) = self.seller_id {
            snapshot = snapshot.with_seller(seller_id);
        }
        if let Some(image_url) = self.primary_image_url {
            snapshot = snapshot.with_image(image_url);
        }
        snapshot.source = match self.product_source.as_deref() {
            Some("seller") => ProductSource::Seller,
            _ => ProductSource::Warehouse,
        };
        Ok(snapshot.rounded())
    }
}

impl HttpCatalogService {
    /// Creates a client for the catalog at `base_url`.
    pub fn new(
        base_url: impl Into<String>,
        service_name: impl Into<String>,
        service_secret: impl Into<String>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            service_name: service_name.into(),
            service_secret: service_secret.into(),
        }
    }

    fn product_url(&self, product_id: ProductId) -> String {
        format!(
            "{}/api/products/{}/taggable",
            self.base_url.trim_end_matches('/'),
            product_id
        )
    }
}

#[async_trait]
impl CatalogService for HttpCatalogService {
    #[tracing::instrument(skip(self))]
    async fn get_product(&self, product_id: ProductId) -> Result<ProductSnapshot> {
        let response = self
            .client
            .get(self.product_url(product_id))
            .header("x-service-name", &self.service_name)
            .header("x-service-auth", &self.service_secret)
            .send()
            .await
            .map_err(|e| SagaError::unavailable(COLLABORATOR, e))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(SagaError::ProductUnavailable(product_id));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SagaError::unavailable(
                COLLABORATOR,
                format!("returned {status}: {body}"),
            ));
        }

        let envelope: CatalogEnvelope = response
            .json()
            .await
            .map_err(|e| SagaError::unavailable(COLLABORATOR, e))?;

        match envelope.data {
            Some(product) if envelope.success => product.into_snapshot(),
            _ => Err(SagaError::ProductUnavailable(product_id)),
        }
    }
}
