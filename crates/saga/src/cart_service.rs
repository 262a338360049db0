//! Cart reconciliation and totals service.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use common::{BuyerId, CartId, ProductId, SessionToken};
use domain::cart::{reconcile, validate_quantity};
use domain::{Cart, CartItem, CartOwner, CartTotals, LineRefresh, Money, Reconciliation};
use storage::{CartStore, StorageError};

use crate::config::SagaConfig;
use crate::error::{Result, SagaError};
use crate::services::{CartClient, CatalogService, bounded};

/// Buyer-facing rendering of a cart.
#[derive(Debug, Clone, PartialEq)]
pub struct CartView {
    pub id: Option<CartId>,
    pub buyer_id: Option<BuyerId>,
    pub item_count: u32,
    pub items: Vec<CartItem>,
    pub total: Money,
}

impl CartView {
    /// The view of an owner without an active cart.
    pub fn empty(owner: &CartOwner) -> Self {
        Self {
            id: None,
            buyer_id: owner.buyer_id(),
            item_count: 0,
            items: Vec::new(),
            total: Money::zero(),
        }
    }
}

impl From<Cart> for CartView {
    fn from(cart: Cart) -> Self {
        Self {
            id: Some(cart.id),
            buyer_id: cart.buyer_id(),
            item_count: cart.item_count,
            total: cart.subtotal,
            items: cart.items,
        }
    }
}

/// Applies add, remove, clear, and guest-merge requests to carts.
///
/// Every mutation ends with a totals recalculation over the stored lines.
pub struct CartService<S: CartStore> {
    store: S,
    catalog: Arc<dyn CatalogService>,
    config: SagaConfig,
}

impl<S: CartStore> CartService<S> {
    /// Creates a new cart service.
    pub fn new(store: S, catalog: Arc<dyn CatalogService>, config: SagaConfig) -> Self {
        Self {
            store,
            catalog,
            config,
        }
    }

    /// Adds `quantity` units of a product to the owner's active cart.
    ///
    /// The catalog is consulted before anything is written, so a failed or
    /// slow lookup leaves the cart untouched. Returns the updated cart.
    #[tracing::instrument(skip(self))]
    pub async fn add_to_cart(
        &self,
        owner: &CartOwner,
        product_id: ProductId,
        quantity: i64,
    ) -> Result<Cart> {
        metrics::counter!("cart_add_total").increment(1);
        let quantity = validate_quantity(quantity)?;

        let product = bounded(
            "catalog",
            self.config.catalog_timeout,
            self.catalog.get_product(product_id),
        )
        .await?;

        let cart = self
            .store
            .get_or_create_active_cart(owner, &self.config.currency)
            .await?;

        let now = Utc::now();
        match reconcile(&cart, &product, quantity, now)? {
            Reconciliation::Merge { item_id, refresh } => {
                self.store.merge_item(item_id, &refresh).await?;
                metrics::counter!("cart_merge_total").increment(1);
            }
            Reconciliation::Insert(item) => {
                let key = item.key();
                match self.store.insert_item(item).await {
                    Ok(_) => {
                        metrics::counter!("cart_item_created_total").increment(1);
                    }
                    Err(StorageError::Conflict(reason)) => {
                        // Another request created the line first.
                        tracing::debug!(%reason, "line insert raced, merging instead");
                        let current = self.load_cart(cart.id).await?;
                        let existing = current
                            .find_line(&key)
                            .ok_or(SagaError::ItemNotFound(product_id))?;
                        let refresh = LineRefresh::from_snapshot(&product, quantity, now);
                        self.store.merge_item(existing.id, &refresh).await?;
                        metrics::counter!("cart_merge_total").increment(1);
                    }
                    Err(e) => return Err(e.into()),
                }
            }
        }

        self.store.recalculate_totals(cart.id).await?;
        let cart = self.load_cart(cart.id).await?;
        tracing::info!(cart_id = %cart.id, item_count = cart.item_count, "item added to cart");
        Ok(cart)
    }

    /// Removes the product's line from the owner's active cart.
    #[tracing::instrument(skip(self))]
    pub async fn remove_from_cart(&self, owner: &CartOwner, product_id: ProductId) -> Result<Cart> {
        let cart = self
            .store
            .find_active_cart(owner)
            .await?
            .ok_or_else(|| SagaError::CartNotFound(owner.to_string()))?;

        let item = cart
            .find_product(product_id)
            .ok_or(SagaError::ItemNotFound(product_id))?;
        self.store.remove_item(cart.id, item.id).await?;

        self.store.recalculate_totals(cart.id).await?;
        self.load_cart(cart.id).await
    }

    /// Deletes every line of the owner's active cart. A missing cart is a no-op.
    #[tracing::instrument(skip(self))]
    pub async fn clear_cart(&self, owner: &CartOwner) -> Result<()> {
        let Some(cart) = self.store.find_active_cart(owner).await? else {
            return Ok(());
        };

        let removed = self.store.delete_all_items(cart.id).await?;
        self.store.recalculate_totals(cart.id).await?;
        tracing::info!(cart_id = %cart.id, removed, "cart cleared");
        Ok(())
    }

    /// Returns the owner's cart view, empty when there is no active cart.
    pub async fn get_cart(&self, owner: &CartOwner) -> Result<CartView> {
        Ok(self
            .store
            .find_active_cart(owner)
            .await?
            .map(CartView::from)
            .unwrap_or_else(|| CartView::empty(owner)))
    }

    /// Folds a guest session's cart into the buyer's active cart.
    ///
    /// Matching lines merge additively and keep the buyer line's live price;
    /// the rest move across with their snapshot. The guest cart ends up
    /// `merged`. The fold is a single store write, so a failed merge can be
    /// retried without counting any line twice.
    #[tracing::instrument(skip(self))]
    pub async fn merge_guest_cart(&self, session: &SessionToken, buyer_id: BuyerId) -> Result<Cart> {
        if session.as_str().trim().is_empty() {
            return Err(SagaError::Validation(
                "session token must not be empty".to_string(),
            ));
        }

        let buyer = CartOwner::Buyer(buyer_id);
        let target = self
            .store
            .get_or_create_active_cart(&buyer, &self.config.currency)
            .await?;

        let Some(guest) = self
            .store
            .find_active_cart(&CartOwner::Guest(session.clone()))
            .await?
        else {
            return Ok(target);
        };

        let lines = self.store.merge_carts(guest.id, target.id).await?;
        tracing::info!(
            guest_cart_id = %guest.id,
            cart_id = %target.id,
            lines,
            "guest cart merged"
        );
        self.load_cart(target.id).await
    }

    /// Re-derives a cart's totals from its stored lines.
    pub async fn recalculate_totals(&self, cart_id: CartId) -> Result<CartTotals> {
        Ok(self.store.recalculate_totals(cart_id).await?)
    }

    async fn load_cart(&self, cart_id: CartId) -> Result<Cart> {
        self.store
            .get_cart(cart_id)
            .await?
            .ok_or_else(|| SagaError::CartNotFound(cart_id.to_string()))
    }
}

#[async_trait]
impl<S: CartStore> CartClient for CartService<S> {
    async fn get_active_cart(&self, buyer_id: BuyerId) -> Result<Option<Cart>> {
        Ok(self
            .store
            .find_active_cart(&CartOwner::Buyer(buyer_id))
            .await?)
    }

    async fn delete_all_items(&self, cart_id: CartId) -> Result<u64> {
        Ok(self.store.delete_all_items(cart_id).await?)
    }

    async fn recalculate_totals(&self, cart_id: CartId) -> Result<CartTotals> {
        CartService::recalculate_totals(self, cart_id).await
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::services::InMemoryCatalogService;
    use domain::ProductSnapshot;
    use storage::InMemoryStore;

    fn setup() -> (
        CartService<InMemoryStore>,
        InMemoryStore,
        InMemoryCatalogService,
    ) {
        let store = InMemoryStore::new();
        let catalog = InMemoryCatalogService::new();
        let service = CartService::new(
            store.clone(),
            Arc::new(catalog.clone()),
            SagaConfig::default(),
        );
        (service, store, catalog)
    }

    fn stock(catalog: &InMemoryCatalogService, price: i64) -> ProductId {
        let product = ProductSnapshot::new(ProductId::new(), "Kopi Toraja", Money::from_major(price));
        let id = product.product_id;
        catalog.set_product(product);
        id
    }

    #[tokio::test]
    async fn test_add_creates_cart_and_line() {
        let (service, store, catalog) = setup();
        let owner = CartOwner::Buyer(BuyerId::new());
        let product = stock(&catalog, 100);

        let cart = service.add_to_cart(&owner, product, 2).await.unwrap();

        assert_eq!(cart.items.len(), 1);
        assert_eq!(cart.item_count, 2);
        assert_eq!(cart.subtotal, Money::from_major(200));
        assert!(!cart.items[0].price_changed);
        assert_eq!(store.active_cart_count(&owner).await, 1);
    }

    #[tokio::test]
    async fn test_add_again_merges_with_price_drift() {
        let (service, _, catalog) = setup();
        let owner = CartOwner::Buyer(BuyerId::new());
        let product = stock(&catalog, 100);

        service.add_to_cart(&owner, product, 2).await.unwrap();
        catalog.set_price(product, Money::from_major(120));
        let cart = service.add_to_cart(&owner, product, 1).await.unwrap();

        assert_eq!(cart.items.len(), 1);
        let line = &cart.items[0];
        assert_eq!(line.quantity, 3);
        assert_eq!(line.current_unit_price, Money::from_major(120));
        assert_eq!(line.snapshot_unit_price, Money::from_major(100));
        assert!(line.price_changed);
        assert_eq!(cart.subtotal, Money::from_major(360));
    }

    #[tokio::test]
    async fn test_invalid_quantity_rejected_before_lookup() {
        let (service, _, catalog) = setup();
        let owner = CartOwner::Buyer(BuyerId::new());
        let product = stock(&catalog, 100);

        let result = service.add_to_cart(&owner, product, 0).await;

        assert!(matches!(result, Err(SagaError::Domain(_))));
        assert_eq!(catalog.lookup_count(), 0);
    }

    #[tokio::test]
    async fn test_unknown_product_leaves_no_cart() {
        let (service, store, _) = setup();
        let owner = CartOwner::Buyer(BuyerId::new());

        let result = service.add_to_cart(&owner, ProductId::new(), 1).await;

        assert!(matches!(result, Err(SagaError::ProductUnavailable(_))));
        assert_eq!(store.active_cart_count(&owner).await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_catalog_timeout_leaves_no_cart() {
        let (service, store, catalog) = setup();
        let owner = CartOwner::Buyer(BuyerId::new());
        let product = stock(&catalog, 100);
        catalog.set_delay(Some(Duration::from_secs(30)));

        let result = service.add_to_cart(&owner, product, 1).await;

        assert!(matches!(
            result,
            Err(SagaError::UpstreamTimeout {
                collaborator: "catalog",
                ..
            })
        ));
        assert_eq!(store.active_cart_count(&owner).await, 0);
    }

    #[tokio::test]
    async fn test_unavailable_product_is_flagged() {
        let (service, _, catalog) = setup();
        let owner = CartOwner::Buyer(BuyerId::new());
        let product = stock(&catalog, 100);
        catalog.set_availability(product, false);

        let cart = service.add_to_cart(&owner, product, 1).await.unwrap();

        assert!(!cart.items[0].is_available);
        assert!(cart.items[0].availability_message.is_some());
    }

    #[tokio::test]
    async fn test_item_write_failure_keeps_totals_consistent() {
        let (service, store, catalog) = setup();
        let owner = CartOwner::Buyer(BuyerId::new());
        let product = stock(&catalog, 100);
        service.add_to_cart(&owner, product, 1).await.unwrap();

        store.set_fail_on_item_write(true);
        let result = service.add_to_cart(&owner, product, 5).await;
        assert!(matches!(result, Err(SagaError::Persistence(_))));

        let view = service.get_cart(&owner).await.unwrap();
        assert_eq!(view.item_count, 1);
        assert_eq!(view.total, Money::from_major(100));
    }

    #[tokio::test]
    async fn test_remove_and_clear() {
        let (service, _, catalog) = setup();
        let owner = CartOwner::Buyer(BuyerId::new());
        let first = stock(&catalog, 100);
        let second = stock(&catalog, 50);
        service.add_to_cart(&owner, first, 1).await.unwrap();
        service.add_to_cart(&owner, second, 2).await.unwrap();

        let cart = service.remove_from_cart(&owner, first).await.unwrap();
        assert_eq!(cart.items.len(), 1);
        assert_eq!(cart.subtotal, Money::from_major(100));

        let missing = service.remove_from_cart(&owner, first).await;
        assert!(matches!(missing, Err(SagaError::ItemNotFound(_))));

        service.clear_cart(&owner).await.unwrap();
        let view = service.get_cart(&owner).await.unwrap();
        assert!(view.id.is_some());
        assert!(view.items.is_empty());
        assert!(view.total.is_zero());
    }

    #[tokio::test]
    async fn test_remove_without_cart() {
        let (service, _, _) = setup();
        let owner = CartOwner::Buyer(BuyerId::new());

        let result = service.remove_from_cart(&owner, ProductId::new()).await;
        assert!(matches!(result, Err(SagaError::CartNotFound(_))));

        // Clearing a missing cart is fine.
        service.clear_cart(&owner).await.unwrap();
    }

    #[tokio::test]
    async fn test_get_cart_without_cart_is_empty_view() {
        let (service, _, _) = setup();
        let buyer = BuyerId::new();

        let view = service.get_cart(&CartOwner::Buyer(buyer)).await.unwrap();

        assert_eq!(view, CartView::empty(&CartOwner::Buyer(buyer)));
        assert_eq!(view.buyer_id, Some(buyer));
    }

    #[tokio::test]
    async fn test_merge_guest_cart() {
        let (service, store, catalog) = setup();
        let session = SessionToken::new("guest-abc");
        let guest = CartOwner::Guest(session.clone());
        let buyer = BuyerId::new();
        let shared = stock(&catalog, 100);
        let guest_only = stock(&catalog, 30);

        service
            .add_to_cart(&CartOwner::Buyer(buyer), shared, 1)
            .await
            .unwrap();
        service.add_to_cart(&guest, shared, 2).await.unwrap();
        service.add_to_cart(&guest, guest_only, 1).await.unwrap();

        let cart = service.merge_guest_cart(&session, buyer).await.unwrap();

        assert_eq!(cart.items.len(), 2);
        assert_eq!(cart.find_product(shared).unwrap().quantity, 3);
        assert_eq!(cart.item_count, 4);
        assert_eq!(cart.subtotal, Money::from_major(330));
        assert_eq!(store.active_cart_count(&guest).await, 0);
    }

    #[tokio::test]
    async fn test_merge_guest_cart_retry_after_failure_counts_once() {
        let (service, store, catalog) = setup();
        let session = SessionToken::new("guest-retry");
        let guest = CartOwner::Guest(session.clone());
        let buyer = BuyerId::new();
        let a = stock(&catalog, 10);
        let b = stock(&catalog, 20);

        for product in [a, b] {
            service
                .add_to_cart(&CartOwner::Buyer(buyer), product, 1)
                .await
                .unwrap();
            service.add_to_cart(&guest, product, 2).await.unwrap();
        }

        store.fail_next_merge_at_line(2);
        let failed = service.merge_guest_cart(&session, buyer).await;
        assert!(matches!(failed, Err(SagaError::Persistence(_))));

        let cart = service.merge_guest_cart(&session, buyer).await.unwrap();
        assert_eq!(cart.find_product(a).unwrap().quantity, 3);
        assert_eq!(cart.find_product(b).unwrap().quantity, 3);
        assert_eq!(cart.item_count, 6);
        assert_eq!(cart.subtotal, Money::from_major(90));

        // A third call finds nothing left to fold.
        let again = service.merge_guest_cart(&session, buyer).await.unwrap();
        assert_eq!(again.item_count, 6);
    }

    #[tokio::test]
    async fn test_merge_guest_cart_keeps_buyer_live_price() {
        let (service, _, catalog) = setup();
        let session = SessionToken::new("guest-stale");
        let buyer = BuyerId::new();
        let product = stock(&catalog, 100);

        // The guest added at the old price and left the line alone.
        service
            .add_to_cart(&CartOwner::Guest(session.clone()), product, 2)
            .await
            .unwrap();
        catalog.set_price(product, Money::from_major(120));
        service
            .add_to_cart(&CartOwner::Buyer(buyer), product, 1)
            .await
            .unwrap();

        let cart = service.merge_guest_cart(&session, buyer).await.unwrap();

        let line = cart.find_product(product).unwrap();
        assert_eq!(line.quantity, 3);
        assert_eq!(line.current_unit_price, Money::from_major(120));
        assert!(!line.price_changed);
        assert_eq!(cart.subtotal, Money::from_major(360));
    }

    #[tokio::test]
    async fn test_add_with_sub_cent_price_is_not_drift() {
        let (service, _, catalog) = setup();
        let owner = CartOwner::Buyer(BuyerId::new());
        let product = ProductSnapshot::new(
            ProductId::new(),
            "Gula Aren",
            Money::new(rust_decimal::Decimal::new(10_005, 3)),
        );
        let id = product.product_id;
        catalog.set_product(product);

        service.add_to_cart(&owner, id, 1).await.unwrap();
        let cart = service.add_to_cart(&owner, id, 1).await.unwrap();

        let line = &cart.items[0];
        assert_eq!(line.snapshot_unit_price.to_string(), "10.01");
        assert!(!line.price_changed);
        assert_eq!(cart.subtotal.to_string(), "20.02");
    }

    #[tokio::test]
    async fn test_merge_guest_cart_without_guest_cart() {
        let (service, _, _) = setup();
        let buyer = BuyerId::new();

        let cart = service
            .merge_guest_cart(&SessionToken::new("nobody"), buyer)
            .await
            .unwrap();

        assert!(cart.is_empty());
        assert_eq!(cart.buyer_id(), Some(buyer));
    }

    #[tokio::test]
    async fn test_merge_guest_cart_rejects_blank_session() {
        let (service, _, _) = setup();
        let result = service
            .merge_guest_cart(&SessionToken::new("  "), BuyerId::new())
            .await;
        assert!(matches!(result, Err(SagaError::Validation(_))));
    }

    #[tokio::test]
    async fn test_cart_client_reads_buyer_cart() {
        let (service, _, catalog) = setup();
        let buyer = BuyerId::new();
        let product = stock(&catalog, 10);

        assert!(service.get_active_cart(buyer).await.unwrap().is_none());

        service
            .add_to_cart(&CartOwner::Buyer(buyer), product, 3)
            .await
            .unwrap();
        let cart = service.get_active_cart(buyer).await.unwrap().unwrap();
        assert_eq!(cart.items.len(), 1);

        assert_eq!(service.delete_all_items(cart.id).await.unwrap(), 1);
        let totals = CartClient::recalculate_totals(&service, cart.id).await.unwrap();
        assert_eq!(totals, CartTotals::empty());
    }
}
