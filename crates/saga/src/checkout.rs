//! Order assembly from the buyer's cart snapshot.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use common::{BuyerId, OrderId};
use domain::order::{CheckoutRequest, assemble_order};
use domain::{CustomerContact, Order, OrderNumber, ShippingAddress};
use storage::{OrderStore, OutboxStore, StorageError};

use crate::config::SagaConfig;
use crate::error::{Result, SagaError};
use crate::messages;
use crate::post_commit::{PostCommitOrchestrator, PostCommitReport};
use crate::relay::OutboxRelay;
use crate::services::{CartClient, EventSink, bounded};

/// A buyer's request to turn their cart into an order.
#[derive(Debug, Clone)]
pub struct Checkout {
    pub buyer_id: BuyerId,
    pub shipping_address: ShippingAddress,
    /// Defaults to the recipient on the shipping address.
    pub contact: Option<CustomerContact>,
}

impl Checkout {
    /// Creates a checkout shipping to `shipping_address`.
    pub fn new(buyer_id: BuyerId, shipping_address: ShippingAddress) -> Self {
        Self {
            buyer_id,
            shipping_address,
            contact: None,
        }
    }

    /// Sets a contact other than the recipient.
    pub fn with_contact(mut self, contact: CustomerContact) -> Self {
        self.contact = Some(contact);
        self
    }
}

/// The committed order and what happened after the commit.
#[derive(Debug)]
pub struct CheckoutOutcome {
    pub order: Order,
    pub post_commit: PostCommitReport,
}

/// Turns carts into orders.
///
/// The order, its lines, and its `order.created` message are written in one
/// local transaction. Everything after that is best-effort and never fails
/// the checkout.
pub struct CheckoutCoordinator<S>
where
    S: OrderStore + OutboxStore + Clone,
{
    store: S,
    carts: Arc<dyn CartClient>,
    post_commit: PostCommitOrchestrator<S>,
    config: SagaConfig,
}

impl<S> CheckoutCoordinator<S>
where
    S: OrderStore + OutboxStore + Clone,
{
    /// Creates a new checkout coordinator.
    pub fn new(
        store: S,
        carts: Arc<dyn CartClient>,
        sink: Arc<dyn EventSink>,
        config: SagaConfig,
    ) -> Self {
        let relay = OutboxRelay::new(store.clone(), sink, &config);
        let post_commit = PostCommitOrchestrator::new(carts.clone(), relay, &config);
        Self {
            store,
            carts,
            post_commit,
            config,
        }
    }

    /// Creates an order from the buyer's active cart.
    #[tracing::instrument(skip(self, checkout), fields(buyer_id = %checkout.buyer_id))]
    pub async fn checkout(&self, checkout: Checkout) -> Result<CheckoutOutcome> {
        metrics::counter!("checkout_total").increment(1);
        let started = Instant::now();

        let shipping_address = checkout.shipping_address.normalized()?;
        let contact = checkout
            .contact
            .unwrap_or_else(|| CustomerContact::from_address(&shipping_address));

        let cart = bounded(
            "cart",
            self.config.cart_timeout,
            self.carts.get_active_cart(checkout.buyer_id),
        )
        .await?;

        let has_items = cart.as_ref().is_some_and(|cart| !cart.is_empty());
        if !has_items {
            if self.config.reject_empty_checkout {
                return Err(SagaError::EmptyCart);
            }
            tracing::warn!("checkout with an empty cart produces a zero-item order");
        }

        let request = CheckoutRequest {
            buyer_id: checkout.buyer_id,
            shipping_address,
            contact,
            currency: self.config.currency.clone(),
        };

        let order = self.create_order(cart.as_ref(), request).await?;
        tracing::info!(
            order_id = %order.id,
            order_number = %order.order_number,
            items = order.items.len(),
            total = %order.total_amount,
            "order created"
        );

        let post_commit = self.post_commit.run(&order).await;

        metrics::histogram!("checkout_duration_seconds").record(started.elapsed().as_secs_f64());
        Ok(CheckoutOutcome { order, post_commit })
    }

    /// Writes the order, drawing a fresh order number on each collision.
    async fn create_order(
        &self,
        cart: Option<&domain::Cart>,
        request: CheckoutRequest,
    ) -> Result<Order> {
        let attempts = self.config.order_number_attempts.max(1);
        let mut attempt = 1;

        loop {
            let now = Utc::now();
            let new_order =
                assemble_order(cart, request.clone(), OrderNumber::generate(now), now);
            let id = OrderId::new();
            let message = messages::order_created(id, &new_order);

            match self.store.create_order(id, new_order, vec![message]).await {
                Ok(order) => return Ok(order),
                Err(StorageError::DuplicateOrderNumber(number)) if attempt < attempts => {
                    tracing::warn!(%number, attempt, "order number collision, retrying");
                    attempt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}
