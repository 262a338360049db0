//! Order reads and status progression for order consumers.

use chrono::Utc;
use common::OrderId;
use domain::{Order, OrderStatus};
use storage::{OrderQuery, OrderStore};

use crate::error::{Result, SagaError};
use crate::messages;

/// Read access to persisted orders plus the status workflow.
pub struct OrderService<S: OrderStore> {
    store: S,
}

impl<S: OrderStore> OrderService<S> {
    /// Creates a new order service.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Returns an order with its lines.
    pub async fn get_order(&self, id: OrderId) -> Result<Order> {
        self.store
            .get_order(id)
            .await?
            .ok_or(SagaError::OrderNotFound(id))
    }

    /// Lists orders matching a query, newest first.
    pub async fn list_orders(&self, query: OrderQuery) -> Result<Vec<Order>> {
        Ok(self.store.list_orders(query).await?)
    }

    /// Moves an order to `to` and records an `order.status_changed` message
    /// in the same write.
    ///
    /// Fails with a conflict if another writer changed the status first.
    #[tracing::instrument(skip(self))]
    pub async fn advance_status(
        &self,
        id: OrderId,
        to: OrderStatus,
        reason: Option<String>,
        notes: Option<String>,
    ) -> Result<Order> {
        let mut order = self.get_order(id).await?;
        let from = order.advance(to, Utc::now())?;

        let message = messages::status_changed(&order, from, reason.as_deref(), notes.as_deref());
        self.store.save_status(&order, from, vec![message]).await?;

        tracing::info!(order_id = %id, %from, %to, "order status changed");
        Ok(order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::BuyerId;
    use domain::order::{CheckoutRequest, assemble_order};
    use domain::{CustomerContact, DomainError, OrderNumber, ShippingAddress};
    use storage::InMemoryStore;

    async fn seeded() -> (OrderService<InMemoryStore>, InMemoryStore, OrderId, BuyerId) {
        let store = InMemoryStore::new();
        let buyer = BuyerId::new();
        let address = ShippingAddress {
            recipient_name: "Dewi".to_string(),
            phone: "0812".to_string(),
            street: "Jl. Merdeka 1".to_string(),
            district: None,
            city: "Jakarta".to_string(),
            province: "DKI Jakarta".to_string(),
            postal_code: "10110".to_string(),
            country: "Indonesia".to_string(),
        };
        let request = CheckoutRequest {
            buyer_id: buyer,
            contact: CustomerContact::from_address(&address),
            shipping_address: address,
            currency: "IDR".to_string(),
        };
        let id = OrderId::new();
        let order = assemble_order(None, request, OrderNumber::generate(Utc::now()), Utc::now());
        store.create_order(id, order, vec![]).await.unwrap();
        (OrderService::new(store.clone()), store, id, buyer)
    }

    #[tokio::test]
    async fn test_get_and_list() {
        let (service, _, id, buyer) = seeded().await;

        assert_eq!(service.get_order(id).await.unwrap().id, id);
        assert_eq!(
            service
                .list_orders(OrderQuery::for_buyer(buyer))
                .await
                .unwrap()
                .len(),
            1
        );
        assert!(
            service
                .list_orders(OrderQuery::for_buyer(BuyerId::new()))
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn test_get_missing_order() {
        let (service, _, _, _) = seeded().await;
        let result = service.get_order(OrderId::new()).await;
        assert!(matches!(result, Err(SagaError::OrderNotFound(_))));
    }

    #[tokio::test]
    async fn test_advance_records_message_and_timestamp() {
        let (service, store, id, _) = seeded().await;

        let order = service
            .advance_status(id, OrderStatus::Paid, Some("payment settled".to_string()), None)
            .await
            .unwrap();

        assert_eq!(order.status, OrderStatus::Paid);
        assert!(order.paid_at.is_some());
        assert_eq!(service.get_order(id).await.unwrap().status, OrderStatus::Paid);

        let outbox = store.outbox_messages().await;
        assert_eq!(outbox.len(), 1);
        assert_eq!(outbox[0].topic, messages::ORDER_STATUS_CHANGED);
        assert_eq!(outbox[0].payload["fromStatus"], "pending");
    }

    #[tokio::test]
    async fn test_illegal_transition_rejected() {
        let (service, store, id, _) = seeded().await;

        let skipped = service
            .advance_status(id, OrderStatus::Shipped, None, None)
            .await;
        assert!(matches!(
            skipped,
            Err(SagaError::Domain(DomainError::InvalidStatusTransition { .. }))
        ));

        for status in [
            OrderStatus::Paid,
            OrderStatus::Processing,
            OrderStatus::ReadyToShip,
            OrderStatus::Shipped,
        ] {
            service.advance_status(id, status, None, None).await.unwrap();
        }

        let result = service
            .advance_status(id, OrderStatus::Cancelled, None, None)
            .await;

        assert!(matches!(
            result,
            Err(SagaError::Domain(DomainError::InvalidStatusTransition { .. }))
        ));
        assert_eq!(store.outbox_messages().await.len(), 4);
        assert_eq!(service.get_order(id).await.unwrap().status, OrderStatus::Shipped);
    }
}
