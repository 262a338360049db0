use async_trait::async_trait;
use common::{BuyerId, OrderId, SellerId};
use domain::{NewOrder, Order, OrderStatus};

use crate::{OutboxMessage, Result};

/// Filter for listing orders.
///
/// Results are ordered newest first.
#[derive(Debug, Clone, Default)]
pub struct OrderQuery {
    /// Only orders placed by this buyer.
    pub buyer_id: Option<BuyerId>,

    /// Only orders with at least one line from this seller.
    pub seller_id: Option<SellerId>,

    /// Only orders in this status.
    pub status: Option<OrderStatus>,

    /// Maximum number of orders to return.
    pub limit: Option<usize>,

    /// Number of orders to skip.
    pub offset: Option<usize>,
}

impl OrderQuery {
    /// Creates a new empty query.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a query for one buyer's orders.
    pub fn for_buyer(buyer_id: BuyerId) -> Self {
        Self {
            buyer_id: Some(buyer_id),
            ..Default::default()
        }
    }

    /// Creates a query for orders containing a seller's lines.
    pub fn for_seller(seller_id: SellerId) -> Self {
        Self {
            seller_id: Some(seller_id),
            ..Default::default()
        }
    }

    /// Filters by buyer.
    pub fn buyer_id(mut self, buyer_id: BuyerId) -> Self {
        self.buyer_id = Some(buyer_id);
        self
    }

    /// Filters by seller.
    pub fn seller_id(mut self, seller_id: SellerId) -> Self {
        self.seller_id = Some(seller_id);
        self
    }

    /// Filters by status.
    pub fn status(mut self, status: OrderStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Limits the number of results.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Skips the first `offset` results.
    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Returns true if the order passes every filter (limit/offset excluded).
    pub fn matches(&self, order: &Order) -> bool {
        if let Some(buyer_id) = self.buyer_id
            && order.buyer_id != buyer_id
        {
            return false;
        }
        if let Some(seller_id) = self.seller_id
            && !order.involves_seller(seller_id)
        {
            return false;
        }
        if let Some(status) = self.status
            && order.status != status
        {
            return false;
        }
        true
    }
}

/// Persistence contract for orders.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Writes the order row, its lines, and the given outbox messages in one
    /// local transaction. Nothing is written if any part fails.
    ///
    /// Fails with `DuplicateOrderNumber` if the order number is taken.
    async fn create_order(
        &self,
        id: OrderId,
        order: NewOrder,
        messages: Vec<OutboxMessage>,
    ) -> Result<Order>;

    /// Returns an order with its lines.
    async fn get_order(&self, id: OrderId) -> Result<Option<Order>>;

    /// Lists orders matching a query.
    async fn list_orders(&self, query: OrderQuery) -> Result<Vec<Order>>;

    /// Persists a status change made with `Order::advance`, together with the
    /// given outbox messages.
    ///
    /// The write only applies if the stored status still equals `expected`;
    /// otherwise it fails with `Conflict`.
    async fn save_status(
        &self,
        order: &Order,
        expected: OrderStatus,
        messages: Vec<OutboxMessage>,
    ) -> Result<()>;
}
