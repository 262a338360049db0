use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use common::{CartId, CartItemId, MessageId, OrderId};
use domain::{
    Cart, CartItem, CartOwner, CartStatus, CartTotals, LineRefresh, NewOrder, Order, OrderStatus,
};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{
    CartStore, OrderQuery, OrderStore, OutboxMessage, OutboxStore, Result, StorageError,
};

#[derive(Default)]
struct State {
    carts: HashMap<CartId, Cart>,
    orders: HashMap<OrderId, Order>,
    outbox: Vec<OutboxMessage>,
}

impl State {
    fn active_cart_id(&self, owner: &CartOwner) -> Option<CartId> {
        self.carts
            .values()
            .find(|cart| cart.status == CartStatus::Active && cart.owner == *owner)
            .map(|cart| cart.id)
    }

    fn cart_mut(&mut self, cart_id: CartId) -> Result<&mut Cart> {
        self.carts
            .get_mut(&cart_id)
            .ok_or_else(|| StorageError::not_found("cart", cart_id))
    }
}

/// In-memory implementation of every store, for tests and local runs.
///
/// All three traits share one state behind a single lock, so an order and
/// its outbox messages are written together exactly as a database
/// transaction would.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<RwLock<State>>,
    fail_on_item_write: Arc<AtomicBool>,
    fail_on_clear: Arc<AtomicBool>,
    fail_on_order_items: Arc<AtomicBool>,
    order_number_collisions: Arc<AtomicUsize>,
    merge_fault_at_line: Arc<AtomicUsize>,
}

impl InMemoryStore {
    /// Creates a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes line inserts and merges fail.
    pub fn set_fail_on_item_write(&self, fail: bool) {
        self.fail_on_item_write.store(fail, Ordering::SeqCst);
    }

    /// Makes the next `merge_carts` fail while folding its `line`-th guest
    /// line (counting from one), after the earlier lines were folded.
    pub fn fail_next_merge_at_line(&self, line: usize) {
        self.merge_fault_at_line.store(line, Ordering::SeqCst);
    }

    /// Makes `delete_all_items` fail.
    pub fn set_fail_on_clear(&self, fail: bool) {
        self.fail_on_clear.store(fail, Ordering::SeqCst);
    }

    /// Makes `create_order` fail while writing order lines.
    pub fn set_fail_on_order_items(&self, fail: bool) {
        self.fail_on_order_items.store(fail, Ordering::SeqCst);
    }

    /// Makes the next `count` order creations report a taken order number.
    pub fn force_order_number_collisions(&self, count: usize) {
        self.order_number_collisions.store(count, Ordering::SeqCst);
    }

    /// Returns how many active carts the owner has.
    pub async fn active_cart_count(&self, owner: &CartOwner) -> usize {
        self.state
            .read()
            .await
            .carts
            .values()
            .filter(|cart| cart.status == CartStatus::Active && cart.owner == *owner)
            .count()
    }

    /// Returns the total number of stored orders.
    pub async fn order_count(&self) -> usize {
        self.state.read().await.orders.len()
    }

    /// Returns every outbox message, delivered or not.
    pub async fn outbox_messages(&self) -> Vec<OutboxMessage> {
        self.state.read().await.outbox.clone()
    }

    fn take_merge_fault(&self, line: usize) -> bool {
        self.merge_fault_at_line
            .compare_exchange(line, 0, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    fn take_collision(&self) -> bool {
        self.order_number_collisions
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl CartStore for InMemoryStore {
    async fn get_or_create_active_cart(&self, owner: &CartOwner, currency: &str) -> Result<Cart> {
        let mut state = self.state.write().await;

        if let Some(id) = state.active_cart_id(owner) {
            return state
                .carts
                .get(&id)
                .cloned()
                .ok_or_else(|| StorageError::not_found("cart", id));
        }

        let cart = Cart::new_active(owner.clone(), currency, Utc::now());
        state.carts.insert(cart.id, cart.clone());
        Ok(cart)
    }

    async fn find_active_cart(&self, owner: &CartOwner) -> Result<Option<Cart>> {
        let state = self.state.read().await;
        Ok(state
            .active_cart_id(owner)
            .and_then(|id| state.carts.get(&id).cloned()))
    }

    async fn get_cart(&self, cart_id: CartId) -> Result<Option<Cart>> {
        Ok(self.state.read().await.carts.get(&cart_id).cloned())
    }

    async fn insert_item(&self, item: CartItem) -> Result<CartItem> {
        if self.fail_on_item_write.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("simulated item write failure".into()));
        }

        let mut state = self.state.write().await;
        let cart = state.cart_mut(item.cart_id)?;

        if cart.find_line(&item.key()).is_some() {
            return Err(StorageError::Conflict(format!(
                "cart {} already has a {} line for product {}",
                item.cart_id, item.item_type, item.product_id
            )));
        }

        cart.items.push(item.clone());
        Ok(item)
    }

    async fn merge_item(&self, item_id: CartItemId, refresh: &LineRefresh) -> Result<CartItem> {
        if self.fail_on_item_write.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("simulated item write failure".into()));
        }

        let mut state = self.state.write().await;
        let item = state
            .carts
            .values_mut()
            .flat_map(|cart| cart.items.iter_mut())
            .find(|item| item.id == item_id)
            .ok_or_else(|| StorageError::not_found("cart item", item_id))?;

        item.absorb(refresh).map_err(StorageError::Rejected)?;
        Ok(item.clone())
    }

    async fn merge_carts(&self, guest_id: CartId, target_id: CartId) -> Result<usize> {
        if self.fail_on_item_write.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("simulated item write failure".into()));
        }

        let mut state = self.state.write().await;
        let guest = state
            .carts
            .get(&guest_id)
            .ok_or_else(|| StorageError::not_found("cart", guest_id))?;
        if !guest.status.accepts_items() {
            return Ok(0);
        }
        let guest_lines = guest.items.clone();

        // Work on a copy so a failure part way leaves the target untouched.
        let mut target = state
            .carts
            .get(&target_id)
            .cloned()
            .ok_or_else(|| StorageError::not_found("cart", target_id))?;
        if !target.status.accepts_items() {
            return Err(StorageError::Conflict(format!(
                "cart {target_id} is {}, cannot take lines",
                target.status
            )));
        }

        let now = Utc::now();
        for (index, line) in guest_lines.iter().enumerate() {
            if self.take_merge_fault(index + 1) {
                return Err(StorageError::Unavailable("simulated merge failure".into()));
            }
            match target.items.iter_mut().find(|item| item.key() == line.key()) {
                Some(existing) => existing
                    .absorb_line(line, now)
                    .map_err(StorageError::Rejected)?,
                None => target.items.push(line.transfer_to(target_id, now)),
            }
        }
        let totals = target.computed_totals().map_err(StorageError::Rejected)?;
        target.apply_totals(totals, now);

        state.carts.insert(target_id, target);
        let guest = state.cart_mut(guest_id)?;
        guest.status = CartStatus::Merged;
        guest.updated_at = now;
        Ok(guest_lines.len())
    }

    async fn remove_item(&self, cart_id: CartId, item_id: CartItemId) -> Result<()> {
        let mut state = self.state.write().await;
        let cart = state.cart_mut(cart_id)?;

        let before = cart.items.len();
        cart.items.retain(|item| item.id != item_id);
        if cart.items.len() == before {
            return Err(StorageError::not_found("cart item", item_id));
        }
        Ok(())
    }

    async fn delete_all_items(&self, cart_id: CartId) -> Result<u64> {
        if self.fail_on_clear.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("simulated clear failure".into()));
        }

        let mut state = self.state.write().await;
        let cart = state.cart_mut(cart_id)?;
        let removed = cart.items.len() as u64;
        cart.items.clear();
        Ok(removed)
    }

    async fn recalculate_totals(&self, cart_id: CartId) -> Result<CartTotals> {
        let mut state = self.state.write().await;
        let cart = state.cart_mut(cart_id)?;

        let totals = cart.computed_totals().map_err(StorageError::Rejected)?;
        cart.apply_totals(totals, Utc::now());
        Ok(totals)
    }

    async fn set_status(&self, cart_id: CartId, status: CartStatus) -> Result<()> {
        let mut state = self.state.write().await;
        let cart = state.cart_mut(cart_id)?;
        cart.status = status;
        cart.updated_at = Utc::now();
        Ok(())
    }
}

#[async_trait]
impl OrderStore for InMemoryStore {
    async fn create_order(
        &self,
        id: OrderId,
        order: NewOrder,
        messages: Vec<OutboxMessage>,
    ) -> Result<Order> {
        let mut state = self.state.write().await;

        if self.take_collision()
            || state
                .orders
                .values()
                .any(|existing| existing.order_number == order.order_number)
        {
            return Err(StorageError::DuplicateOrderNumber(
                order.order_number.to_string(),
            ));
        }
        if state.orders.contains_key(&id) {
            return Err(StorageError::Conflict(format!("order {id} already exists")));
        }
        if self.fail_on_order_items.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable(
                "simulated order item write failure".into(),
            ));
        }

        let order = order.persisted(id);
        state.orders.insert(id, order.clone());
        state.outbox.extend(messages);
        Ok(order)
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>> {
        Ok(self.state.read().await.orders.get(&id).cloned())
    }

    async fn list_orders(&self, query: OrderQuery) -> Result<Vec<Order>> {
        let state = self.state.read().await;
        let mut orders: Vec<_> = state
            .orders
            .values()
            .filter(|order| query.matches(order))
            .cloned()
            .collect();

        orders.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then(b.id.cmp(&a.id))
        });

        let offset = query.offset.unwrap_or(0);
        let orders = orders.into_iter().skip(offset);
        Ok(match query.limit {
            Some(limit) => orders.take(limit).collect(),
            None => orders.collect(),
        })
    }

    async fn save_status(
        &self,
        order: &Order,
        expected: OrderStatus,
        messages: Vec<OutboxMessage>,
    ) -> Result<()> {
        let mut state = self.state.write().await;
        let stored = state
            .orders
            .get_mut(&order.id)
            .ok_or_else(|| StorageError::not_found("order", order.id))?;

        if stored.status != expected {
            return Err(StorageError::Conflict(format!(
                "order {} is {}, expected {}",
                order.id, stored.status, expected
            )));
        }

        stored.status = order.status;
        stored.paid_at = order.paid_at;
        stored.shipped_at = order.shipped_at;
        stored.delivered_at = order.delivered_at;
        stored.cancelled_at = order.cancelled_at;
        stored.updated_at = order.updated_at;
        state.outbox.extend(messages);
        Ok(())
    }
}

#[async_trait]
impl OutboxStore for InMemoryStore {
    async fn pending(&self, limit: usize, max_attempts: u32) -> Result<Vec<OutboxMessage>> {
        let state = self.state.read().await;
        let mut pending: Vec<_> = state
            .outbox
            .iter()
            .filter(|m| !m.is_delivered() && m.attempts < max_attempts)
            .cloned()
            .collect();
        pending.sort_by_key(|m| m.created_at);
        pending.truncate(limit);
        Ok(pending)
    }

    async fn pending_for(&self, aggregate_id: Uuid, max_attempts: u32) -> Result<Vec<OutboxMessage>> {
        let state = self.state.read().await;
        let mut pending: Vec<_> = state
            .outbox
            .iter()
            .filter(|m| m.aggregate_id == aggregate_id)
            .filter(|m| !m.is_delivered() && m.attempts < max_attempts)
            .cloned()
            .collect();
        pending.sort_by_key(|m| m.created_at);
        Ok(pending)
    }

    async fn mark_delivered(&self, id: MessageId) -> Result<()> {
        let mut state = self.state.write().await;
        let message = state
            .outbox
            .iter_mut()
            .find(|m| m.id == id)
            .ok_or_else(|| StorageError::not_found("outbox message", id))?;
        message.attempts += 1;
        message.delivered_at = Some(Utc::now());
        Ok(())
    }

    async fn record_failure(&self, id: MessageId, error: &str) -> Result<()> {
        let mut state = self.state.write().await;
        let message = state
            .outbox
            .iter_mut()
            .find(|m| m.id == id)
            .ok_or_else(|| StorageError::not_found("outbox message", id))?;
        message.attempts += 1;
        message.last_error = Some(error.to_string());
        Ok(())
    }
}
