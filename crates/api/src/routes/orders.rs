//! Order read and status endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use chrono::{DateTime, Utc};
use common::{BuyerId, OrderId, SellerId};
use domain::{CustomerContact, Money, Order, OrderItem, OrderStatus, ShippingAddress};
use serde::{Deserialize, Serialize};
use storage::OrderQuery;

use crate::error::ApiError;
use crate::routes::parse_id;
use crate::{AppState, Store};

/// Page size when the caller gives none.
const DEFAULT_LIMIT: usize = 50;

// -- Request types --

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListOrdersParams {
    pub buyer_id: Option<String>,
    pub seller_id: Option<String>,
    pub status: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

#[derive(Deserialize)]
pub struct UpdateStatusRequest {
    pub status: String,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

// -- Response types --

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderResponse {
    pub id: String,
    pub order_number: String,
    pub buyer_id: String,
    pub source: &'static str,
    pub status: &'static str,
    pub currency: String,
    pub subtotal: Money,
    pub shipping_cost: Money,
    pub tax_amount: Money,
    pub discount_amount: Money,
    pub total_amount: Money,
    pub shipping_address: ShippingAddress,
    pub contact: CustomerContact,
    pub source_cart_id: Option<String>,
    pub items: Vec<OrderItemResponse>,
    pub paid_at: Option<DateTime<Utc>>,
    pub shipped_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItemResponse {
    pub id: String,
    pub item_type: &'static str,
    pub product_id: String,
    pub variant_id: Option<String>,
    pub seller_id: Option<String>,
    pub product_name: String,
    pub variant_name: Option<String>,
    pub sku: Option<String>,
    pub quantity: u32,
    pub unit_price: Money,
    pub subtotal: Money,
}

impl From<OrderItem> for OrderItemResponse {
    fn from(item: OrderItem) -> Self {
        Self {
            id: item.id.to_string(),
            item_type: item.item_type.as_str(),
            product_id: item.product_id.to_string(),
            variant_id: item.variant_id.map(|v| v.to_string()),
            seller_id: item.seller_id.map(|s| s.to_string()),
            product_name: item.details.product_name,
            variant_name: item.details.variant_name,
            sku: item.details.sku,
            quantity: item.quantity,
            unit_price: item.unit_price,
            subtotal: item.subtotal,
        }
    }
}

impl From<Order> for OrderResponse {
    fn from(order: Order) -> Self {
        Self {
            id: order.id.to_string(),
            order_number: order.order_number.to_string(),
            buyer_id: order.buyer_id.to_string(),
            source: order.source.as_str(),
            status: order.status.as_str(),
            currency: order.currency,
            subtotal: order.subtotal,
            shipping_cost: order.shipping_cost,
            tax_amount: order.tax_amount,
            discount_amount: order.discount_amount,
            total_amount: order.total_amount,
            shipping_address: order.shipping_address,
            contact: order.contact,
            source_cart_id: order.source_cart_id.map(|id| id.to_string()),
            items: order.items.into_iter().map(OrderItemResponse::from).collect(),
            paid_at: order.paid_at,
            shipped_at: order.shipped_at,
            delivered_at: order.delivered_at,
            cancelled_at: order.cancelled_at,
            created_at: order.created_at,
            updated_at: order.updated_at,
        }
    }
}

impl ListOrdersParams {
    fn into_query(self) -> Result<OrderQuery, ApiError> {
        let mut query = OrderQuery::new()
            .limit(self.limit.unwrap_or(DEFAULT_LIMIT))
            .offset(self.offset.unwrap_or(0));
        if let Some(raw) = self.buyer_id.as_deref() {
            query = query.buyer_id(parse_id(raw, "buyerId", BuyerId::parse)?);
        }
        if let Some(raw) = self.seller_id.as_deref() {
            query = query.seller_id(parse_id(raw, "sellerId", SellerId::parse)?);
        }
        if let Some(raw) = self.status.as_deref() {
            query = query.status(parse_status(raw)?);
        }
        Ok(query)
    }
}

fn parse_status(raw: &str) -> Result<OrderStatus, ApiError> {
    raw.parse()
        .map_err(|e: domain::DomainError| ApiError::BadRequest(e.to_string()))
}

// -- Handlers --

/// GET /orders: list orders by buyer, seller, or status, newest first.
#[tracing::instrument(skip(state))]
pub async fn list<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Query(params): Query<ListOrdersParams>,
) -> Result<Json<Vec<OrderResponse>>, ApiError> {
    let query = params.into_query()?;
    let orders = state.order_service.list_orders(query).await?;
    Ok(Json(orders.into_iter().map(OrderResponse::from).collect()))
}

/// GET /orders/{id}: one order with its frozen lines.
#[tracing::instrument(skip(state))]
pub async fn get<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id = parse_id(&id, "order id", OrderId::parse)?;
    let order = state.order_service.get_order(order_id).await?;
    Ok(Json(order.into()))
}

/// POST /orders/{id}/status: move an order along its lifecycle.
#[tracing::instrument(skip(state, req))]
pub async fn update_status<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    Json(req): Json<UpdateStatusRequest>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id = parse_id(&id, "order id", OrderId::parse)?;
    let to = parse_status(&req.status)?;

    let order = state
        .order_service
        .advance_status(order_id, to, req.reason, req.notes)
        .await?;
    Ok(Json(order.into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_params_default_to_first_page() {
        let query = ListOrdersParams::default().into_query().unwrap();
        assert_eq!(query.limit, Some(DEFAULT_LIMIT));
        assert_eq!(query.offset, Some(0));
        assert!(query.buyer_id.is_none());
    }

    #[test]
    fn test_params_parse_filters() {
        let buyer = BuyerId::new();
        let params = ListOrdersParams {
            buyer_id: Some(buyer.to_string()),
            status: Some("ready_to_ship".to_string()),
            limit: Some(5),
            ..Default::default()
        };
        let query = params.into_query().unwrap();
        assert_eq!(query.buyer_id, Some(buyer));
        assert_eq!(query.status, Some(OrderStatus::ReadyToShip));
        assert_eq!(query.limit, Some(5));
    }

    #[test]
    fn test_params_reject_unknown_status() {
        let params = ListOrdersParams {
            status: Some("teleported".to_string()),
            ..Default::default()
        };
        assert!(matches!(params.into_query(), Err(ApiError::BadRequest(_))));
    }
}
