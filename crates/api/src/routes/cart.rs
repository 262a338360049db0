//! Cart endpoints.
//!
//! The cart owner comes from the `x-buyer-id` header, falling back to the
//! guest `x-session-id` header.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use common::{ProductId, SessionToken};
use domain::{CartItem, Money};
use saga::CartView;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::routes::{buyer_from_headers, owner_from_headers, parse_id};
use crate::{AppState, Store};

// -- Request types --

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddItemRequest {
    pub product_id: String,
    pub quantity: i64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeRequest {
    pub session_id: String,
}

// -- Response types --

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartResponse {
    pub id: Option<String>,
    pub buyer_id: Option<String>,
    pub item_count: u32,
    pub total: Money,
    pub items: Vec<CartItemResponse>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItemResponse {
    pub id: String,
    pub item_type: &'static str,
    pub product_id: String,
    pub variant_id: Option<String>,
    pub seller_id: Option<String>,
    pub product_name: String,
    pub variant_name: Option<String>,
    pub image_url: Option<String>,
    pub quantity: u32,
    pub unit_price: Money,
    pub current_unit_price: Money,
    pub price_changed: bool,
    pub is_available: bool,
    pub availability_message: Option<String>,
    pub subtotal: Money,
}

impl From<CartItem> for CartItemResponse {
    fn from(item: CartItem) -> Self {
        Self {
            id: item.id.to_string(),
            item_type: item.item_type.as_str(),
            product_id: item.product_id.to_string(),
            variant_id: item.variant_id.map(|v| v.to_string()),
            seller_id: item.seller_id.map(|s| s.to_string()),
            subtotal: item.subtotal(),
            product_name: item.details.product_name,
            variant_name: item.details.variant_name,
            image_url: item.details.image_url,
            quantity: item.quantity,
            unit_price: item.snapshot_unit_price,
            current_unit_price: item.current_unit_price,
            price_changed: item.price_changed,
            is_available: item.is_available,
            availability_message: item.availability_message,
        }
    }
}

impl From<CartView> for CartResponse {
    fn from(view: CartView) -> Self {
        Self {
            id: view.id.map(|id| id.to_string()),
            buyer_id: view.buyer_id.map(|id| id.to_string()),
            item_count: view.item_count,
            total: view.total,
            items: view.items.into_iter().map(CartItemResponse::from).collect(),
        }
    }
}

// -- Handlers --

/// GET /cart: the caller's active cart, empty when there is none.
#[tracing::instrument(skip(state, headers))]
pub async fn get<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
) -> Result<Json<CartResponse>, ApiError> {
    let owner = owner_from_headers(&headers)?;
    let view = state.cart_service.get_cart(&owner).await?;
    Ok(Json(view.into()))
}

/// POST /cart/items: add units of a product, merging into an existing line.
#[tracing::instrument(skip(state, headers, req))]
pub async fn add_item<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
    Json(req): Json<AddItemRequest>,
) -> Result<Json<CartResponse>, ApiError> {
    let owner = owner_from_headers(&headers)?;
    let product_id = parse_id(&req.product_id, "productId", ProductId::parse)?;

    let cart = state
        .cart_service
        .add_to_cart(&owner, product_id, req.quantity)
        .await?;
    Ok(Json(CartView::from(cart).into()))
}

/// DELETE /cart/items/{product_id}: drop a product's line.
#[tracing::instrument(skip(state, headers))]
pub async fn remove_item<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
    Path(product_id): Path<String>,
) -> Result<Json<CartResponse>, ApiError> {
    let owner = owner_from_headers(&headers)?;
    let product_id = parse_id(&product_id, "product id", ProductId::parse)?;

    let cart = state
        .cart_service
        .remove_from_cart(&owner, product_id)
        .await?;
    Ok(Json(CartView::from(cart).into()))
}

/// DELETE /cart: empty the caller's active cart.
#[tracing::instrument(skip(state, headers))]
pub async fn clear<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    let owner = owner_from_headers(&headers)?;
    state.cart_service.clear_cart(&owner).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /cart/merge: fold a guest session's cart into the signed-in buyer's.
#[tracing::instrument(skip(state, headers, req))]
pub async fn merge<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
    Json(req): Json<MergeRequest>,
) -> Result<Json<CartResponse>, ApiError> {
    let buyer_id = buyer_from_headers(&headers)?;
    let session = SessionToken::new(req.session_id.trim());

    let cart = state
        .cart_service
        .merge_guest_cart(&session, buyer_id)
        .await?;
    Ok(Json(CartView::from(cart).into()))
}
