//! Checkout endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use domain::{CustomerContact, ShippingAddress};
use saga::{Checkout, CheckoutOutcome};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::routes::buyer_from_headers;
use crate::routes::orders::OrderResponse;
use crate::{AppState, Store};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    pub shipping_address: ShippingAddress,
    #[serde(default)]
    pub contact: Option<CustomerContact>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutResponse {
    pub order: OrderResponse,
    pub post_commit: PostCommitResponse,
}

/// Follow-up results. Informational only; the order is committed either way.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostCommitResponse {
    pub cart_cleared: bool,
    pub events_delivered: usize,
    pub failures: Vec<String>,
}

impl From<CheckoutOutcome> for CheckoutResponse {
    fn from(outcome: CheckoutOutcome) -> Self {
        Self {
            order: outcome.order.into(),
            post_commit: PostCommitResponse {
                cart_cleared: outcome.post_commit.cart_cleared,
                events_delivered: outcome.post_commit.events_delivered,
                failures: outcome
                    .post_commit
                    .failures
                    .iter()
                    .map(ToString::to_string)
                    .collect(),
            },
        }
    }
}

/// POST /checkout: turn the buyer's active cart into an order.
#[tracing::instrument(skip(state, headers, req))]
pub async fn create<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
    Json(req): Json<CheckoutRequest>,
) -> Result<(StatusCode, Json<CheckoutResponse>), ApiError> {
    let buyer_id = buyer_from_headers(&headers)?;

    let mut checkout = Checkout::new(buyer_id, req.shipping_address);
    if let Some(contact) = req.contact {
        checkout = checkout.with_contact(contact);
    }

    let outcome = state.checkout.checkout(checkout).await?;
    Ok((StatusCode::CREATED, Json(outcome.into())))
}
