//! HTTP handlers grouped by resource.

pub mod cart;
pub mod checkout;
pub mod health;
pub mod metrics;
pub mod orders;

use axum::http::HeaderMap;
use common::{BuyerId, SessionToken};
use domain::CartOwner;

use crate::error::ApiError;

/// Header carrying the authenticated buyer's id, set by the gateway.
pub const BUYER_HEADER: &str = "x-buyer-id";

/// Header carrying an anonymous shopper's session token.
pub const SESSION_HEADER: &str = "x-session-id";

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Resolves the signed-in buyer, if any.
pub(crate) fn buyer_from_headers(headers: &HeaderMap) -> Result<BuyerId, ApiError> {
    let raw = header(headers, BUYER_HEADER)
        .ok_or_else(|| ApiError::Unauthorized(format!("missing {BUYER_HEADER} header")))?;
    parse_id(raw, BUYER_HEADER, BuyerId::parse)
}

/// Resolves who owns the cart: the buyer when signed in, otherwise the session.
pub(crate) fn owner_from_headers(headers: &HeaderMap) -> Result<CartOwner, ApiError> {
    if header(headers, BUYER_HEADER).is_some() {
        return buyer_from_headers(headers).map(CartOwner::Buyer);
    }
    header(headers, SESSION_HEADER)
        .map(|token| CartOwner::Guest(SessionToken::new(token)))
        .ok_or_else(|| {
            ApiError::Unauthorized(format!(
                "missing {BUYER_HEADER} or {SESSION_HEADER} header"
            ))
        })
}

/// Parses a UUID-backed id, naming the offending field on failure.
pub(crate) fn parse_id<T, E: std::fmt::Display>(
    raw: &str,
    field: &str,
    parse: impl FnOnce(&str) -> Result<T, E>,
) -> Result<T, ApiError> {
    parse(raw).map_err(|e| ApiError::BadRequest(format!("Invalid {field}: {e}")))
}
