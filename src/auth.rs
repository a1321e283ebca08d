//! # Authentication
//!
//! Every `/v1/*` request carries a bearer token (Authorization header or
//! `X-API-Key`). Tokens are SHA-256-hashed and matched against
//! `customer_tokens`; the optional admin token bypasses the lookup but
//! must still name a customer scope via `X-Customer-ID` or
//! `?customer_id=`.

use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
    middleware::Next,
    response::Response,
};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use tracing::error;

use crate::error::{unauthorized, validation_error, ApiError};
use crate::repositories::customer_token;
use crate::server::AppState;

/// Authenticated customer scope attached to the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CustomerScope {
    pub customer_id: i64,
    /// True when the admin token was used.
    pub superuser: bool,
}

/// SHA-256 hex digest of a presented token.
pub fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

/// Middleware validating the bearer token and resolving the customer scope.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_token(request.headers())
        .ok_or_else(|| unauthorized("missing API token"))?;

    let admin_token = &state.config.control_plane_admin_token;
    if !admin_token.is_empty()
        && bool::from(ConstantTimeEq::ct_eq(
            token.as_bytes(),
            admin_token.as_bytes(),
        ))
    {
        let customer_id = extract_customer_id(&request)?;
        request.extensions_mut().insert(CustomerScope {
            customer_id,
            superuser: true,
        });
        return Ok(next.run(request).await);
    }

    let hash = hash_token(&token);
    let customer_id = customer_token::customer_id_for_token_hash(&state.db, &hash)
        .await
        .map_err(|err| {
            error!(error = ?err, "token lookup failed");
            ApiError::new(
                axum::http::StatusCode::INTERNAL_SERVER_ERROR,
                "authentication failed",
            )
        })?
        .ok_or_else(|| unauthorized("invalid API token"))?;

    request.extensions_mut().insert(CustomerScope {
        customer_id,
        superuser: false,
    });
    Ok(next.run(request).await)
}

fn extract_token(headers: &HeaderMap) -> Option<String> {
    if let Some(value) = headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok()) {
        let value = value.trim();
        let token = if value.len() >= 7 && value[..7].eq_ignore_ascii_case("bearer ") {
            value[7..].trim()
        } else {
            value
        };
        if !token.is_empty() {
            return Some(token.to_string());
        }
    }

    headers
        .get("X-API-Key")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

/// Admin requests must name the customer they act for.
fn extract_customer_id(request: &Request) -> Result<i64, ApiError> {
    let header = request
        .headers()
        .get("X-Customer-ID")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string);

    let raw = header.or_else(|| {
        request.uri().query().and_then(|query| {
            url::form_urlencoded::parse(query.as_bytes())
                .find(|(key, _)| key == "customer_id")
                .map(|(_, value)| value.into_owned())
        })
    });

    let Some(raw) = raw else {
        return Err(validation_error(
            "customer_id is required for admin requests",
            serde_json::json!({ "customer_id": "required" }),
        ));
    };

    match raw.parse::<i64>() {
        Ok(id) if id > 0 => Ok(id),
        _ => Err(validation_error(
            "invalid customer_id",
            serde_json::json!({ "customer_id": "must be a positive integer" }),
        )),
    }
}

impl<S: Sync> axum::extract::FromRequestParts<S> for CustomerScope {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CustomerScope>()
            .copied()
            .ok_or_else(|| unauthorized("authentication required"))
    }
}
