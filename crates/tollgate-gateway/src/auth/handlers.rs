//! Sign-in, refresh and principal endpoints.

use std::collections::BTreeSet;
use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    http::{HeaderMap, header::AUTHORIZATION, header::HOST},
};
use chrono::Utc;
use serde::Serialize;
use tollgate_core::auth::{Credentials, TokenPair, extract_bearer};

use super::middleware::Authenticated;
use crate::error::ApiError;
use crate::server::GatewayState;

/// First value of a possibly comma-separated header.
fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Base URL of the current request, used as the token issuer.
///
/// A configured public base URL wins over request headers.
fn issuer(state: &GatewayState, headers: &HeaderMap) -> String {
    if let Some(base) = &state.public_base_url {
        return base.trim_end_matches('/').to_string();
    }

    let scheme = header_value(headers, "x-forwarded-proto").unwrap_or("http");
    let host = header_value(headers, "x-forwarded-host")
        .or_else(|| header_value(headers, HOST.as_str()));

    host.map_or_else(
        || state.fallback_base_url.clone(),
        |host| format!("{scheme}://{host}"),
    )
}

/// `POST /auth/signin`
///
/// Any failure, including an unreadable body, is a bare `403`.
pub async fn signin(
    State(state): State<Arc<GatewayState>>,
    headers: HeaderMap,
    body: Result<Json<Credentials>, JsonRejection>,
) -> Result<Json<TokenPair>, ApiError> {
    let credentials = match body {
        Ok(Json(credentials)) => credentials,
        Err(rejection) => {
            tracing::debug!(error = %rejection, "Unreadable sign-in body");
            return Err(ApiError::InvalidClientRequest);
        }
    };
    let issuer = issuer(&state, &headers);

    let service = state.auth.clone();
    tokio::task::spawn_blocking(move || service.signin(&credentials, Utc::now(), &issuer))
        .await
        .map_err(|e| {
            tracing::warn!(error = %e, "Sign-in task failed");
            ApiError::Internal
        })?
        .map(Json)
        .map_err(|_| ApiError::InvalidClientRequest)
}

/// `PUT /auth/refresh/{username}` with the refresh token as bearer.
pub async fn refresh(
    State(state): State<Arc<GatewayState>>,
    Path(username): Path<String>,
    headers: HeaderMap,
) -> Result<Json<TokenPair>, ApiError> {
    let token = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(extract_bearer)
        .map(str::to_string);

    let Some(token) = token.filter(|_| !username.trim().is_empty()) else {
        tracing::debug!("Refresh without username or bearer token");
        return Err(ApiError::InvalidClientRequest);
    };
    let issuer = issuer(&state, &headers);

    let service = state.auth.clone();
    tokio::task::spawn_blocking(move || service.refresh(&username, &token, Utc::now(), &issuer))
        .await
        .map_err(|e| {
            tracing::warn!(error = %e, "Refresh task failed");
            ApiError::Internal
        })?
        .map(Json)
        .map_err(|_| ApiError::InvalidClientRequest)
}

/// Response of `GET /api/me`.
#[derive(Debug, Serialize)]
pub struct MeResponse {
    /// Username.
    pub username: String,
    /// Current roles.
    pub roles: BTreeSet<String>,
}

/// `GET /api/me`
pub async fn me(Authenticated(principal): Authenticated) -> Json<MeResponse> {
    Json(MeResponse {
        username: principal.username,
        roles: principal.roles,
    })
}

/// `GET /health`
pub async fn health() -> &'static str {
    "OK"
}
