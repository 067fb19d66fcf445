//! Gateway middleware.

use std::net::SocketAddr;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use governor::{Quota, RateLimiter, clock::DefaultClock, state::keyed::DefaultKeyedStateStore};

use crate::error::ApiError;
use crate::server::GatewayState;

/// Checks between sweeps of idle client entries.
const PRUNE_EVERY: u64 = 4096;

/// Per-client limiter for sign-in attempts.
///
/// Clients whose quota has fully replenished are forgotten, so the key map
/// only holds recently active clients.
pub struct SigninRateLimiter {
    client_limiter: RateLimiter<String, DefaultKeyedStateStore<String>, DefaultClock>,
    checks: AtomicU64,
}

impl SigninRateLimiter {
    /// Create a new rate limiter.
    #[must_use]
    pub fn new(attempts_per_minute: u32) -> Self {
        Self::with_quota(Quota::per_minute(
            NonZeroU32::new(attempts_per_minute).unwrap_or(NonZeroU32::MIN),
        ))
    }

    fn with_quota(quota: Quota) -> Self {
        Self {
            client_limiter: RateLimiter::keyed(quota),
            checks: AtomicU64::new(0),
        }
    }

    /// Check if an attempt is allowed, consuming one unit of quota.
    #[must_use]
    pub fn check(&self, client_id: &str) -> bool {
        if self.checks.fetch_add(1, Ordering::Relaxed) % PRUNE_EVERY == PRUNE_EVERY - 1 {
            self.prune();
        }
        self.client_limiter
            .check_key(&client_id.to_string())
            .is_ok()
    }

    /// Drop clients whose quota has fully replenished.
    pub fn prune(&self) {
        self.client_limiter.retain_recent();
        self.client_limiter.shrink_to_fit();
    }

    /// Number of clients currently tracked.
    #[must_use]
    pub fn tracked_clients(&self) -> usize {
        self.client_limiter.len()
    }
}

impl Default for SigninRateLimiter {
    fn default() -> Self {
        Self::new(30)
    }
}

impl std::fmt::Debug for SigninRateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigninRateLimiter").finish_non_exhaustive()
    }
}

/// Client identity for rate limiting: the peer IP when known.
fn client_key(request: &Request) -> String {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map_or_else(|| "local".to_string(), |ConnectInfo(addr)| addr.ip().to_string())
}

/// Reject sign-in attempts over the per-client quota with `429`.
pub async fn signin_rate_limit(
    State(state): State<Arc<GatewayState>>,
    request: Request,
    next: Next,
) -> Response {
    let client = client_key(&request);
    if !state.signin_limiter.check(&client) {
        tracing::warn!(client = %client, "Sign-in rate limit exceeded");
        return ApiError::TooManyRequests.into_response();
    }
    next.run(request).await
}
