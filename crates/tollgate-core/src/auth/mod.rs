//! Stateless bearer-token authentication and route-level authorization.
//!
//! This module provides:
//! - One-way password hashing with tagged, upgradeable encodings
//! - Signed access/refresh token issuing and validation
//! - Credential sign-in and token refresh
//! - Per-request principal resolution and route access policy

mod context;
mod password;
mod pipeline;
mod policy;
mod service;
mod store;
mod token;

pub use context::{AuthOutcome, Principal, RequestAuthenticator, SecurityContext};
pub use password::{
    DEFAULT_ITERATIONS, MAX_ITERATIONS, MIN_ITERATIONS, PasswordError, PasswordHasher,
    PasswordScheme,
};
pub use pipeline::{SecurityPipeline, Stage, Verdict};
pub use policy::{AccessPolicy, AccessRule, Decision, PathPattern, PolicyError, Requirement};
pub use service::{AuthenticationService, Credentials};
pub use store::{MemoryUserStore, StoreError, UserRecord, UserStore};
pub use token::{
    REFRESH_TTL_FACTOR, TokenClaims, TokenCodec, TokenError, TokenKind, TokenPair, extract_bearer,
};

use thiserror::Error;

/// Authentication errors visible outside the auth core.
///
/// Every lower-level failure is classified into one of these four kinds
/// before it leaves the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AuthError {
    /// Blank, unknown or wrong credentials, or a disabled account.
    #[error("Bad credentials")]
    BadCredentials,

    /// Malformed token, bad signature, wrong issuer or wrong token kind.
    #[error("Invalid token")]
    InvalidToken,

    /// Structurally valid token past its expiry.
    #[error("Expired token")]
    ExpiredToken,

    /// The user store could not be reached.
    #[error("User store unavailable")]
    StoreUnavailable,
}

impl From<TokenError> for AuthError {
    fn from(_: TokenError) -> Self {
        Self::InvalidToken
    }
}

impl From<StoreError> for AuthError {
    fn from(_: StoreError) -> Self {
        Self::StoreUnavailable
    }
}
