//! # Tollgate Core
//!
//! Stateless bearer-token authentication for HTTP APIs.
//!
//! This crate provides:
//! - Password hashing with tagged, upgradeable encodings
//! - HS256 access/refresh token issuing and validation
//! - Credential sign-in and token refresh
//! - Per-request principal resolution and a route access policy
//! - Configuration loading and validation (JSON5 format)

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod auth;
pub mod config;
pub mod secrets;

pub use auth::{
    AccessPolicy, AuthError, AuthenticationService, Credentials, PasswordHasher,
    RequestAuthenticator, SecurityContext, SecurityPipeline, TokenCodec, TokenPair, UserRecord,
    UserStore,
};
pub use config::{Config, ConfigError};
pub use secrets::{SigningKey, SigningSecret};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::auth::{
        AccessPolicy, AuthError, AuthenticationService, Credentials, Principal, SecurityContext,
        SecurityPipeline, TokenCodec, UserRecord, UserStore, Verdict,
    };
    pub use crate::config::Config;
}
