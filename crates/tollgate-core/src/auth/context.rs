//! Per-request principal resolution.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use super::AuthError;
use super::store::UserStore;
use super::token::{TokenCodec, TokenKind, extract_bearer};

/// Authenticated identity for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    /// Username.
    pub username: String,
    /// Current roles from the user store.
    pub roles: BTreeSet<String>,
}

impl Principal {
    /// Check role membership.
    #[must_use]
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }
}

/// Security state of a single request.
///
/// Either empty or fully populated; never partial.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SecurityContext {
    principal: Option<Principal>,
}

impl SecurityContext {
    /// Unauthenticated context.
    #[must_use]
    pub const fn empty() -> Self {
        Self { principal: None }
    }

    /// Context for an authenticated principal.
    #[must_use]
    pub const fn authenticated(principal: Principal) -> Self {
        Self {
            principal: Some(principal),
        }
    }

    /// Whether a principal is present.
    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        self.principal.is_some()
    }

    /// The principal, if authenticated.
    #[must_use]
    pub const fn principal(&self) -> Option<&Principal> {
        self.principal.as_ref()
    }

    /// Take the principal out of the context.
    #[must_use]
    pub fn into_principal(self) -> Option<Principal> {
        self.principal
    }
}

/// How the authentication step ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthOutcome {
    /// No bearer token was presented.
    NoToken,
    /// Token valid and principal resolved.
    Authenticated,
    /// Token presented but unusable.
    Rejected(AuthError),
}

/// Resolves the bearer token of an inbound request into a `SecurityContext`.
#[derive(Clone)]
pub struct RequestAuthenticator {
    codec: Arc<TokenCodec>,
    store: Arc<dyn UserStore>,
}

impl RequestAuthenticator {
    /// Create an authenticator.
    #[must_use]
    pub fn new(codec: Arc<TokenCodec>, store: Arc<dyn UserStore>) -> Self {
        Self { codec, store }
    }

    /// Authenticate a request from its `Authorization` header.
    ///
    /// Never fails: rejections produce an empty context and the reason.
    #[must_use]
    pub fn authenticate(
        &self,
        authorization: Option<&str>,
        now: DateTime<Utc>,
    ) -> (SecurityContext, AuthOutcome) {
        let Some(token) = authorization.and_then(extract_bearer) else {
            return (SecurityContext::empty(), AuthOutcome::NoToken);
        };

        match self.resolve(token, now) {
            Ok(principal) => (
                SecurityContext::authenticated(principal),
                AuthOutcome::Authenticated,
            ),
            Err(kind) => (SecurityContext::empty(), AuthOutcome::Rejected(kind)),
        }
    }

    fn resolve(&self, token: &str, now: DateTime<Utc>) -> Result<Principal, AuthError> {
        let claims = self.codec.verify(token, TokenKind::Access, now)?;

        let user = self
            .store
            .find_by_username(&claims.subject)
            .map_err(|e| {
                warn!(error = %e, "User store failed during request authentication");
                AuthError::StoreUnavailable
            })?
            .ok_or_else(|| {
                debug!(subject = %claims.subject, "Token subject not in store");
                AuthError::InvalidToken
            })?;

        if !user.enabled {
            debug!(subject = %claims.subject, "Token subject disabled");
            return Err(AuthError::InvalidToken);
        }

        Ok(Principal {
            username: user.username,
            roles: user.roles,
        })
    }
}

impl std::fmt::Debug for RequestAuthenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestAuthenticator")
            .field("codec", &self.codec)
            .finish_non_exhaustive()
    }
}
