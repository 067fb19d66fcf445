//! Per-request security middleware and principal extractors.

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header::AUTHORIZATION, request::Parts},
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use tollgate_core::auth::{Principal, SecurityContext, Verdict};

use crate::error::ApiError;
use crate::server::GatewayState;

/// Run the security pipeline before any handler.
///
/// Allowed requests carry their `SecurityContext` in the request extensions.
pub async fn security_pipeline(
    State(state): State<Arc<GatewayState>>,
    mut request: Request,
    next: Next,
) -> Response {
    let authorization = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    let verdict = state
        .pipeline
        .process(request.uri().path(), authorization, Utc::now());

    match verdict {
        Verdict::Allow(context) => {
            request.extensions_mut().insert(context);
            next.run(request).await
        }
        Verdict::Reject { decision, .. } => ApiError::from(decision).into_response(),
    }
}

fn principal(parts: &Parts) -> Option<Principal> {
    parts
        .extensions
        .get::<SecurityContext>()
        .and_then(SecurityContext::principal)
        .cloned()
}

/// Extractor for authenticated requests.
///
/// Use this in handler parameters to require a principal.
#[derive(Debug, Clone)]
pub struct Authenticated(pub Principal);

impl Authenticated {
    /// Get the username.
    #[must_use]
    pub fn username(&self) -> &str {
        &self.0.username
    }

    /// Check role membership.
    #[must_use]
    pub fn has_role(&self, role: &str) -> bool {
        self.0.has_role(role)
    }
}

impl<S> FromRequestParts<S> for Authenticated
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        principal(parts).map(Self).ok_or(ApiError::Unauthenticated)
    }
}

/// Extractor for optional authentication.
///
/// Holds `None` on open routes reached without a valid token.
#[derive(Debug, Clone)]
pub struct MaybeAuthenticated(pub Option<Principal>);

impl<S> FromRequestParts<S> for MaybeAuthenticated
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self(principal(parts)))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use axum::http::Request as HttpRequest;

    use super::*;

    fn parts_with(context: Option<SecurityContext>) -> Parts {
        let mut request = HttpRequest::builder().uri("/").body(()).unwrap();
        if let Some(context) = context {
            request.extensions_mut().insert(context);
        }
        request.into_parts().0
    }

    fn victor() -> SecurityContext {
        SecurityContext::authenticated(Principal {
            username: "victor".into(),
            roles: BTreeSet::from(["USER".to_string()]),
        })
    }

    #[tokio::test]
    async fn test_authenticated_extractor() {
        let mut parts = parts_with(Some(victor()));
        let auth = Authenticated::from_request_parts(&mut parts, &()).await.unwrap();
        assert_eq!(auth.username(), "victor");
        assert!(auth.has_role("USER"));

        let mut parts = parts_with(Some(SecurityContext::empty()));
        let err = Authenticated::from_request_parts(&mut parts, &()).await.unwrap_err();
        assert_eq!(err, ApiError::Unauthenticated);
    }

    #[tokio::test]
    async fn test_maybe_authenticated_extractor() {
        let mut parts = parts_with(None);
        let MaybeAuthenticated(principal) =
            MaybeAuthenticated::from_request_parts(&mut parts, &()).await.unwrap();
        assert!(principal.is_none());

        let mut parts = parts_with(Some(victor()));
        let MaybeAuthenticated(principal) =
            MaybeAuthenticated::from_request_parts(&mut parts, &()).await.unwrap();
        assert_eq!(principal.unwrap().username, "victor");
    }
}
