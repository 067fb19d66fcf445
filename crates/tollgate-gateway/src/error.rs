//! HTTP error responses.

use axum::{
    Json,
    http::{HeaderValue, StatusCode, header::WWW_AUTHENTICATE},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use tollgate_core::auth::Decision;

/// Body of a rejected sign-in or refresh.
pub const INVALID_CLIENT_REQUEST: &str = "Invalid client request!";

/// Client-visible failures.
///
/// None of these carry internal detail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    /// Sign-in or refresh refused, for whatever reason.
    #[error("Invalid client request!")]
    InvalidClientRequest,

    /// Route needs a valid bearer token.
    #[error("Authentication required")]
    Unauthenticated,

    /// Route is closed to everyone.
    #[error("Access denied")]
    Forbidden,

    /// Too many sign-in attempts.
    #[error("Too many requests")]
    TooManyRequests,

    /// Something failed on our side.
    #[error("Internal server error")]
    Internal,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    code: &'static str,
}

impl ApiError {
    /// HTTP status for this error.
    #[must_use]
    pub const fn status(self) -> StatusCode {
        match self {
            Self::InvalidClientRequest | Self::Forbidden => StatusCode::FORBIDDEN,
            Self::Unauthenticated => StatusCode::UNAUTHORIZED,
            Self::TooManyRequests => StatusCode::TOO_MANY_REQUESTS,
            Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    const fn code(self) -> &'static str {
        match self {
            Self::InvalidClientRequest => "invalid_client_request",
            Self::Unauthenticated => "unauthenticated",
            Self::Forbidden => "forbidden",
            Self::TooManyRequests => "too_many_requests",
            Self::Internal => "internal_error",
        }
    }
}

impl From<Decision> for ApiError {
    fn from(decision: Decision) -> Self {
        match decision {
            Decision::Unauthenticated => Self::Unauthenticated,
            Decision::Forbidden | Decision::Allow => Self::Forbidden,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self == Self::InvalidClientRequest {
            return (self.status(), INVALID_CLIENT_REQUEST).into_response();
        }

        let body = ErrorBody {
            error: self.to_string(),
            code: self.code(),
        };
        let mut response = (self.status(), Json(body)).into_response();

        if self == Self::Unauthenticated {
            response
                .headers_mut()
                .insert(WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_statuses() {
        assert_eq!(ApiError::InvalidClientRequest.status(), StatusCode::FORBIDDEN);
        assert_eq!(ApiError::Unauthenticated.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::Forbidden.status(), StatusCode::FORBIDDEN);
        assert_eq!(ApiError::TooManyRequests.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[test]
    fn test_unauthenticated_challenges() {
        let response = ApiError::Unauthenticated.into_response();
        assert_eq!(response.headers().get(WWW_AUTHENTICATE).unwrap(), "Bearer");

        let response = ApiError::Forbidden.into_response();
        assert!(response.headers().get(WWW_AUTHENTICATE).is_none());
    }

    #[test]
    fn test_from_decision() {
        assert_eq!(ApiError::from(Decision::Unauthenticated), ApiError::Unauthenticated);
        assert_eq!(ApiError::from(Decision::Forbidden), ApiError::Forbidden);
    }
}
