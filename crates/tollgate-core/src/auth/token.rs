//! Signed access and refresh tokens.

use std::collections::{BTreeSet, HashSet};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::AuthError;
use crate::config::SecurityConfig;
use crate::secrets::SigningKey;

/// Refresh tokens outlive access tokens by this factor.
pub const REFRESH_TTL_FACTOR: i32 = 3;

/// Token codec errors.
#[derive(Debug, Error)]
pub enum TokenError {
    /// Unparseable, badly signed or semantically invalid token.
    #[error("Malformed token: {0}")]
    Malformed(String),

    /// Token could not be signed.
    #[error("Token encoding failed: {0}")]
    Encoding(String),

    /// Invalid codec settings.
    #[error("Invalid token configuration: {0}")]
    Config(String),
}

/// Token kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    /// Presented on every API call.
    Access,
    /// Only used to mint a new pair.
    Refresh,
}

/// Claims as they appear on the wire.
#[derive(Debug, Serialize, Deserialize)]
struct WireClaims {
    sub: String,
    roles: Vec<String>,
    iat: i64,
    exp: i64,
    iss: String,
    token_type: TokenKind,
}

/// Decoded token claims.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenClaims {
    /// Username.
    pub subject: String,
    /// Roles, sorted.
    pub roles: Vec<String>,
    /// Issue time.
    pub issued_at: DateTime<Utc>,
    /// Expiry time, always after `issued_at`.
    pub expires_at: DateTime<Utc>,
    /// Base URL of the issuing service.
    pub issuer: String,
    /// Access or refresh.
    pub kind: TokenKind,
}

impl TryFrom<WireClaims> for TokenClaims {
    type Error = TokenError;

    fn try_from(wire: WireClaims) -> Result<Self, Self::Error> {
        if wire.exp <= wire.iat {
            return Err(TokenError::Malformed("exp is not after iat".to_string()));
        }
        let issued_at = DateTime::from_timestamp(wire.iat, 0)
            .ok_or_else(|| TokenError::Malformed("iat out of range".to_string()))?;
        let expires_at = DateTime::from_timestamp(wire.exp, 0)
            .ok_or_else(|| TokenError::Malformed("exp out of range".to_string()))?;

        Ok(Self {
            subject: wire.sub,
            roles: wire.roles,
            issued_at,
            expires_at,
            issuer: wire.iss,
            kind: wire.token_type,
        })
    }
}

/// Access and refresh tokens minted together.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    /// Token subject.
    pub username: String,
    /// Always `true` for an issued pair.
    pub authenticated: bool,
    /// Shared `iat` of both tokens.
    pub issued_at: DateTime<Utc>,
    /// `exp` of the access token.
    pub access_expires_at: DateTime<Utc>,
    /// Access token.
    pub access_token: String,
    /// Refresh token.
    pub refresh_token: String,
}

impl std::fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenPair")
            .field("username", &self.username)
            .field("issued_at", &self.issued_at)
            .field("access_expires_at", &self.access_expires_at)
            .finish_non_exhaustive()
    }
}

/// Issues and checks HS256 tokens with a process-wide key.
pub struct TokenCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    access_ttl: TimeDelta,
}

impl TokenCodec {
    /// Create a codec.
    ///
    /// `access_ttl` must be a positive whole number of seconds. An empty
    /// `trusted_issuers` list accepts any issuer.
    ///
    /// # Errors
    ///
    /// Returns error if the TTL is unusable.
    pub fn new(
        key: &SigningKey,
        access_ttl: Duration,
        trusted_issuers: &[String],
    ) -> Result<Self, TokenError> {
        if access_ttl.is_zero() || access_ttl.subsec_nanos() != 0 {
            return Err(TokenError::Config(format!(
                "access TTL must be a positive whole number of seconds, got {access_ttl:?}"
            )));
        }
        let access_ttl = TimeDelta::from_std(access_ttl)
            .map_err(|e| TokenError::Config(format!("access TTL out of range: {e}")))?;

        let mut validation = Validation::new(Algorithm::HS256);
        // Expiry is judged against the caller's clock in `validate`.
        validation.validate_exp = false;
        validation.leeway = 0;
        validation.required_spec_claims = ["exp", "sub"]
            .into_iter()
            .map(String::from)
            .collect::<HashSet<_>>();
        if !trusted_issuers.is_empty() {
            validation.set_issuer(trusted_issuers);
        }

        Ok(Self {
            encoding_key: EncodingKey::from_secret(key.as_bytes()),
            decoding_key: DecodingKey::from_secret(key.as_bytes()),
            validation,
            access_ttl,
        })
    }

    /// Create a codec from security settings.
    ///
    /// # Errors
    ///
    /// Returns error if the configured TTL is unusable.
    pub fn from_config(config: &SecurityConfig) -> Result<Self, TokenError> {
        Self::new(
            &config.secret_key.derive_key(),
            Duration::from_millis(config.expire_length_ms),
            &config.trusted_issuers,
        )
    }

    /// Access token lifetime.
    #[must_use]
    pub const fn access_ttl(&self) -> TimeDelta {
        self.access_ttl
    }

    /// Refresh token lifetime.
    #[must_use]
    pub fn refresh_ttl(&self) -> TimeDelta {
        self.access_ttl * REFRESH_TTL_FACTOR
    }

    /// Issue an access token.
    ///
    /// # Errors
    ///
    /// Returns error if signing fails.
    pub fn issue_access_token<I, R>(
        &self,
        username: &str,
        roles: I,
        now: DateTime<Utc>,
        issuer: &str,
    ) -> Result<String, TokenError>
    where
        I: IntoIterator<Item = R>,
        R: AsRef<str>,
    {
        self.issue(TokenKind::Access, username, roles, now, issuer)
            .map(|(token, _)| token)
    }

    /// Issue a refresh token.
    ///
    /// # Errors
    ///
    /// Returns error if signing fails.
    pub fn issue_refresh_token<I, R>(
        &self,
        username: &str,
        roles: I,
        now: DateTime<Utc>,
        issuer: &str,
    ) -> Result<String, TokenError>
    where
        I: IntoIterator<Item = R>,
        R: AsRef<str>,
    {
        self.issue(TokenKind::Refresh, username, roles, now, issuer)
            .map(|(token, _)| token)
    }

    /// Issue an access and refresh token sharing the same `iat`.
    ///
    /// # Errors
    ///
    /// Returns error if signing fails.
    pub fn issue_pair<I, R>(
        &self,
        username: &str,
        roles: I,
        now: DateTime<Utc>,
        issuer: &str,
    ) -> Result<TokenPair, TokenError>
    where
        I: IntoIterator<Item = R>,
        R: AsRef<str>,
    {
        let roles: BTreeSet<String> = roles.into_iter().map(|r| r.as_ref().to_string()).collect();
        let (access_token, access) =
            self.issue(TokenKind::Access, username, &roles, now, issuer)?;
        let (refresh_token, _) = self.issue(TokenKind::Refresh, username, &roles, now, issuer)?;

        Ok(TokenPair {
            username: username.to_string(),
            authenticated: true,
            issued_at: access.issued_at,
            access_expires_at: access.expires_at,
            access_token,
            refresh_token,
        })
    }

    fn issue<I, R>(
        &self,
        kind: TokenKind,
        username: &str,
        roles: I,
        now: DateTime<Utc>,
        issuer: &str,
    ) -> Result<(String, TokenClaims), TokenError>
    where
        I: IntoIterator<Item = R>,
        R: AsRef<str>,
    {
        let ttl = match kind {
            TokenKind::Access => self.access_ttl,
            TokenKind::Refresh => self.refresh_ttl(),
        };
        let iat = now.timestamp();
        let wire = WireClaims {
            sub: username.to_string(),
            roles: roles
                .into_iter()
                .map(|r| r.as_ref().to_string())
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect(),
            iat,
            exp: iat + ttl.num_seconds(),
            iss: issuer.to_string(),
            token_type: kind,
        };

        let token = encode(&Header::new(Algorithm::HS256), &wire, &self.encoding_key)
            .map_err(|e| TokenError::Encoding(e.to_string()))?;
        let claims = TokenClaims::try_from(wire).map_err(|e| TokenError::Encoding(e.to_string()))?;

        Ok((token, claims))
    }

    /// Check signature and structure, without judging expiry.
    ///
    /// # Errors
    ///
    /// Returns `TokenError::Malformed` for anything this codec did not sign.
    pub fn decode(&self, token: &str) -> Result<TokenClaims, TokenError> {
        let data = decode::<WireClaims>(token, &self.decoding_key, &self.validation)
            .map_err(|e| TokenError::Malformed(e.to_string()))?;
        TokenClaims::try_from(data.claims)
    }

    /// Whether a token is still within its lifetime at `now`.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidToken` if the token does not decode.
    pub fn validate(&self, token: &str, now: DateTime<Utc>) -> Result<bool, AuthError> {
        let claims = self.decode(token)?;
        Ok(now < claims.expires_at)
    }

    /// Decode a token of the given kind that is unexpired at `now`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidToken` for decode failures or the wrong kind, and
    /// `ExpiredToken` for tokens at or past expiry.
    pub fn verify(
        &self,
        token: &str,
        kind: TokenKind,
        now: DateTime<Utc>,
    ) -> Result<TokenClaims, AuthError> {
        let claims = self.decode(token).map_err(|e| {
            tracing::debug!(error = %e, "Token rejected");
            AuthError::InvalidToken
        })?;

        if claims.kind != kind {
            tracing::debug!(expected = ?kind, actual = ?claims.kind, "Token kind mismatch");
            return Err(AuthError::InvalidToken);
        }
        if now >= claims.expires_at {
            tracing::debug!(subject = %claims.subject, "Token expired");
            return Err(AuthError::ExpiredToken);
        }

        Ok(claims)
    }
}

impl std::fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCodec")
            .field("access_ttl", &self.access_ttl)
            .field("trusted_issuers", &self.validation.iss)
            .finish_non_exhaustive()
    }
}

/// Extract the token from an `Authorization` header value.
///
/// Only the exact `Bearer ` prefix is recognized.
#[must_use]
pub fn extract_bearer(header: &str) -> Option<&str> {
    header.strip_prefix("Bearer ").filter(|t| !t.is_empty())
}
