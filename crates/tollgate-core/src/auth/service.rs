//! Credential sign-in and token refresh.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::password::PasswordHasher;
use super::store::UserStore;
use super::token::{TokenCodec, TokenKind, TokenPair};
use super::AuthError;

/// Submitted sign-in credentials. Never persisted.
#[derive(Clone, Default, Deserialize)]
pub struct Credentials {
    /// Login name.
    #[serde(default)]
    pub username: Option<String>,
    /// Plaintext password.
    #[serde(default)]
    pub password: Option<String>,
}

impl Credentials {
    /// Create credentials.
    #[must_use]
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: Some(username.into()),
            password: Some(password.into()),
        }
    }

    /// Username and password, if both are present and not blank.
    fn non_blank(&self) -> Option<(&str, &str)> {
        let username = self.username.as_deref().filter(|u| !u.trim().is_empty())?;
        let password = self.password.as_deref().filter(|p| !p.trim().is_empty())?;
        Some((username, password))
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// Why a credential check failed.
///
/// Only logged; callers outside the core see `AuthError::BadCredentials`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum AuthFailure {
    /// No such user.
    UnknownUser,
    /// Password did not verify.
    WrongPassword,
    /// Account disabled.
    Disabled,
    /// Store lookup failed.
    Store(String),
}

/// Verifies a username/password pair.
pub(crate) trait AuthenticationManager: Send + Sync {
    /// Check the credentials.
    ///
    /// # Errors
    ///
    /// Returns the failure cause.
    fn authenticate(&self, username: &str, password: &str) -> Result<(), AuthFailure>;
}

/// Checks credentials against a `UserStore` with a `PasswordHasher`.
pub(crate) struct StoreAuthenticationManager {
    store: Arc<dyn UserStore>,
    hasher: PasswordHasher,
    dummy_hash: String,
}

impl StoreAuthenticationManager {
    /// Create a manager.
    ///
    /// Computes one hash up front so unknown users cost as much as known ones.
    #[must_use]
    pub(crate) fn new(store: Arc<dyn UserStore>, hasher: PasswordHasher) -> Self {
        let dummy_hash = hasher.hash("tollgate-timing-pad").unwrap_or_default();
        Self {
            store,
            hasher,
            dummy_hash,
        }
    }
}

impl AuthenticationManager for StoreAuthenticationManager {
    fn authenticate(&self, username: &str, password: &str) -> Result<(), AuthFailure> {
        let user = self
            .store
            .find_by_username(username)
            .map_err(|e| AuthFailure::Store(e.to_string()))?;

        let Some(user) = user else {
            let _ = self.hasher.verify(password, &self.dummy_hash);
            return Err(AuthFailure::UnknownUser);
        };

        if !self.hasher.verify(password, &user.password_hash) {
            return Err(AuthFailure::WrongPassword);
        }
        if !user.enabled {
            return Err(AuthFailure::Disabled);
        }
        Ok(())
    }
}

impl std::fmt::Debug for StoreAuthenticationManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreAuthenticationManager")
            .field("hasher", &self.hasher)
            .finish_non_exhaustive()
    }
}

/// Sign-in and refresh.
#[derive(Clone)]
pub struct AuthenticationService {
    manager: Arc<dyn AuthenticationManager>,
    store: Arc<dyn UserStore>,
    codec: Arc<TokenCodec>,
}

impl AuthenticationService {
    /// Create a service that verifies credentials against `store`.
    #[must_use]
    pub fn new(store: Arc<dyn UserStore>, hasher: PasswordHasher, codec: Arc<TokenCodec>) -> Self {
        let manager = Arc::new(StoreAuthenticationManager::new(Arc::clone(&store), hasher));
        Self::with_manager(manager, store, codec)
    }

    /// Create a service with a custom credential check.
    #[must_use]
    pub(crate) fn with_manager(
        manager: Arc<dyn AuthenticationManager>,
        store: Arc<dyn UserStore>,
        codec: Arc<TokenCodec>,
    ) -> Self {
        Self {
            manager,
            store,
            codec,
        }
    }

    /// Token codec used for issuing.
    #[must_use]
    pub fn codec(&self) -> &TokenCodec {
        &self.codec
    }

    /// Exchange credentials for a token pair.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::BadCredentials` for every failure.
    pub fn signin(
        &self,
        credentials: &Credentials,
        now: DateTime<Utc>,
        issuer: &str,
    ) -> Result<TokenPair, AuthError> {
        let Some((username, password)) = credentials.non_blank() else {
            debug!("Sign-in rejected: blank credentials");
            return Err(AuthError::BadCredentials);
        };

        if let Err(failure) = self.manager.authenticate(username, password) {
            match failure {
                AuthFailure::Store(e) => warn!(error = %e, "User store failed during sign-in"),
                cause => debug!(username = %username, cause = ?cause, "Sign-in rejected"),
            }
            return Err(AuthError::BadCredentials);
        }

        let user = match self.store.find_by_username(username) {
            Ok(Some(user)) => user,
            Ok(None) => {
                warn!(username = %username, "User vanished after authentication");
                return Err(AuthError::BadCredentials);
            }
            Err(e) => {
                warn!(error = %e, "User store failed during sign-in");
                return Err(AuthError::BadCredentials);
            }
        };

        let pair = self
            .codec
            .issue_pair(&user.username, &user.roles, now, issuer)
            .map_err(|e| {
                warn!(error = %e, "Token issuing failed");
                AuthError::BadCredentials
            })?;

        info!(username = %user.username, "Signed in");
        Ok(pair)
    }

    /// Exchange a refresh token for a fresh pair.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidToken` if the token is invalid, expired,
    /// not a refresh token, or issued to someone else. Returns
    /// `AuthError::StoreUnavailable` if the user cannot be looked up.
    pub fn refresh(
        &self,
        username: &str,
        refresh_token: &str,
        now: DateTime<Utc>,
        issuer: &str,
    ) -> Result<TokenPair, AuthError> {
        let claims = self
            .codec
            .verify(refresh_token, TokenKind::Refresh, now)
            .map_err(|_| AuthError::InvalidToken)?;

        if claims.subject != username {
            debug!(username = %username, "Refresh token subject mismatch");
            return Err(AuthError::InvalidToken);
        }

        let user = match self.store.find_by_username(username) {
            Ok(Some(user)) if user.enabled => user,
            Ok(_) => {
                debug!(username = %username, "Refresh for unknown or disabled user");
                return Err(AuthError::InvalidToken);
            }
            Err(e) => {
                warn!(error = %e, "User store failed during refresh");
                return Err(AuthError::StoreUnavailable);
            }
        };

        let pair = self
            .codec
            .issue_pair(&user.username, &user.roles, now, issuer)
            .map_err(|e| {
                warn!(error = %e, "Token issuing failed");
                AuthError::InvalidToken
            })?;

        info!(username = %user.username, "Tokens refreshed");
        Ok(pair)
    }
}

impl std::fmt::Debug for AuthenticationService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthenticationService")
            .field("codec", &self.codec)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use chrono::TimeDelta;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::auth::store::{MemoryUserStore, StoreError, UserRecord};
    use crate::secrets::SigningSecret;

    const ISSUER: &str = "http://localhost:8080";

    struct CountingUserStore {
        inner: MemoryUserStore,
        calls: AtomicUsize,
    }

    impl UserStore for CountingUserStore {
        fn find_by_username(&self, username: &str) -> Result<Option<UserRecord>, StoreError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.find_by_username(username)
        }
    }

    struct DownStore;

    impl UserStore for DownStore {
        fn find_by_username(&self, _: &str) -> Result<Option<UserRecord>, StoreError> {
            Err(StoreError::Unavailable("connection refused".into()))
        }
    }

    fn hasher() -> PasswordHasher {
        PasswordHasher::with_iterations(1_000)
    }

    fn codec() -> Arc<TokenCodec> {
        Arc::new(
            TokenCodec::new(
                &SigningSecret::new("secret").derive_key(),
                Duration::from_secs(3_600),
                &[],
            )
            .unwrap(),
        )
    }

    fn t0() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    fn victor_store() -> Arc<CountingUserStore> {
        let hash = hasher().hash("12345678").unwrap();
        Arc::new(CountingUserStore {
            inner: MemoryUserStore::with_users([UserRecord::new("victor", hash, ["USER"])]),
            calls: AtomicUsize::new(0),
        })
    }

    fn service(store: Arc<CountingUserStore>) -> AuthenticationService {
        AuthenticationService::new(store, hasher(), codec())
    }

    #[test]
    fn test_signin_issues_pair() {
        let svc = service(victor_store());
        let pair = svc
            .signin(&Credentials::new("victor", "12345678"), t0(), ISSUER)
            .unwrap();

        assert!(pair.authenticated);
        assert_eq!(pair.username, "victor");
        assert!(!pair.access_token.is_empty());
        assert!(!pair.refresh_token.is_empty());

        let claims = svc.codec().decode(&pair.access_token).unwrap();
        assert_eq!(claims.roles, vec!["USER".to_string()]);
        assert_eq!(claims.expires_at - claims.issued_at, TimeDelta::hours(1));
    }

    #[test]
    fn test_blank_credentials_skip_store() {
        let store = victor_store();
        let svc = service(Arc::clone(&store));

        for creds in [
            Credentials::new("victor", ""),
            Credentials::new("victor", "   "),
            Credentials::new("", "12345678"),
            Credentials::default(),
        ] {
            assert_eq!(
                svc.signin(&creds, t0(), ISSUER).unwrap_err(),
                AuthError::BadCredentials
            );
        }
        assert_eq!(store.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_failures_are_indistinguishable() {
        let store = victor_store();
        store
            .inner
            .upsert(UserRecord {
                enabled: false,
                ..UserRecord::new("disabled", hasher().hash("12345678").unwrap(), ["USER"])
            })
            .unwrap();
        let svc = service(store);

        let outcomes: Vec<_> = [
            Credentials::new("victor", "wrong"),
            Credentials::new("nobody", "12345678"),
            Credentials::new("disabled", "12345678"),
            Credentials::new("Victor", "12345678"),
        ]
        .iter()
        .map(|c| svc.signin(c, t0(), ISSUER).unwrap_err())
        .collect();

        assert!(outcomes.iter().all(|e| *e == AuthError::BadCredentials));
    }

    #[test]
    fn test_store_down_is_bad_credentials() {
        let svc = AuthenticationService::new(Arc::new(DownStore), hasher(), codec());
        assert_eq!(
            svc.signin(&Credentials::new("victor", "12345678"), t0(), ISSUER)
                .unwrap_err(),
            AuthError::BadCredentials
        );
    }

    struct FixedManager(AuthFailure);

    impl AuthenticationManager for FixedManager {
        fn authenticate(&self, _: &str, _: &str) -> Result<(), AuthFailure> {
            Err(self.0.clone())
        }
    }

    #[test]
    fn test_every_failure_cause_collapses() {
        for cause in [
            AuthFailure::UnknownUser,
            AuthFailure::WrongPassword,
            AuthFailure::Disabled,
            AuthFailure::Store("timeout".into()),
        ] {
            let svc = AuthenticationService::with_manager(
                Arc::new(FixedManager(cause)),
                victor_store(),
                codec(),
            );
            assert_eq!(
                svc.signin(&Credentials::new("victor", "12345678"), t0(), ISSUER),
                Err(AuthError::BadCredentials)
            );
        }
    }

    #[test]
    fn test_refresh_after_access_expiry() {
        let svc = service(victor_store());
        let pair = svc
            .signin(&Credentials::new("victor", "12345678"), t0(), ISSUER)
            .unwrap();

        let refresh_at = t0() + TimeDelta::hours(1) + TimeDelta::milliseconds(1);
        assert!(!svc.codec().validate(&pair.access_token, refresh_at).unwrap());

        let fresh = svc
            .refresh("victor", &pair.refresh_token, refresh_at, ISSUER)
            .unwrap();
        let claims = svc.codec().decode(&fresh.access_token).unwrap();

        // `iat` is truncated to whole seconds, so the new lifetime starts at
        // the second of the refresh, not at its millisecond.
        assert_eq!(claims.issued_at, t0() + TimeDelta::hours(1));
        assert_eq!(claims.expires_at, claims.issued_at + svc.codec().access_ttl());
        assert_eq!(claims.expires_at, t0() + TimeDelta::hours(2));
        assert_eq!(fresh.access_expires_at, claims.expires_at);
        assert!(svc.codec().validate(&fresh.access_token, refresh_at).unwrap());
    }

    #[test]
    fn test_refresh_rejections() {
        let svc = service(victor_store());
        let pair = svc
            .signin(&Credentials::new("victor", "12345678"), t0(), ISSUER)
            .unwrap();

        // Someone else's name.
        assert_eq!(
            svc.refresh("mallory", &pair.refresh_token, t0(), ISSUER),
            Err(AuthError::InvalidToken)
        );
        // Access token in place of a refresh token.
        assert_eq!(
            svc.refresh("victor", &pair.access_token, t0(), ISSUER),
            Err(AuthError::InvalidToken)
        );
        // Past 3x TTL.
        assert_eq!(
            svc.refresh("victor", &pair.refresh_token, t0() + TimeDelta::hours(3), ISSUER),
            Err(AuthError::InvalidToken)
        );
        assert_eq!(
            svc.refresh("victor", "garbage", t0(), ISSUER),
            Err(AuthError::InvalidToken)
        );
    }

    #[test]
    fn test_refresh_uses_current_roles() {
        let store = victor_store();
        let svc = service(Arc::clone(&store));
        let pair = svc
            .signin(&Credentials::new("victor", "12345678"), t0(), ISSUER)
            .unwrap();

        let mut user = store.inner.find_by_username("victor").unwrap().unwrap();
        user.roles.insert("ADMIN".to_string());
        store.inner.upsert(user).unwrap();

        let fresh = svc
            .refresh("victor", &pair.refresh_token, t0(), ISSUER)
            .unwrap();
        let claims = svc.codec().decode(&fresh.access_token).unwrap();
        assert_eq!(claims.roles, vec!["ADMIN".to_string(), "USER".to_string()]);
    }

    #[test]
    fn test_credentials_debug_redacts_password() {
        let rendered = format!("{:?}", Credentials::new("victor", "12345678"));
        assert!(rendered.contains("victor"));
        assert!(!rendered.contains("12345678"));
    }
}
