//! User lookup capability.

use std::collections::{BTreeSet, HashMap};
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised by a user store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Backend unreachable or failed.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// Username already taken.
    #[error("User already exists: {0}")]
    AlreadyExists(String),

    /// No such user.
    #[error("User not found: {0}")]
    NotFound(String),

    /// Stored record could not be decoded.
    #[error("Corrupt record: {0}")]
    Corrupt(String),
}

/// A user account as seen by the auth core.
///
/// Usernames are unique and compared case-sensitively.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    /// Login name.
    pub username: String,
    /// Tagged password hash (see `PasswordHasher`).
    pub password_hash: String,
    /// Granted roles.
    pub roles: BTreeSet<String>,
    /// Disabled accounts cannot sign in or authenticate requests.
    pub enabled: bool,
}

impl UserRecord {
    /// Create an enabled user.
    #[must_use]
    pub fn new<I, R>(username: impl Into<String>, password_hash: impl Into<String>, roles: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: Into<String>,
    {
        Self {
            username: username.into(),
            password_hash: password_hash.into(),
            roles: roles.into_iter().map(Into::into).collect(),
            enabled: true,
        }
    }

    /// Check role membership.
    #[must_use]
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }
}

/// Read access to user accounts.
///
/// Implementations must be safe to call from concurrent requests. The auth
/// core never retries: a failed lookup is reported immediately.
pub trait UserStore: Send + Sync {
    /// Find a user by exact username.
    ///
    /// # Errors
    ///
    /// Returns error if the backend cannot be reached.
    fn find_by_username(&self, username: &str) -> Result<Option<UserRecord>, StoreError>;
}

/// In-memory user store.
#[derive(Debug, Default)]
pub struct MemoryUserStore {
    users: RwLock<HashMap<String, UserRecord>>,
}

impl MemoryUserStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with users.
    #[must_use]
    pub fn with_users(users: impl IntoIterator<Item = UserRecord>) -> Self {
        let users = users
            .into_iter()
            .map(|u| (u.username.clone(), u))
            .collect();
        Self {
            users: RwLock::new(users),
        }
    }

    /// Insert or replace a user.
    ///
    /// # Errors
    ///
    /// Returns error if the lock is poisoned.
    pub fn upsert(&self, user: UserRecord) -> Result<(), StoreError> {
        self.users
            .write()
            .map_err(|e| StoreError::Unavailable(e.to_string()))?
            .insert(user.username.clone(), user);
        Ok(())
    }

    /// Number of users.
    #[must_use]
    pub fn len(&self) -> usize {
        self.users.read().map_or(0, |u| u.len())
    }

    /// Whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl UserStore for MemoryUserStore {
    fn find_by_username(&self, username: &str) -> Result<Option<UserRecord>, StoreError> {
        let users = self
            .users
            .read()
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Ok(users.get(username).cloned())
    }
}
