//! User store backed by sled.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tollgate_core::auth::{StoreError, UserRecord, UserStore};

const KEY_PREFIX: &str = "user:";

/// A persisted user with bookkeeping timestamps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredUser {
    /// Account data seen by the auth core.
    #[serde(flatten)]
    pub record: UserRecord,
    /// When created.
    pub created_at: DateTime<Utc>,
    /// When last modified.
    pub updated_at: DateTime<Utc>,
}

/// User store backed by sled, keyed by exact username.
pub struct SledUserStore {
    tree: sled::Tree,
}

fn key(username: &str) -> Vec<u8> {
    format!("{KEY_PREFIX}{username}").into_bytes()
}

impl SledUserStore {
    /// Open or create a user store at the given path.
    ///
    /// # Errors
    ///
    /// Returns error if database cannot be opened.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let db = sled::open(path)
            .map_err(|e| StoreError::Unavailable(format!("Failed to open user database: {e}")))?;
        Self::with_db(db)
    }

    /// Create a user store with an existing sled database.
    ///
    /// # Errors
    ///
    /// Returns error if tree cannot be opened.
    pub fn with_db(db: sled::Db) -> Result<Self, StoreError> {
        let tree = db
            .open_tree("users")
            .map_err(|e| StoreError::Unavailable(format!("Failed to open users tree: {e}")))?;

        Ok(Self { tree })
    }

    /// Check if any users exist.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    /// Count total users.
    #[must_use]
    pub fn count(&self) -> usize {
        self.tree.len()
    }

    /// Create a new user.
    ///
    /// # Errors
    ///
    /// Returns error if the username is taken or storage fails.
    pub fn create(&self, record: &UserRecord) -> Result<StoredUser, StoreError> {
        let now = Utc::now();
        let user = StoredUser {
            record: record.clone(),
            created_at: now,
            updated_at: now,
        };
        let value = serde_json::to_vec(&user)
            .map_err(|e| StoreError::Corrupt(format!("Serialization error: {e}")))?;

        self.tree
            .compare_and_swap(key(&record.username), None::<&[u8]>, Some(value))
            .map_err(|e| StoreError::Unavailable(format!("Insert error: {e}")))?
            .map_err(|_| StoreError::AlreadyExists(record.username.clone()))?;

        self.flush()?;
        Ok(user)
    }

    /// Get a user by username.
    ///
    /// # Errors
    ///
    /// Returns error if storage fails or the record does not decode.
    pub fn get_by_username(&self, username: &str) -> Result<Option<StoredUser>, StoreError> {
        match self.tree.get(key(username)) {
            Ok(Some(value)) => serde_json::from_slice(&value)
                .map(Some)
                .map_err(|e| StoreError::Corrupt(format!("Deserialization error: {e}"))),
            Ok(None) => Ok(None),
            Err(e) => Err(StoreError::Unavailable(format!("Get error: {e}"))),
        }
    }

    /// Replace an existing user's record.
    ///
    /// # Errors
    ///
    /// Returns error if the user doesn't exist or storage fails.
    pub fn update(&self, record: &UserRecord) -> Result<StoredUser, StoreError> {
        let existing = self
            .get_by_username(&record.username)?
            .ok_or_else(|| StoreError::NotFound(record.username.clone()))?;

        let user = StoredUser {
            record: record.clone(),
            created_at: existing.created_at,
            updated_at: Utc::now(),
        };
        let value = serde_json::to_vec(&user)
            .map_err(|e| StoreError::Corrupt(format!("Serialization error: {e}")))?;

        self.tree
            .insert(key(&record.username), value)
            .map_err(|e| StoreError::Unavailable(format!("Update error: {e}")))?;

        self.flush()?;
        Ok(user)
    }

    /// Delete a user.
    ///
    /// # Errors
    ///
    /// Returns error if storage fails.
    pub fn delete(&self, username: &str) -> Result<bool, StoreError> {
        let removed = self
            .tree
            .remove(key(username))
            .map_err(|e| StoreError::Unavailable(format!("Delete error: {e}")))?
            .is_some();

        self.flush()?;
        Ok(removed)
    }

    /// List all users, ordered by username.
    ///
    /// # Errors
    ///
    /// Returns error if storage fails.
    pub fn list(&self) -> Result<Vec<StoredUser>, StoreError> {
        self.tree
            .scan_prefix(KEY_PREFIX)
            .map(|result| {
                let (_, value) =
                    result.map_err(|e| StoreError::Unavailable(format!("Iter error: {e}")))?;
                serde_json::from_slice(&value)
                    .map_err(|e| StoreError::Corrupt(format!("Deserialization error: {e}")))
            })
            .collect()
    }

    fn flush(&self) -> Result<(), StoreError> {
        self.tree
            .flush()
            .map(|_| ())
            .map_err(|e| StoreError::Unavailable(format!("Flush error: {e}")))
    }
}

impl UserStore for SledUserStore {
    fn find_by_username(&self, username: &str) -> Result<Option<UserRecord>, StoreError> {
        Ok(self.get_by_username(username)?.map(|u| u.record))
    }
}

impl std::fmt::Debug for SledUserStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SledUserStore")
            .field("user_count", &self.count())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open() -> (TempDir, SledUserStore) {
        let temp_dir = TempDir::new().unwrap();
        let store = SledUserStore::open(&temp_dir.path().join("users.db")).unwrap();
        (temp_dir, store)
    }

    #[test]
    fn test_user_store() {
        let (_temp, store) = open();
        assert!(store.is_empty());

        store
            .create(&UserRecord::new("admin", "{pbkdf2}x", ["ADMIN"]))
            .unwrap();

        assert!(!store.is_empty());
        assert_eq!(store.count(), 1);

        let loaded = store.get_by_username("admin").unwrap().unwrap();
        assert_eq!(loaded.record.password_hash, "{pbkdf2}x");
        assert!(loaded.record.has_role("ADMIN"));

        let found = store.find_by_username("admin").unwrap().unwrap();
        assert_eq!(found, loaded.record);
        assert!(store.find_by_username("Admin").unwrap().is_none());
    }

    #[test]
    fn test_duplicate_user() {
        let (_temp, store) = open();
        store.create(&UserRecord::new("admin", "h1", ["ADMIN"])).unwrap();

        let result = store.create(&UserRecord::new("admin", "h2", ["USER"]));
        assert!(matches!(result, Err(StoreError::AlreadyExists(_))));
        assert_eq!(
            store.get_by_username("admin").unwrap().unwrap().record.password_hash,
            "h1"
        );
    }

    #[test]
    fn test_update_and_delete() {
        let (_temp, store) = open();
        let created = store.create(&UserRecord::new("victor", "h", ["USER"])).unwrap();

        let mut record = created.record.clone();
        record.enabled = false;
        let updated = store.update(&record).unwrap();
        assert!(!updated.record.enabled);
        assert_eq!(updated.created_at, created.created_at);

        assert!(matches!(
            store.update(&UserRecord::new("nobody", "h", ["USER"])),
            Err(StoreError::NotFound(_))
        ));

        assert!(store.delete("victor").unwrap());
        assert!(!store.delete("victor").unwrap());
        assert!(store.is_empty());
    }

    #[test]
    fn test_list_sorted() {
        let (_temp, store) = open();
        for name in ["carol", "alice", "bob"] {
            store.create(&UserRecord::new(name, "h", ["USER"])).unwrap();
        }

        let names: Vec<_> = store
            .list()
            .unwrap()
            .into_iter()
            .map(|u| u.record.username)
            .collect();
        assert_eq!(names, ["alice", "bob", "carol"]);
    }
}
