//! Credential store
//!
//! Volatile username → password mapping that lives for the process lifetime.
//! One coarse lock guards the whole map; entries are never updated by
//! registration and never deleted.

use std::collections::HashMap;

use tokio::sync::Mutex;
use tracing::debug;

/// Thread-safe credential store
#[derive(Debug, Default)]
pub struct CredentialStore {
    users: Mutex<HashMap<String, String>>,
}

impl CredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Unconditional upsert
    pub async fn set(&self, username: &str, password: &str) {
        self.users
            .lock()
            .await
            .insert(username.to_string(), password.to_string());
    }

    /// Stored password for `username`, if any
    pub async fn get(&self, username: &str) -> Option<String> {
        self.users.lock().await.get(username).cloned()
    }

    pub async fn exists(&self, username: &str) -> bool {
        self.users.lock().await.contains_key(username)
    }

    /// Insert only if `username` is unknown, under a single lock acquisition
    ///
    /// Returns `true` for the one caller that inserted.
    pub async fn register_if_absent(&self, username: &str, password: &str) -> bool {
        let mut users = self.users.lock().await;
        if users.contains_key(username) {
            return false;
        }
        users.insert(username.to_string(), password.to_string());
        debug!("Registered user '{}' ({} total)", username, users.len());
        true
    }

    /// True only if `username` is known and `password` matches
    pub async fn verify(&self, username: &str, password: &str) -> bool {
        self.users
            .lock()
            .await
            .get(username)
            .is_some_and(|stored| stored == password)
    }

    /// Number of registered users
    pub async fn len(&self) -> usize {
        self.users.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.users.lock().await.is_empty()
    }
}
