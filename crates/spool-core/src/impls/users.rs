//! In-memory user directory.

use std::collections::BTreeSet;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::Result;
use crate::ports::UserDirectory;

/// Registered user names. Enough to back the `users` gauge.
#[derive(Debug, Default)]
pub struct InMemoryUserDirectory {
    users: RwLock<BTreeSet<String>>,
}

impl InMemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false if the name was already registered.
    pub async fn register(&self, name: impl Into<String>) -> bool {
        self.users.write().await.insert(name.into())
    }
}

#[async_trait]
impl UserDirectory for InMemoryUserDirectory {
    async fn count_users(&self) -> Result<u64> {
        Ok(self.users.read().await.len() as u64)
    }
}
