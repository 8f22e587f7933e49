//! UserDirectory port - user accounts live outside the scheduling core.
//!
//! Only the total is needed, for the `users` gauge.

use async_trait::async_trait;

use crate::domain::Result;

#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn count_users(&self) -> Result<u64>;
}
