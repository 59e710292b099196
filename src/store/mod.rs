// ABOUTME: Key-value checkpoint store used to persist deployment contexts.
// ABOUTME: Async trait plus in-memory and file-backed implementations.

mod error;
mod file;
mod memory;

pub use error::{StoreError, StoreErrorKind};
pub use file::FileStore;
pub use memory::MemoryStore;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Default time-to-live for persisted entries.
pub const DEFAULT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Key-value store with per-entry expiry.
///
/// Expired entries behave exactly like missing ones.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Insert or overwrite `key`.
    async fn put(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError>;

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Atomically create `key`. Returns `false` if a live entry already exists.
    async fn put_if_absent(&self, key: &str, value: &str, ttl: Duration)
    -> Result<bool, StoreError>;

    /// Remove `key`. Missing keys are not an error.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;
}

/// Key layout shared by everything persisting deployment state.
pub mod keys {
    pub fn context(deployment_id: &str) -> String {
        format!("deployment:{deployment_id}")
    }

    pub fn checkpoint(deployment_id: &str, sequence: usize) -> String {
        format!("deployment:checkpoint:{deployment_id}:{sequence}")
    }

    pub fn lease(deployment_id: &str) -> String {
        format!("deployment:lease:{deployment_id}")
    }

    pub fn cancel(deployment_id: &str) -> String {
        format!("deployment:cancel:{deployment_id}")
    }
}

fn expires_at(ttl: Duration) -> DateTime<Utc> {
    let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);
    Utc::now()
        .checked_add_signed(ttl)
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
