//! Durable key-value store
//!
//! Job records, rule sets and enrichment entries are all persisted through
//! the [`KvStore`] contract:
//! - `put` is atomic: readers see the previous value or the new one, never a
//!   partially written record
//! - reads go through [`read_or_default`], which returns the caller's default
//!   when the key is absent or the stored value no longer deserializes
//!
//! Backends: [`SqliteKvStore`] (durable) and [`MemoryKvStore`] (tests,
//! embedders that want no persistence).

mod memory;
mod retry;
mod sqlite;

pub use memory::MemoryKvStore;
pub use retry::LockRetry;
pub use sqlite::SqliteKvStore;

use crate::Result;
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};

/// Atomic string-valued key-value store
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Raw value for `key`, `None` when absent
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Atomically replace the value stored under `key`
    async fn put(&self, key: &str, value: &str) -> Result<()>;

    /// All entries whose key starts with `prefix`, ordered by key
    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, String)>>;
}

/// Read and deserialize `key`, falling back to `default` when absent or corrupt
pub async fn read_or_default<T>(store: &dyn KvStore, key: &str, default: T) -> Result<T>
where
    T: DeserializeOwned,
{
    match store.get(key).await? {
        None => Ok(default),
        Some(raw) => match serde_json::from_str::<T>(&raw) {
            Ok(value) => Ok(value),
            Err(e) => {
                tracing::warn!(key, error = %e, "Stored value unreadable, using default");
                Ok(default)
            }
        },
    }
}

/// Serialize `value` as JSON and store it atomically under `key`
pub async fn write_json<T>(store: &dyn KvStore, key: &str, value: &T) -> Result<()>
where
    T: Serialize + ?Sized,
{
    let raw = serde_json::to_string(value)?;
    store.put(key, &raw).await
}
