//! Key-value storage collaborator.
//!
//! The relationship core only needs to load, save and delete opaque JSON
//! blobs by key. Writes are atomic per key; there are no cross-key
//! transactions.

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::{StorageError, StorageResult};

/// Blob store keyed by string.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Load the value stored under `key`, if any.
    async fn load(&self, key: &str) -> StorageResult<Option<Value>>;
    /// Store `value` under `key`, replacing any previous value.
    async fn save(&self, key: &str, value: &Value) -> StorageResult<()>;
    /// Remove `key`. Deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> StorageResult<()>;
}

/// Load and deserialize the value under `key`.
pub async fn load_typed<S, T>(store: &S, key: &str) -> StorageResult<Option<T>>
where
    S: KeyValueStore + ?Sized,
    T: DeserializeOwned,
{
    match store.load(key).await? {
        Some(value) => serde_json::from_value(value)
            .map(Some)
            .map_err(|e| StorageError::Serialization {
                key: key.to_string(),
                message: e.to_string(),
            }),
        None => Ok(None),
    }
}

/// Serialize `value` and store it under `key`.
pub async fn save_typed<S, T>(store: &S, key: &str, value: &T) -> StorageResult<()>
where
    S: KeyValueStore + ?Sized,
    T: Serialize + ?Sized,
{
    let value = serde_json::to_value(value).map_err(|e| StorageError::Serialization {
        key: key.to_string(),
        message: e.to_string(),
    })?;
    store.save(key, &value).await
}

/// Keys under which collections, status and backups are stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageKeys {
    /// Prefix for the status and backup keys.
    pub domain: String,
    pub tasks: String,
    pub notes: String,
    pub sessions: String,
}

impl Default for StorageKeys {
    fn default() -> Self {
        Self {
            domain: "relationship".to_string(),
            tasks: "tasks".to_string(),
            notes: "notes".to_string(),
            sessions: "sessions".to_string(),
        }
    }
}

impl StorageKeys {
    /// `<domain>-migration-status-v<version>`
    pub fn status_key(&self, version: u32) -> String {
        format!("{}-migration-status-v{}", self.domain, version)
    }

    /// `<domain>-backup-<timestamp>` with `:` and `.` replaced by `-`.
    pub fn backup_key(&self, at: DateTime<Utc>) -> String {
        let stamp = at
            .to_rfc3339_opts(SecondsFormat::Millis, true)
            .replace([':', '.'], "-");
        format!("{}-backup-{}", self.domain, stamp)
    }
}
