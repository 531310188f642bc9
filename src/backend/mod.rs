// Storage backends behind the persistence store

use crate::error::StorageError;
use async_trait::async_trait;

pub mod local;

pub use local::{LOCAL_STORAGE_FILE, LocalStorage};

/// Flat string-to-string key-value storage
///
/// Values are stored as opaque text; encoding is the caller's concern.
/// Every call is asynchronous even when the backend completes synchronously.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    async fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Write `value` under `key`, replacing any existing value
    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Remove `key`; removing an absent key is not an error
    async fn remove(&self, key: &str) -> Result<(), StorageError>;

    async fn keys(&self) -> Result<Vec<String>, StorageError>;

    /// Remove every entry
    async fn clear(&self) -> Result<(), StorageError>;
}
