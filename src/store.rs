// Unified key-value persistence over the platform storage backend

use crate::backend::StorageBackend;
use crate::envelope::Envelope;
use crate::error::StorageError;
use serde::{Serialize, de::DeserializeOwned};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, warn};

/// Single read/write contract over whichever backend the platform provides
///
/// Values are written inside an [`Envelope`] recording whether they are
/// structured JSON or an opaque string, so reads never have to guess.
#[derive(Clone)]
pub struct PersistenceStore {
    backend: Arc<dyn StorageBackend>,
}

impl PersistenceStore {
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self { backend }
    }

    /// Name of the backend in use
    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Store a structured value under `key`, replacing any existing entry
    pub async fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<(), StorageError> {
        let envelope = Envelope::json(value).map_err(|source| StorageError::Encode {
            key: key.to_string(),
            source,
        })?;
        self.write(key, &envelope).await
    }

    /// Store an opaque string under `key`
    pub async fn set_raw(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.write(key, &Envelope::Raw(value.to_string())).await
    }

    async fn write(&self, key: &str, envelope: &Envelope) -> Result<(), StorageError> {
        debug!(key, backend = self.backend.name(), "store: set");
        self.backend.set(key, &envelope.encode()).await.inspect_err(|e| {
            warn!(key, error = %e, "Failed to store value");
        })
    }

    /// Read `key`, falling back to `default`
    ///
    /// Never fails: a missing key, a backend failure, or a stored value that
    /// does not decode as `T` all yield `default`.
    pub async fn get<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        let Some(envelope) = self.entry(key).await else {
            return default;
        };

        match envelope.into_value() {
            Ok(value) => value,
            Err(e) => {
                warn!(key, error = %e, "Stored value has unexpected shape, using default");
                default
            }
        }
    }

    /// Stored envelope for `key`, if any
    ///
    /// Backend failures are logged and reported as absent.
    pub async fn entry(&self, key: &str) -> Option<Envelope> {
        match self.backend.get(key).await {
            Ok(text) => text.map(|t| Envelope::decode(&t)),
            Err(e) => {
                warn!(key, error = %e, "Failed to read value");
                None
            }
        }
    }

    /// Remove `key`; absent keys are ignored
    pub async fn remove(&self, key: &str) -> Result<(), StorageError> {
        debug!(key, backend = self.backend.name(), "store: remove");
        self.backend.remove(key).await
    }

    /// Every key currently stored
    pub async fn list_keys(&self) -> Result<BTreeSet<String>, StorageError> {
        Ok(self.backend.keys().await?.into_iter().collect())
    }

    /// Remove every entry, including the migration flag
    pub async fn clear(&self) -> Result<(), StorageError> {
        debug!(backend = self.backend.name(), "store: clear");
        self.backend.clear().await
    }

    /// Copy text taken from another store without re-encoding it
    ///
    /// Text that already is an envelope is written as is; anything else is
    /// stored as a raw string.
    pub(crate) async fn import_verbatim(&self, key: &str, text: &str) -> Result<(), StorageError> {
        if Envelope::is_encoded(text) {
            self.backend.set(key, text).await
        } else {
            self.set_raw(key, text).await
        }
    }
}

// Helper function for timestamps
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
