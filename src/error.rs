// Error types for storage and notification services

use thiserror::Error;

/// Failure of a mutating storage call
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("storage I/O error: {0}")]
    Io(String),

    #[error("failed to encode value for '{key}': {source}")]
    Encode {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("native host is unavailable")]
    HostUnavailable,
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Io(err.to_string())
    }
}

/// Failure reported by a notification bridge
#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("notification permission not granted")]
    PermissionDenied,

    #[error("host rejected notification request: {0}")]
    Scheduling(String),

    #[error("native host is unavailable")]
    HostUnavailable,
}

impl From<rusqlite::Error> for NotifyError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Scheduling(err.to_string())
    }
}
