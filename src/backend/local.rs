// Browser-style local storage backed by an append-only JSONL file

use super::StorageBackend;
use crate::error::StorageError;
use crate::store::now_ms;
use async_trait::async_trait;
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Default file name inside the data directory
pub const LOCAL_STORAGE_FILE: &str = "localstorage.jsonl";

/// Rewrite the log once dead lines outnumber live entries by this factor
const COMPACT_RATIO: usize = 4;

/// One line of the storage log
///
/// A write appends the new value; a removal appends a tombstone. The last
/// line for a key decides its state.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct LogLine {
    key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    value: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    deleted: bool,
    updated_at: i64,
}

/// Page-local key-value storage
///
/// Every access goes through a sidecar `.lock` file: readers share it,
/// writers and compaction hold it exclusively. The log itself may be
/// replaced by compaction, so it is never the lock target. Writers fsync
/// each appended line; a crashed write leaves at most a torn final line,
/// which readers skip.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    path: PathBuf,
}

impl LocalStorage {
    /// Open (or create) the storage log at `path`
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let storage = Self { path };
        storage.compact_if_needed()?;
        Ok(storage)
    }

    /// Open the storage log only if it already exists
    ///
    /// Used to look for entries a previous browser run left behind.
    pub fn open_existing<P: AsRef<Path>>(path: P) -> Option<Self> {
        let path = path.as_ref();
        if path.is_file() {
            Some(Self {
                path: path.to_path_buf(),
            })
        } else {
            None
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock_path(&self) -> PathBuf {
        self.path.with_extension("jsonl.lock")
    }

    /// Lock is released when the returned file is dropped
    fn lock(&self, exclusive: bool) -> Result<File, StorageError> {
        let lock = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(self.lock_path())?;
        if exclusive {
            lock.lock_exclusive()?;
        } else {
            lock.lock_shared()?;
        }
        Ok(lock)
    }

    /// Run blocking file work off the async runtime
    async fn blocking<T, F>(&self, work: F) -> Result<T, StorageError>
    where
        T: Send + 'static,
        F: FnOnce(&LocalStorage) -> Result<T, StorageError> + Send + 'static,
    {
        let storage = self.clone();
        tokio::task::spawn_blocking(move || work(&storage))
            .await
            .map_err(|e| StorageError::Io(format!("storage task failed: {}", e)))?
    }

    fn append(&self, line: &LogLine) -> Result<(), StorageError> {
        let _lock = self.lock(true)?;
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;

        let json = serde_json::to_string(line).map_err(|e| StorageError::Io(e.to_string()))?;
        writeln!(file, "{}", json)?;
        file.sync_all()?;

        Ok(())
    }

    fn read_latest(&self) -> Result<(HashMap<String, String>, usize), StorageError> {
        let _lock = self.lock(false)?;
        self.read_latest_locked()
    }

    /// Read the log, returning the latest live value per key and the number
    /// of lines read. The caller holds the lock.
    fn read_latest_locked(&self) -> Result<(HashMap<String, String>, usize), StorageError> {
        if !self.path.exists() {
            return Ok((HashMap::new(), 0));
        }

        let file = File::open(&self.path)?;
        let reader = BufReader::new(&file);

        let mut entries: HashMap<String, String> = HashMap::new();
        let mut lines = 0;

        for (line_num, line) in reader.lines().enumerate() {
            let line = match line {
                Ok(l) => l,
                Err(e) => {
                    warn!(file = ?self.path, line = line_num + 1, error = ?e, "Failed to read line, skipping");
                    continue;
                }
            };

            if line.trim().is_empty() {
                continue;
            }
            lines += 1;

            let record: LogLine = match serde_json::from_str(&line) {
                Ok(r) => r,
                Err(e) => {
                    warn!(file = ?self.path, line = line_num + 1, error = ?e, "Failed to parse JSON, skipping");
                    continue;
                }
            };

            match record.value {
                Some(value) if !record.deleted => {
                    entries.insert(record.key, value);
                }
                _ => {
                    entries.remove(&record.key);
                }
            }
        }

        Ok((entries, lines))
    }

    /// Rewrite the log with live entries only
    ///
    /// The exclusive lock is held from the read through the rename, so no
    /// append can land on the log being replaced.
    fn compact_if_needed(&self) -> Result<(), StorageError> {
        let _lock = self.lock(true)?;
        let (entries, lines) = self.read_latest_locked()?;
        if lines <= COMPACT_RATIO * entries.len().max(1) {
            return Ok(());
        }

        let tmp_path = self.path.with_extension("jsonl.tmp");
        {
            let mut tmp = File::create(&tmp_path)?;
            let updated_at = now_ms();
            for (key, value) in &entries {
                let line = LogLine {
                    key: key.clone(),
                    value: Some(value.clone()),
                    deleted: false,
                    updated_at,
                };
                let json = serde_json::to_string(&line).map_err(|e| StorageError::Io(e.to_string()))?;
                writeln!(tmp, "{}", json)?;
            }
            tmp.sync_all()?;
        }
        fs::rename(&tmp_path, &self.path)?;

        info!(file = ?self.path, lines, live = entries.len(), "Compacted local storage log");
        Ok(())
    }

    fn truncate(&self) -> Result<(), StorageError> {
        let _lock = self.lock(true)?;
        let file = OpenOptions::new().create(true).write(true).truncate(false).open(&self.path)?;
        file.set_len(0)?;
        file.sync_all()?;
        Ok(())
    }
}

#[async_trait]
impl StorageBackend for LocalStorage {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let key = key.to_string();
        self.blocking(move |s| {
            let (mut entries, _) = s.read_latest()?;
            Ok(entries.remove(&key))
        })
        .await
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        debug!(key, "local: set");
        let line = LogLine {
            key: key.to_string(),
            value: Some(value.to_string()),
            deleted: false,
            updated_at: now_ms(),
        };
        self.blocking(move |s| s.append(&line)).await
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        debug!(key, "local: remove");
        let line = LogLine {
            key: key.to_string(),
            value: None,
            deleted: true,
            updated_at: now_ms(),
        };
        self.blocking(move |s| s.append(&line)).await
    }

    async fn keys(&self) -> Result<Vec<String>, StorageError> {
        self.blocking(|s| {
            let (entries, _) = s.read_latest()?;
            Ok(entries.into_keys().collect())
        })
        .await
    }

    async fn clear(&self) -> Result<(), StorageError> {
        self.blocking(|s| s.truncate()).await?;
        debug!(file = ?self.path, "local: cleared");
        Ok(())
    }
}
