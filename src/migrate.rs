// One-time copy of browser-stored entries into native storage

use crate::backend::StorageBackend;
use crate::error::StorageError;
use crate::store::PersistenceStore;
use tracing::{debug, error, info};

/// Reserved key holding the migration flag
pub const MIGRATION_FLAG_KEY: &str = "_storage_migrated_";

/// Result of a migration run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationOutcome {
    /// Not running natively; nothing to migrate into
    NotNative,
    /// The flag was already set; nothing was read from the legacy store
    AlreadyMigrated,
    /// Every legacy entry was copied and the flag is now set
    Migrated { copied: usize },
    /// A step failed; the flag is left unset so the next start retries
    Failed { copied: usize },
}

/// Copies the entries a browser run left behind into the native store
///
/// The copy never touches the legacy source. Re-running after success is a
/// no-op; re-running after a failure copies everything again, which is
/// harmless because each copy overwrites with the same value.
pub struct MigrationRunner<'a> {
    native: bool,
    legacy: Option<&'a dyn StorageBackend>,
    store: &'a PersistenceStore,
}

impl<'a> MigrationRunner<'a> {
    /// `legacy` is the browser-style store from a previous web run, if one exists
    pub fn new(native: bool, legacy: Option<&'a dyn StorageBackend>, store: &'a PersistenceStore) -> Self {
        Self { native, legacy, store }
    }

    /// Run the migration; failures are logged, never returned
    pub async fn run(&self) -> MigrationOutcome {
        if !self.native {
            return MigrationOutcome::NotNative;
        }

        if self.store.get(MIGRATION_FLAG_KEY, false).await {
            debug!("Storage already migrated");
            return MigrationOutcome::AlreadyMigrated;
        }

        let mut copied = 0;
        match self.copy_all(&mut copied).await {
            Ok(()) => {
                info!(copied, "Migration from local storage complete");
                MigrationOutcome::Migrated { copied }
            }
            Err(e) => {
                error!(copied, error = %e, "Storage migration failed, will retry on next start");
                MigrationOutcome::Failed { copied }
            }
        }
    }

    async fn copy_all(&self, copied: &mut usize) -> Result<(), StorageError> {
        if let Some(legacy) = self.legacy {
            for key in legacy.keys().await? {
                // The flag only ever means "this store finished migrating"
                if key == MIGRATION_FLAG_KEY {
                    continue;
                }

                // Entries removed since enumeration are skipped
                let Some(value) = legacy.get(&key).await? else {
                    continue;
                };

                self.store.import_verbatim(&key, &value).await?;
                *copied += 1;
                debug!(key = %key, "Migrated entry");
            }
        }

        self.store.set(MIGRATION_FLAG_KEY, &true).await
    }
}
