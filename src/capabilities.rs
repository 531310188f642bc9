// Platform capabilities, built once at startup

use crate::backend::{LOCAL_STORAGE_FILE, LocalStorage, StorageBackend};
use crate::config::Config;
use crate::host::{HOST_DB_FILE, NativeHost};
use crate::migrate::{MigrationOutcome, MigrationRunner};
use crate::notify::{NotificationBridge, NotificationScheduler};
use crate::platform::Platform;
use crate::reminder::TaskNotificationBinder;
use crate::store::PersistenceStore;
use eyre::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Everything the platform provides, chosen once from the platform probe
///
/// Services receive their backend from here instead of looking it up.
pub struct Capabilities {
    platform: Platform,
    store: PersistenceStore,
    legacy: Option<Arc<dyn StorageBackend>>,
    scheduler: NotificationScheduler,
    host: Option<NativeHost>,
    task_reminders: bool,
}

impl Capabilities {
    /// Build capabilities for the platform `config` resolves to
    pub fn build(config: &Config) -> Result<Self> {
        let platform = config.platform.resolve();
        Self::for_platform(platform, &config.data_dir(), config)
    }

    /// Build capabilities for an explicit platform rooted at `data_dir`
    pub fn for_platform(platform: Platform, data_dir: &Path, config: &Config) -> Result<Self> {
        let local_path = data_dir.join(LOCAL_STORAGE_FILE);
        let notifications = &config.notifications;

        let caps = match platform {
            Platform::Native => {
                let host = NativeHost::spawn(data_dir.join(HOST_DB_FILE), notifications.prompt_answer)
                    .context("Failed to start native host")?;
                let legacy = LocalStorage::open_existing(&local_path).map(|s| Arc::new(s) as Arc<dyn StorageBackend>);
                let bridge: Arc<dyn NotificationBridge> = Arc::new(host.clone());

                Self {
                    platform,
                    store: PersistenceStore::new(Arc::new(host.clone())),
                    legacy,
                    scheduler: NotificationScheduler::new(Some(bridge), notifications.style.clone()),
                    host: Some(host),
                    task_reminders: notifications.task_reminders,
                }
            }
            Platform::Web => {
                let local = LocalStorage::open(&local_path).context("Failed to open local storage")?;
                Self {
                    platform,
                    store: PersistenceStore::new(Arc::new(local)),
                    legacy: None,
                    scheduler: NotificationScheduler::new(None, notifications.style.clone()),
                    host: None,
                    task_reminders: notifications.task_reminders,
                }
            }
        };

        info!(
            platform = %platform,
            data_dir = ?data_dir,
            storage = caps.store.backend_name(),
            delivery = caps.scheduler.can_deliver(),
            "Capabilities ready"
        );
        Ok(caps)
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    pub fn store(&self) -> &PersistenceStore {
        &self.store
    }

    pub fn scheduler(&self) -> &NotificationScheduler {
        &self.scheduler
    }

    /// Native host handle, present only in the native container
    pub fn host(&self) -> Option<&NativeHost> {
        self.host.as_ref()
    }

    pub fn binder(&self) -> TaskNotificationBinder<'_> {
        TaskNotificationBinder::new(&self.scheduler, self.task_reminders)
    }

    /// Run the startup migration against this platform's store
    pub async fn migrate(&self) -> MigrationOutcome {
        MigrationRunner::new(self.platform.is_native(), self.legacy.as_deref(), &self.store)
            .run()
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrate::MIGRATION_FLAG_KEY;
    use crate::notify::{NOT_SCHEDULED, ScheduleRequest};
    use chrono::{Duration, Utc};
    use tempfile::TempDir;

    fn request(id: i64) -> ScheduleRequest {
        ScheduleRequest {
            title: "Study".to_string(),
            body: "Chapter 5".to_string(),
            scheduled_at: Utc::now() + Duration::hours(1),
            id: Some(id),
        }
    }

    #[tokio::test]
    async fn test_web_capabilities() {
        let temp = TempDir::new().unwrap();
        let caps = Capabilities::for_platform(Platform::Web, temp.path(), &Config::default()).unwrap();

        assert_eq!(caps.platform(), Platform::Web);
        assert_eq!(caps.store().backend_name(), "local");
        assert!(caps.host().is_none());
        assert_eq!(caps.migrate().await, MigrationOutcome::NotNative);

        assert_eq!(caps.scheduler().schedule(request(1)).await, NOT_SCHEDULED);
        assert!(caps.scheduler().list_pending().await.is_empty());
    }

    #[tokio::test]
    async fn test_native_capabilities_schedule_for_real() {
        let temp = TempDir::new().unwrap();
        let caps = Capabilities::for_platform(Platform::Native, temp.path(), &Config::default()).unwrap();

        assert_eq!(caps.store().backend_name(), "native");
        assert!(caps.scheduler().request_permission().await);
        assert_eq!(caps.scheduler().schedule(request(11)).await, 11);

        let pending = caps.scheduler().list_pending().await;
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].small_icon, "ic_stat_icon_config_sample");

        caps.scheduler().cancel(11).await;
        assert!(caps.scheduler().list_pending().await.is_empty());
    }

    #[tokio::test]
    async fn test_web_then_native_migrates_once() {
        let temp = TempDir::new().unwrap();
        let config = Config::default();

        {
            let web = Capabilities::for_platform(Platform::Web, temp.path(), &config).unwrap();
            web.store().set("token", "abc123").await.unwrap();
            web.store().set("prefs", &serde_json::json!({"theme": "dark"})).await.unwrap();
            web.store().set_raw("userId", "12").await.unwrap();
        }

        let native = Capabilities::for_platform(Platform::Native, temp.path(), &config).unwrap();
        assert_eq!(native.migrate().await, MigrationOutcome::Migrated { copied: 3 });
        assert_eq!(native.migrate().await, MigrationOutcome::AlreadyMigrated);

        let store = native.store();
        assert_eq!(store.get("token", String::new()).await, "abc123");
        assert_eq!(store.get("prefs", serde_json::Value::Null).await, serde_json::json!({"theme": "dark"}));
        assert_eq!(store.get("userId", String::new()).await, "12");
        assert!(store.get(MIGRATION_FLAG_KEY, false).await);

        // The browser copy stays where it was
        let web = Capabilities::for_platform(Platform::Web, temp.path(), &config).unwrap();
        assert_eq!(web.store().get("token", String::new()).await, "abc123");
    }

    #[tokio::test]
    async fn test_clear_resets_migration_flag() {
        let temp = TempDir::new().unwrap();
        let native = Capabilities::for_platform(Platform::Native, temp.path(), &Config::default()).unwrap();

        native.migrate().await;
        native.store().clear().await.unwrap();
        assert!(!native.store().get(MIGRATION_FLAG_KEY, false).await);
        assert_eq!(native.migrate().await, MigrationOutcome::Migrated { copied: 0 });
    }
}
