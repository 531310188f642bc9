// StudyStore - Persistence and local notifications across web and native platforms

pub mod backend;
pub mod capabilities;
pub mod config;
pub mod envelope;
pub mod error;
pub mod host;
pub mod migrate;
pub mod notify;
pub mod platform;
pub mod reminder;
pub mod store;

// Re-export main types for convenience
pub use backend::{LocalStorage, StorageBackend};
pub use capabilities::Capabilities;
pub use config::Config;
pub use envelope::Envelope;
pub use error::{NotifyError, StorageError};
pub use host::NativeHost;
pub use migrate::{MIGRATION_FLAG_KEY, MigrationOutcome, MigrationRunner};
pub use notify::{NOT_SCHEDULED, Notification, NotificationBridge, NotificationScheduler, ScheduleRequest};
pub use platform::{Platform, is_native_container};
pub use reminder::{Task, TaskNotificationBinder, TaskStatus};
pub use store::{PersistenceStore, now_ms};
