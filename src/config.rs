// Configuration loaded from YAML

use crate::notify::{NotificationStyle, PermissionState};
use crate::platform::{self, Platform};
use eyre::{Context, Result, eyre};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const APP_DIR: &str = "studystore";
const CONFIG_FILE: &str = "studystore.yml";

/// Which platform to run as
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlatformChoice {
    /// Use the process-wide probe
    #[default]
    Auto,
    Native,
    Web,
}

impl PlatformChoice {
    pub fn resolve(self) -> Platform {
        match self {
            Self::Auto => platform::current(),
            Self::Native => Platform::Native,
            Self::Web => Platform::Web,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationsConfig {
    #[serde(flatten)]
    pub style: NotificationStyle,
    /// What the user answers when first asked for notification permission
    pub prompt_answer: PermissionState,
    /// Schedule reminders for tasks with a notification date
    pub task_reminders: bool,
    /// Upper bound on the delivery worker's sleep
    pub poll_interval_secs: u64,
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self {
            style: NotificationStyle::default(),
            prompt_answer: PermissionState::Granted,
            task_reminders: true,
            poll_interval_secs: 30,
        }
    }
}

impl NotificationsConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub platform: PlatformChoice,
    /// Where both backends keep their files; see [`data_dir`] when unset
    pub data_dir: Option<PathBuf>,
    pub notifications: NotificationsConfig,
}

impl Config {
    /// Load configuration
    ///
    /// An explicit `path` must exist; the default location is optional.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load_file(path),
            None => {
                let default_path = config_dir().join(CONFIG_FILE);
                if default_path.is_file() {
                    Self::load_file(&default_path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    fn load_file(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(eyre!("Config file not found: {}", path.display()));
        }
        let content = fs::read_to_string(path).context("Failed to read config file")?;
        let config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        tracing::debug!(path = ?path, "Loaded config");
        Ok(config)
    }

    /// Effective data directory
    pub fn data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(data_dir)
    }
}

/// Default data directory
#[must_use]
pub fn data_dir() -> PathBuf {
    if let Some(override_dir) = std::env::var_os("STUDYSTORE_DATA_DIR") {
        return PathBuf::from(override_dir);
    }
    dirs::data_dir()
        .map(|d| d.join(APP_DIR))
        .unwrap_or_else(|| PathBuf::from(".studystore"))
}

/// Default config directory
#[must_use]
pub fn config_dir() -> PathBuf {
    if let Some(override_dir) = std::env::var_os("STUDYSTORE_CONFIG_DIR") {
        return PathBuf::from(override_dir);
    }
    dirs::config_dir()
        .map(|d| d.join(APP_DIR))
        .unwrap_or_else(|| PathBuf::from(".studystore"))
}
