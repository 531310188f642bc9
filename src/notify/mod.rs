// Local notification scheduling

use crate::error::NotifyError;
use crate::store::now_ms;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use tracing::{debug, info, warn};

pub mod delivery;

#[cfg(test)]
pub(crate) mod testing;

pub use delivery::DeliveryWorker;

/// Id returned by [`NotificationScheduler::schedule`] when nothing was scheduled
pub const NOT_SCHEDULED: i64 = -1;

/// A reminder as submitted to, and reported by, the host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: i64,
    pub title: String,
    pub body: String,
    pub scheduled_at: DateTime<Utc>,
    pub sound: String,
    pub small_icon: String,
    pub icon_color: String,
}

/// What a caller asks for; the scheduler fills in id and style
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleRequest {
    pub title: String,
    pub body: String,
    pub scheduled_at: DateTime<Utc>,
    /// Caller-chosen id; a fresh one is generated when absent
    pub id: Option<i64>,
}

/// Presentation refs attached to every scheduled notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationStyle {
    pub sound: String,
    pub small_icon: String,
    pub icon_color: String,
}

impl Default for NotificationStyle {
    fn default() -> Self {
        Self {
            sound: "beep.wav".to_string(),
            small_icon: "ic_stat_icon_config_sample".to_string(),
            icon_color: "#467BAA".to_string(),
        }
    }
}

/// Display permission as tracked by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionState {
    Granted,
    Denied,
    /// Not asked yet
    Prompt,
}

impl PermissionState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Granted => "granted",
            Self::Denied => "denied",
            Self::Prompt => "prompt",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "granted" => Some(Self::Granted),
            "denied" => Some(Self::Denied),
            "prompt" => Some(Self::Prompt),
            _ => None,
        }
    }
}

/// Host-side notification delivery
///
/// Each call is one request to the host and one resolved outcome.
#[async_trait]
pub trait NotificationBridge: Send + Sync {
    /// Ask for display permission, prompting the user at most once
    async fn request_permissions(&self) -> Result<PermissionState, NotifyError>;

    /// Add `notification` to the pending set, replacing any entry with the same id
    async fn schedule(&self, notification: Notification) -> Result<(), NotifyError>;

    async fn cancel(&self, ids: &[i64]) -> Result<(), NotifyError>;

    async fn cancel_all(&self) -> Result<(), NotifyError>;

    async fn pending(&self) -> Result<Vec<Notification>, NotifyError>;
}

/// Schedules reminders through the platform bridge, if there is one
///
/// Without a bridge every operation degrades to "no effect". A `cancel` only
/// prevents delivery when the host processes it before the notification fires.
pub struct NotificationScheduler {
    bridge: Option<Arc<dyn NotificationBridge>>,
    style: NotificationStyle,
    last_issued: AtomicI64,
}

impl NotificationScheduler {
    /// Create a scheduler; `None` means the platform cannot deliver notifications
    pub fn new(bridge: Option<Arc<dyn NotificationBridge>>, style: NotificationStyle) -> Self {
        Self {
            bridge,
            style,
            last_issued: AtomicI64::new(0),
        }
    }

    /// Whether notifications can actually be delivered
    pub fn can_deliver(&self) -> bool {
        self.bridge.is_some()
    }

    /// Ask for permission to display notifications
    ///
    /// Always `false` without delivery capability or when the host fails.
    pub async fn request_permission(&self) -> bool {
        let Some(bridge) = &self.bridge else {
            return false;
        };

        match bridge.request_permissions().await {
            Ok(state) => {
                debug!(state = state.as_str(), "Notification permission resolved");
                state == PermissionState::Granted
            }
            Err(e) => {
                warn!(error = %e, "Failed to request notification permission");
                false
            }
        }
    }

    /// Schedule a notification and return its id
    ///
    /// Returns [`NOT_SCHEDULED`] when the platform cannot deliver, the
    /// request asks for the reserved id [`NOT_SCHEDULED`], or the host rejects
    /// the request. Scheduling an id that is already pending
    /// replaces the pending entry.
    pub async fn schedule(&self, request: ScheduleRequest) -> i64 {
        let Some(bridge) = &self.bridge else {
            debug!(title = %request.title, at = %request.scheduled_at, "No delivery capability, not scheduling");
            return NOT_SCHEDULED;
        };

        if request.id == Some(NOT_SCHEDULED) {
            warn!(title = %request.title, "Refusing to schedule under the reserved id {}", NOT_SCHEDULED);
            return NOT_SCHEDULED;
        }

        let id = request.id.unwrap_or_else(|| self.fresh_id());
        let notification = Notification {
            id,
            title: request.title,
            body: request.body,
            scheduled_at: request.scheduled_at,
            sound: self.style.sound.clone(),
            small_icon: self.style.small_icon.clone(),
            icon_color: self.style.icon_color.clone(),
        };

        match bridge.schedule(notification).await {
            Ok(()) => {
                info!(id, at = %request.scheduled_at, "Notification scheduled");
                id
            }
            Err(e) => {
                warn!(id, error = %e, "Failed to schedule notification");
                NOT_SCHEDULED
            }
        }
    }

    /// Cancel a pending notification; unknown ids are ignored
    pub async fn cancel(&self, id: i64) {
        let Some(bridge) = &self.bridge else {
            debug!(id, "No delivery capability, nothing to cancel");
            return;
        };

        if let Err(e) = bridge.cancel(&[id]).await {
            warn!(id, error = %e, "Failed to cancel notification");
        }
    }

    /// Cancel every pending notification
    pub async fn cancel_all(&self) {
        let Some(bridge) = &self.bridge else {
            return;
        };

        if let Err(e) = bridge.cancel_all().await {
            warn!(error = %e, "Failed to cancel notifications");
        }
    }

    /// Snapshot of pending notifications, ordered by scheduled time
    pub async fn list_pending(&self) -> Vec<Notification> {
        let Some(bridge) = &self.bridge else {
            return Vec::new();
        };

        match bridge.pending().await {
            Ok(mut pending) => {
                pending.sort_by_key(|n| (n.scheduled_at, n.id));
                pending
            }
            Err(e) => {
                warn!(error = %e, "Failed to list pending notifications");
                Vec::new()
            }
        }
    }

    /// Time-derived id, strictly increasing within this scheduler
    fn fresh_id(&self) -> i64 {
        let now = now_ms();
        let prev = self
            .last_issued
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| Some(now.max(last + 1)))
            .unwrap_or(now);
        now.max(prev + 1)
    }
}
