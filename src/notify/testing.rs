// In-memory notification bridge for tests

use super::{Notification, NotificationBridge, PermissionState};
use crate::error::NotifyError;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum BridgeCall {
    RequestPermissions,
    Schedule(Notification),
    Cancel(Vec<i64>),
    CancelAll,
    Pending,
}

/// Keeps a pending map and a log of every call it received
pub(crate) struct RecordingBridge {
    pending: Mutex<BTreeMap<i64, Notification>>,
    calls: Mutex<Vec<BridgeCall>>,
    permission: PermissionState,
    fail: bool,
}

impl Default for RecordingBridge {
    fn default() -> Self {
        Self::with_permission(PermissionState::Granted)
    }
}

impl RecordingBridge {
    pub(crate) fn with_permission(permission: PermissionState) -> Self {
        Self {
            pending: Mutex::new(BTreeMap::new()),
            calls: Mutex::new(Vec::new()),
            permission,
            fail: false,
        }
    }

    /// Bridge whose every call is rejected
    pub(crate) fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub(crate) fn calls(&self) -> Vec<BridgeCall> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn scheduled(&self) -> Vec<Notification> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                BridgeCall::Schedule(n) => Some(n),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn schedule_calls(&self) -> usize {
        self.scheduled().len()
    }

    fn record(&self, call: BridgeCall) -> Result<(), NotifyError> {
        self.calls.lock().unwrap().push(call);
        if self.fail {
            Err(NotifyError::Scheduling("bridge offline".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl NotificationBridge for RecordingBridge {
    async fn request_permissions(&self) -> Result<PermissionState, NotifyError> {
        self.record(BridgeCall::RequestPermissions)?;
        Ok(self.permission)
    }

    async fn schedule(&self, notification: Notification) -> Result<(), NotifyError> {
        self.record(BridgeCall::Schedule(notification.clone()))?;
        self.pending.lock().unwrap().insert(notification.id, notification);
        Ok(())
    }

    async fn cancel(&self, ids: &[i64]) -> Result<(), NotifyError> {
        self.record(BridgeCall::Cancel(ids.to_vec()))?;
        let mut pending = self.pending.lock().unwrap();
        for id in ids {
            pending.remove(id);
        }
        Ok(())
    }

    async fn cancel_all(&self) -> Result<(), NotifyError> {
        self.record(BridgeCall::CancelAll)?;
        self.pending.lock().unwrap().clear();
        Ok(())
    }

    async fn pending(&self) -> Result<Vec<Notification>, NotifyError> {
        self.record(BridgeCall::Pending)?;
        Ok(self.pending.lock().unwrap().values().cloned().collect())
    }
}
