// Native container host running on its own thread

use crate::backend::StorageBackend;
use crate::error::{NotifyError, StorageError};
use crate::notify::{Notification, NotificationBridge, PermissionState};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::Path;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error};

mod db;

use db::HostDb;

/// Default database location inside the data directory
pub const HOST_DB_FILE: &str = "native/host.db";

/// Requests queued before senders wait for the host
const REQUEST_QUEUE: usize = 64;

type Reply<T, E> = oneshot::Sender<Result<T, E>>;

/// One request to the host, carrying its own reply channel
enum HostCall {
    PrefGet { key: String, reply: Reply<Option<String>, StorageError> },
    PrefSet { key: String, value: String, reply: Reply<(), StorageError> },
    PrefRemove { key: String, reply: Reply<(), StorageError> },
    PrefKeys { reply: Reply<Vec<String>, StorageError> },
    PrefClear { reply: Reply<(), StorageError> },
    RequestPermission { reply: Reply<PermissionState, NotifyError> },
    Schedule { notification: Notification, reply: Reply<(), NotifyError> },
    Cancel { ids: Vec<i64>, reply: Reply<(), NotifyError> },
    CancelAll { reply: Reply<(), NotifyError> },
    Pending { reply: Reply<Vec<Notification>, NotifyError> },
    ClaimDue { now: DateTime<Utc>, reply: Reply<Vec<Notification>, NotifyError> },
    NextDue { reply: Reply<Option<DateTime<Utc>>, NotifyError> },
}

/// Handle to the native host thread
///
/// Every call becomes one typed request on a channel and one reply on a
/// oneshot; the host serves calls strictly in submission order.
#[derive(Clone)]
pub struct NativeHost {
    tx: mpsc::Sender<HostCall>,
}

impl NativeHost {
    /// Open the host database at `path` and start serving requests
    ///
    /// `prompt_answer` is what the user answers the first time notification
    /// permission is requested; later requests return the stored decision.
    /// The host thread exits once every handle is dropped.
    pub fn spawn<P: AsRef<Path>>(path: P, prompt_answer: PermissionState) -> Result<Self, StorageError> {
        let mut db = HostDb::open(path.as_ref(), prompt_answer)?;
        let (tx, mut rx) = mpsc::channel::<HostCall>(REQUEST_QUEUE);

        std::thread::Builder::new()
            .name("native-host".to_string())
            .spawn(move || {
                while let Some(call) = rx.blocking_recv() {
                    serve(&mut db, call);
                }
                debug!("Native host stopped");
            })?;

        Ok(Self { tx })
    }

    async fn storage_call<T>(
        &self,
        make: impl FnOnce(Reply<T, StorageError>) -> HostCall,
    ) -> Result<T, StorageError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(make(reply))
            .await
            .map_err(|_| StorageError::HostUnavailable)?;
        rx.await.map_err(|_| StorageError::HostUnavailable)?
    }

    async fn notify_call<T>(&self, make: impl FnOnce(Reply<T, NotifyError>) -> HostCall) -> Result<T, NotifyError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(make(reply))
            .await
            .map_err(|_| NotifyError::HostUnavailable)?;
        rx.await.map_err(|_| NotifyError::HostUnavailable)?
    }

    /// Remove and return every pending notification due at `now`
    pub async fn claim_due(&self, now: DateTime<Utc>) -> Result<Vec<Notification>, NotifyError> {
        self.notify_call(|reply| HostCall::ClaimDue { now, reply }).await
    }

    /// Earliest scheduled time in the pending set
    pub async fn next_due(&self) -> Result<Option<DateTime<Utc>>, NotifyError> {
        self.notify_call(|reply| HostCall::NextDue { reply }).await
    }
}

fn serve(db: &mut HostDb, call: HostCall) {
    // A dropped receiver means the caller went away; nothing to report
    match call {
        HostCall::PrefGet { key, reply } => {
            let _ = reply.send(db.pref_get(&key));
        }
        HostCall::PrefSet { key, value, reply } => {
            let _ = reply.send(db.pref_set(&key, &value));
        }
        HostCall::PrefRemove { key, reply } => {
            let _ = reply.send(db.pref_remove(&key));
        }
        HostCall::PrefKeys { reply } => {
            let _ = reply.send(db.pref_keys());
        }
        HostCall::PrefClear { reply } => {
            let _ = reply.send(db.pref_clear());
        }
        HostCall::RequestPermission { reply } => {
            let _ = reply.send(db.request_permission());
        }
        HostCall::Schedule { notification, reply } => {
            let result = db.schedule(&notification);
            if let Err(e) = &result {
                error!(id = notification.id, error = %e, "host: schedule rejected");
            }
            let _ = reply.send(result);
        }
        HostCall::Cancel { ids, reply } => {
            let _ = reply.send(db.cancel(&ids));
        }
        HostCall::CancelAll { reply } => {
            let _ = reply.send(db.cancel_all());
        }
        HostCall::Pending { reply } => {
            let _ = reply.send(db.pending());
        }
        HostCall::ClaimDue { now, reply } => {
            let _ = reply.send(db.claim_due(now));
        }
        HostCall::NextDue { reply } => {
            let _ = reply.send(db.next_due());
        }
    }
}

#[async_trait]
impl StorageBackend for NativeHost {
    fn name(&self) -> &'static str {
        "native"
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let key = key.to_string();
        self.storage_call(|reply| HostCall::PrefGet { key, reply }).await
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let key = key.to_string();
        let value = value.to_string();
        self.storage_call(|reply| HostCall::PrefSet { key, value, reply }).await
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        let key = key.to_string();
        self.storage_call(|reply| HostCall::PrefRemove { key, reply }).await
    }

    async fn keys(&self) -> Result<Vec<String>, StorageError> {
        self.storage_call(|reply| HostCall::PrefKeys { reply }).await
    }

    async fn clear(&self) -> Result<(), StorageError> {
        self.storage_call(|reply| HostCall::PrefClear { reply }).await
    }
}

#[async_trait]
impl NotificationBridge for NativeHost {
    async fn request_permissions(&self) -> Result<PermissionState, NotifyError> {
        self.notify_call(|reply| HostCall::RequestPermission { reply }).await
    }

    async fn schedule(&self, notification: Notification) -> Result<(), NotifyError> {
        self.notify_call(|reply| HostCall::Schedule { notification, reply })
            .await
    }

    async fn cancel(&self, ids: &[i64]) -> Result<(), NotifyError> {
        let ids = ids.to_vec();
        self.notify_call(|reply| HostCall::Cancel { ids, reply }).await
    }

    async fn cancel_all(&self) -> Result<(), NotifyError> {
        self.notify_call(|reply| HostCall::CancelAll { reply }).await
    }

    async fn pending(&self) -> Result<Vec<Notification>, NotifyError> {
        self.notify_call(|reply| HostCall::Pending { reply }).await
    }
}
