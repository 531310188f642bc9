// Delivery of due notifications on the native host

use super::Notification;
use crate::host::NativeHost;
use chrono::Utc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Smallest wait between two ticks
const MIN_TICK: Duration = Duration::from_millis(10);

/// Background task delivering due notifications
///
/// Claiming reads and removes due entries in one host request, so each
/// notification is delivered at most once and a cancel the host processes
/// first wins.
pub struct DeliveryWorker {
    stop_tx: Option<oneshot::Sender<()>>,
    join_handle: Option<JoinHandle<()>>,
}

impl DeliveryWorker {
    /// Start delivering notifications from `host` into `delivered`
    ///
    /// `poll_interval` bounds how long the worker sleeps when nothing is due
    /// soon, so notifications scheduled by other processes are picked up.
    pub fn spawn(host: NativeHost, delivered: mpsc::UnboundedSender<Notification>, poll_interval: Duration) -> Self {
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();

        let join_handle = tokio::spawn(async move {
            loop {
                let wait = match tick(&host, &delivered).await {
                    Some(wait) => wait.clamp(MIN_TICK, poll_interval.max(MIN_TICK)),
                    None => break,
                };

                tokio::select! {
                    _ = &mut stop_rx => break,
                    _ = sleep(wait) => {}
                }
            }
            debug!("Delivery worker stopped");
        });

        Self {
            stop_tx: Some(stop_tx),
            join_handle: Some(join_handle),
        }
    }

    /// Signal the worker to stop and wait for it to finish
    pub async fn stop(mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        if let Some(join_handle) = self.join_handle.take() {
            if let Err(e) = join_handle.await {
                warn!(error = %e, "Delivery worker ended abnormally");
            }
        }
    }
}

impl Drop for DeliveryWorker {
    fn drop(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        if let Some(join_handle) = self.join_handle.take() {
            join_handle.abort();
        }
    }
}

/// Deliver everything due and return how long to wait until the next check
///
/// Returns `None` when nobody listens for deliveries any more.
async fn tick(host: &NativeHost, delivered: &mpsc::UnboundedSender<Notification>) -> Option<Duration> {
    let now = Utc::now();

    match host.claim_due(now).await {
        Ok(due) => {
            if let Err(lost) = forward(due, delivered) {
                warn!(ids = ?lost, "Delivery receiver closed, claimed notifications were not delivered");
                return None;
            }
        }
        Err(e) => warn!(error = %e, "Failed to claim due notifications"),
    }

    let next = match host.next_due().await {
        Ok(next) => next,
        Err(e) => {
            warn!(error = %e, "Failed to read next due notification");
            None
        }
    };

    Some(match next {
        Some(at) => (at - Utc::now()).to_std().unwrap_or(Duration::ZERO),
        None => Duration::MAX,
    })
}

/// Hand claimed notifications to the receiver
///
/// On a closed receiver, returns the ids that were claimed but not handed out.
fn forward(due: Vec<Notification>, delivered: &mpsc::UnboundedSender<Notification>) -> Result<(), Vec<i64>> {
    let mut due = due.into_iter();
    while let Some(notification) = due.next() {
        let (id, title) = (notification.id, notification.title.clone());
        if let Err(mpsc::error::SendError(rejected)) = delivered.send(notification) {
            return Err(std::iter::once(rejected.id).chain(due.map(|n| n.id)).collect());
        }
        info!(id, title = %title, "Notification delivered");
    }
    Ok(())
}
