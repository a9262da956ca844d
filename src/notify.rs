//! Fire-and-forget notification dispatch.
//!
//! Reconciliation enqueues onto a bounded channel and moves on; a worker
//! drains the queue and hands each message to the injected `Notifier`
//! collaborator. A slow or failing notifier can never block or roll back
//! a financial transition.

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum PaymentNotification {
    PaymentReceived {
        user_id: Uuid,
        reference: String,
        amount: BigDecimal,
        currency: String,
        plan_completed: bool,
        content_unlocked: bool,
    },
    PaymentFailed {
        user_id: Uuid,
        reference: String,
    },
}

#[derive(Debug, thiserror::Error)]
#[error("notification delivery failed: {0}")]
pub struct NotifyError(pub String);

/// Delivery collaborator (email/push service). Implementations live with
/// the notification subsystem; reconciliation only sees this trait.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, notification: &PaymentNotification) -> Result<(), NotifyError>;
}

/// Default notifier: records the notification in the log stream.
#[derive(Debug, Default, Clone)]
pub struct LoggingNotifier;

#[async_trait]
impl Notifier for LoggingNotifier {
    async fn send(&self, notification: &PaymentNotification) -> Result<(), NotifyError> {
        info!(
            event_type = "notification",
            payload = %serde_json::to_string(notification).unwrap_or_default(),
            "Payment notification dispatched"
        );
        Ok(())
    }
}

/// Sending half handed to the engine.
#[derive(Clone)]
pub struct NotificationSender {
    tx: mpsc::Sender<PaymentNotification>,
}

impl NotificationSender {
    /// Enqueue without waiting. Queue pressure or a stopped dispatcher is
    /// logged and swallowed.
    pub fn fire_and_forget(&self, notification: PaymentNotification) {
        if let Err(e) = self.tx.try_send(notification) {
            warn!(error = %e, "Notification dropped, queue unavailable");
        }
    }
}

/// Worker that drains the queue into the notifier.
pub struct NotificationDispatcher {
    rx: mpsc::Receiver<PaymentNotification>,
    notifier: Arc<dyn Notifier>,
}

pub fn channel(
    capacity: usize,
    notifier: Arc<dyn Notifier>,
) -> (NotificationSender, NotificationDispatcher) {
    let (tx, rx) = mpsc::channel(capacity);
    (
        NotificationSender { tx },
        NotificationDispatcher { rx, notifier },
    )
}

impl NotificationDispatcher {
    pub async fn run(mut self, mut shutdown_rx: watch::Receiver<bool>) {
        info!("Notification dispatcher started");
        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    info!("Shutdown signal received, stopping notification dispatcher");
                    break;
                }
                next = self.rx.recv() => {
                    match next {
                        Some(notification) => {
                            if let Err(e) = self.notifier.send(&notification).await {
                                warn!(error = %e, "Notification delivery failed");
                            }
                        }
                        None => break,
                    }
                }
            }
        }
        info!("Notification dispatcher stopped");
    }
}
