//! Operator notifications
//!
//! [`Notifier`] is best-effort: delivery errors and timeouts are logged and
//! dropped, the caller never sees them. The wire side sits behind
//! [`Transport`] so SMTP can be swapped out.

mod smtp;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Local};
use tracing::{error, info};

use crate::metrics::metrics;

pub use smtp::SmtpMailer;

/// What a notification is about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotificationKind {
    DatabaseDown,
    BackupSucceeded,
    BackupFailed,
    ReplicaMismatch,
}

impl NotificationKind {
    pub fn subject(&self) -> &'static str {
        match self {
            NotificationKind::DatabaseDown => "ALERT: Database Down!",
            NotificationKind::BackupSucceeded => "Database Backup Successful",
            NotificationKind::BackupFailed => "Database Backup Failed",
            NotificationKind::ReplicaMismatch => "ALERT: Replica Mismatch",
        }
    }

    /// Metric label
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::DatabaseDown => "database_down",
            NotificationKind::BackupSucceeded => "backup_succeeded",
            NotificationKind::BackupFailed => "backup_failed",
            NotificationKind::ReplicaMismatch => "replica_mismatch",
        }
    }
}

#[derive(Debug, Clone)]
pub struct NotificationEvent {
    pub kind: NotificationKind,
    pub subject: String,
    pub body: String,
    pub timestamp: DateTime<Local>,
}

impl NotificationEvent {
    pub fn new(kind: NotificationKind, body: impl Into<String>) -> Self {
        Self {
            kind,
            subject: kind.subject().to_string(),
            body: body.into(),
            timestamp: Local::now(),
        }
    }
}

/// Error delivering a notification
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("Invalid address {address}: {message}")]
    Address { address: String, message: String },
    #[error("Failed to build message: {0}")]
    Message(String),
    #[error("Transport error: {0}")]
    Transport(String),
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, event: &NotificationEvent) -> Result<(), NotifyError>;
}

pub struct Notifier {
    transport: Arc<dyn Transport>,
    timeout: Duration,
}

impl Notifier {
    pub fn new(transport: Arc<dyn Transport>, timeout: Duration) -> Self {
        Self { transport, timeout }
    }

    pub async fn notify(&self, kind: NotificationKind, detail: impl Into<String>) {
        self.deliver(&NotificationEvent::new(kind, detail)).await;
    }

    /// Hand `event` to the transport; never fails from the caller's view
    pub async fn deliver(&self, event: &NotificationEvent) {
        let sent = tokio::time::timeout(self.timeout, self.transport.send(event)).await;

        let result = match sent {
            Ok(Ok(())) => {
                info!(subject = %event.subject, "Email sent");
                "sent"
            }
            Ok(Err(e)) => {
                error!(subject = %event.subject, error = %e, "Failed to send email");
                "failed"
            }
            Err(_) => {
                error!(
                    subject = %event.subject,
                    timeout_secs = self.timeout.as_secs(),
                    "Failed to send email: timed out"
                );
                "timeout"
            }
        };
        metrics().record_notification(event.kind.as_str(), result);
    }
}
