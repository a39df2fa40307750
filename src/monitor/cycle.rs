use tracing::info;

use crate::backup::BackupResult;
use crate::config::UnreachablePolicy;
use crate::health::HealthStatus;
use crate::notify::{NotificationEvent, NotificationKind};

/// What one health/backup cycle did
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub status: HealthStatus,
    /// Present iff the probe returned `Up`
    pub backup: Option<BackupResult>,
    /// Kind of notification handed to the notifier, if any
    pub notified: Option<NotificationKind>,
}

/// Steps after the probe; the probe itself is always the first step
#[derive(Debug)]
pub(crate) enum CyclePhase {
    BackingUp,
    Notifying(NotificationEvent),
    Done,
}

/// Decides whether a Down probe is worth an alert under the configured policy
#[derive(Debug)]
pub(crate) struct DownAlerts {
    policy: UnreachablePolicy,
    /// `None` until the first probe
    last_up: Option<bool>,
}

impl DownAlerts {
    pub(crate) fn new(policy: UnreachablePolicy) -> Self {
        Self {
            policy,
            last_up: None,
        }
    }

    /// Record `status` and pick the phase that follows the probe
    pub(crate) fn next_phase(&mut self, status: &HealthStatus) -> CyclePhase {
        let previous = self.last_up.replace(status.is_up());

        match status {
            HealthStatus::Up => {
                if previous == Some(false) {
                    info!("Database recovered");
                }
                CyclePhase::BackingUp
            }
            HealthStatus::Down { reason } => {
                let alert = match self.policy {
                    UnreachablePolicy::AlertEveryCycle => true,
                    UnreachablePolicy::AlertOnTransition => previous != Some(false),
                };
                if alert {
                    CyclePhase::Notifying(NotificationEvent::new(
                        NotificationKind::DatabaseDown,
                        down_body(reason),
                    ))
                } else {
                    info!("Database still down, alert already sent");
                    CyclePhase::Done
                }
            }
        }
    }
}

pub(crate) fn down_body(reason: &str) -> String {
    format!("The main database is down.\nError: {}", reason)
}

/// Notification for a finished backup attempt
pub(crate) fn backup_event(result: &BackupResult) -> NotificationEvent {
    if result.is_success() {
        NotificationEvent::new(
            NotificationKind::BackupSucceeded,
            format!("Backup created: {}", result.artifact),
        )
    } else {
        NotificationEvent::new(
            NotificationKind::BackupFailed,
            format!(
                "Error: {}",
                result.error.as_deref().unwrap_or("backup failed")
            ),
        )
    }
}
