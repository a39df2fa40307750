//! Control loop tying probe, backup, replica check and notifications together
//!
//! Everything runs in sequence on the caller's task: probe, then backup, then
//! notify, then sleep. Shutdown is only observed between cycles and during
//! the sleep, so an in-flight step always runs to completion (or to its own
//! timeout).

mod cycle;

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, warn, Instrument};

use crate::backup::{BackupRunner, SnapshotSource};
use crate::config::{Config, ReplicaSchedule};
use crate::db::Connector;
use crate::health::HealthProbe;
use crate::metrics::metrics;
use crate::notify::{NotificationKind, Notifier, Transport};
use crate::replica::{CompareError, ComparisonOutcome, ComparisonResult, ReplicaComparator};

pub use cycle::CycleReport;
use cycle::{backup_event, CyclePhase, DownAlerts};

pub struct Monitor {
    config: Config,
    probe: HealthProbe,
    backup: BackupRunner,
    comparator: ReplicaComparator,
    notifier: Notifier,
    down_alerts: DownAlerts,
}

impl Monitor {
    pub fn new(
        config: Config,
        connector: Arc<dyn Connector>,
        snapshot: Arc<dyn SnapshotSource>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let probe = HealthProbe::new(
            connector.clone(),
            Duration::from_secs(config.monitor.probe_timeout_secs),
        );
        let backup = BackupRunner::new(
            snapshot,
            config.backup.dir.clone(),
            Duration::from_secs(config.backup.timeout_secs),
        );
        let comparator = ReplicaComparator::new(
            connector,
            Duration::from_secs(config.replica_check.query_timeout_secs),
        );
        let notifier = Notifier::new(transport, Duration::from_secs(config.smtp.timeout_secs));
        let down_alerts = DownAlerts::new(config.monitor.on_unreachable);

        Self {
            config,
            probe,
            backup,
            comparator,
            notifier,
            down_alerts,
        }
    }

    /// Run until `shutdown` is cancelled
    pub async fn run(mut self, shutdown: CancellationToken) {
        let interval = Duration::from_secs(self.config.monitor.interval_secs);
        let schedule = self.config.replica_check.schedule;

        info!(
            primary = %self.config.primary.describe(),
            replica = %self.config.replica.describe(),
            interval_secs = interval.as_secs(),
            on_unreachable = %self.config.monitor.on_unreachable,
            replica_schedule = ?schedule,
            "Monitoring loop started"
        );

        if schedule == ReplicaSchedule::Once && !shutdown.is_cancelled() {
            let _ = self.check_replica().await;
        }

        while !shutdown.is_cancelled() {
            self.run_cycle().await;

            if schedule == ReplicaSchedule::EveryCycle {
                let _ = self.check_replica().await;
            }

            self.export_metrics().await;

            info!(secs = interval.as_secs(), "Waiting before next check");
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }
        }

        info!("Monitoring stopped manually");
    }

    /// One probe, backup and notify pass
    pub async fn run_cycle(&mut self) -> CycleReport {
        let status = self.probe.probe(&self.config.primary).await;
        if status.is_up() {
            info!("Database is up");
        } else {
            warn!("Database is down");
        }

        let mut report = CycleReport {
            status: status.clone(),
            backup: None,
            notified: None,
        };

        let mut phase = self.down_alerts.next_phase(&status);
        loop {
            phase = match phase {
                CyclePhase::BackingUp => {
                    let result = self.backup.run(&self.config.primary).await;
                    let event = backup_event(&result);
                    report.backup = Some(result);
                    CyclePhase::Notifying(event)
                }
                CyclePhase::Notifying(event) => {
                    self.notifier.deliver(&event).await;
                    report.notified = Some(event.kind);
                    CyclePhase::Done
                }
                CyclePhase::Done => break,
            };
        }

        metrics().record_cycle();
        report
    }

    /// Seed the replica table if configured, then compare row counts
    pub async fn check_replica(&self) -> Result<ComparisonResult, CompareError> {
        let check = &self.config.replica_check;

        async {
            if check.seed_replica_table {
                if let Err(e) = self
                    .comparator
                    .seed(&self.config.primary, &check.primary_table, &check.replica_table)
                    .await
                {
                    error!(error = %e, "Replica creation failed");
                }
            }

            let result = self
                .comparator
                .compare_tables(
                    &self.config.primary,
                    &check.primary_table,
                    &self.config.replica,
                    &check.replica_table,
                )
                .await?;

            if result.outcome == ComparisonOutcome::Mismatch && check.alert_on_mismatch {
                self.notifier
                    .notify(
                        NotificationKind::ReplicaMismatch,
                        format!(
                            "Row count mismatch.\nPrimary ({}): {}\nReplica ({}): {}",
                            check.primary_table,
                            result.primary_count,
                            check.replica_table,
                            result.replica_count
                        ),
                    )
                    .await;
            }
            Ok::<_, CompareError>(result)
        }
        .instrument(info_span!("replica"))
        .await
    }

    async fn export_metrics(&self) {
        if let Some(path) = &self.config.metrics.textfile {
            if let Err(e) = metrics().write_textfile(path).await {
                warn!(path = %path.display(), error = %e, "Failed to write metrics textfile");
            }
        }
    }
}
