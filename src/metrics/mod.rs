//! Prometheus metrics for the warden
//!
//! There is no scrape endpoint. When `metrics.textfile` is configured the
//! registry is dumped after every cycle for the node-exporter textfile
//! collector.

use std::path::Path;
use std::sync::OnceLock;

use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, IntGaugeVec, Opts,
    Registry, TextEncoder,
};

use crate::backup::BackupResult;
use crate::health::HealthStatus;

/// Global metrics registry
static METRICS: OnceLock<Metrics> = OnceLock::new();

/// Get the global metrics instance
pub fn metrics() -> &'static Metrics {
    METRICS.get_or_init(|| Metrics::new().expect("static metric definitions are valid"))
}

pub struct Metrics {
    pub registry: Registry,

    /// Completed health/backup cycles
    pub cycles_total: IntCounter,

    /// Primary probes by result (up, down)
    pub probes_total: IntCounterVec,
    /// 1 when the last probe found the primary up
    pub primary_up: IntGauge,

    /// Backup attempts by outcome
    pub backups_total: IntCounterVec,
    /// Backup wall time in seconds
    pub backup_duration_seconds: Histogram,
    /// Size of the last successful artifact
    pub last_backup_bytes: IntGauge,

    /// Replica comparisons by outcome (match, mismatch, error)
    pub comparisons_total: IntCounterVec,
    /// Row counts from the last comparison, by endpoint
    pub row_count: IntGaugeVec,

    /// Notifications by kind and delivery result
    pub notifications_total: IntCounterVec,
}

impl Metrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let cycles_total = IntCounter::new(
            "warden_cycles_total",
            "Total number of health/backup cycles completed",
        )?;

        let probes_total = IntCounterVec::new(
            Opts::new("warden_probes_total", "Total number of primary probes by result"),
            &["result"],
        )?;

        let primary_up = IntGauge::new(
            "warden_primary_up",
            "Whether the last probe reached the primary (1) or not (0)",
        )?;

        let backups_total = IntCounterVec::new(
            Opts::new("warden_backups_total", "Total number of backup attempts by outcome"),
            &["outcome"],
        )?;

        let backup_duration_seconds = Histogram::with_opts(
            HistogramOpts::new("warden_backup_duration_seconds", "Backup duration in seconds")
                .buckets(vec![
                    1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 300.0, 600.0, 1800.0, 3600.0,
                ]),
        )?;

        let last_backup_bytes = IntGauge::new(
            "warden_last_backup_bytes",
            "Size in bytes of the last successful backup artifact",
        )?;

        let comparisons_total = IntCounterVec::new(
            Opts::new(
                "warden_replica_comparisons_total",
                "Total number of replica comparisons by outcome",
            ),
            &["outcome"],
        )?;

        let row_count = IntGaugeVec::new(
            Opts::new(
                "warden_replica_row_count",
                "Row count observed by the last comparison",
            ),
            &["endpoint"],
        )?;

        let notifications_total = IntCounterVec::new(
            Opts::new(
                "warden_notifications_total",
                "Total number of notifications by kind and delivery result",
            ),
            &["kind", "result"],
        )?;

        registry.register(Box::new(cycles_total.clone()))?;
        registry.register(Box::new(probes_total.clone()))?;
        registry.register(Box::new(primary_up.clone()))?;
        registry.register(Box::new(backups_total.clone()))?;
        registry.register(Box::new(backup_duration_seconds.clone()))?;
        registry.register(Box::new(last_backup_bytes.clone()))?;
        registry.register(Box::new(comparisons_total.clone()))?;
        registry.register(Box::new(row_count.clone()))?;
        registry.register(Box::new(notifications_total.clone()))?;

        Ok(Self {
            registry,
            cycles_total,
            probes_total,
            primary_up,
            backups_total,
            backup_duration_seconds,
            last_backup_bytes,
            comparisons_total,
            row_count,
            notifications_total,
        })
    }

    pub fn record_cycle(&self) {
        self.cycles_total.inc();
    }

    pub fn record_probe(&self, status: &HealthStatus) {
        self.probes_total.with_label_values(&[status.as_str()]).inc();
        self.primary_up.set(if status.is_up() { 1 } else { 0 });
    }

    pub fn record_backup(&self, result: &BackupResult) {
        self.backups_total
            .with_label_values(&[result.outcome.as_str()])
            .inc();
        self.backup_duration_seconds
            .observe(result.elapsed.as_secs_f64());
        if result.is_success() {
            self.last_backup_bytes
                .set(i64::try_from(result.bytes).unwrap_or(i64::MAX));
        }
    }

    pub fn record_comparison(&self, outcome: &str) {
        self.comparisons_total.with_label_values(&[outcome]).inc();
    }

    pub fn set_row_counts(&self, primary: i64, replica: i64) {
        self.row_count.with_label_values(&["primary"]).set(primary);
        self.row_count.with_label_values(&["replica"]).set(replica);
    }

    pub fn record_notification(&self, kind: &str, result: &str) {
        self.notifications_total
            .with_label_values(&[kind, result])
            .inc();
    }

    /// Get metrics as Prometheus text format
    pub fn gather(&self) -> prometheus::Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }

    /// Write the registry to `path` through a sibling temp file and a rename,
    /// so the collector never reads a half-written file
    pub async fn write_textfile(&self, path: &Path) -> anyhow::Result<()> {
        let body = self.gather()?;

        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");

        tokio::fs::write(&tmp, body).await?;
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }
}
