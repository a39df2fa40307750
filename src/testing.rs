//! In-process fakes for the database, snapshot and mail capabilities

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::backup::{SnapshotError, SnapshotSource};
use crate::config::{
    secret, BackupConfig, Config, EndpointConfig, LoggingConfig, MetricsConfig, MonitorConfig,
    ReplicaCheckConfig, SmtpConfig,
};
use crate::db::{Connector, DbError};
use crate::notify::{NotificationEvent, NotificationKind, NotifyError, Transport};

/// Endpoint whose host is `name` and whose password is `pw-<name>`
pub(crate) fn endpoint(name: &str) -> EndpointConfig {
    EndpointConfig::new(name, 5432, "monitor", format!("pw-{}", name), "shop")
}

pub(crate) fn smtp_config() -> SmtpConfig {
    SmtpConfig {
        host: "smtp.example.com".to_string(),
        port: 587,
        username: "alerts@example.com".to_string(),
        password: secret("mailpass".to_string()),
        recipient: "oncall@example.com".to_string(),
        sender: None,
        timeout_secs: 5,
    }
}

/// Full config against the `primary`/`replica` fake hosts, backing up into `backup_dir`
pub(crate) fn config(backup_dir: &std::path::Path) -> Config {
    Config {
        primary: endpoint("primary"),
        replica: endpoint("replica"),
        smtp: smtp_config(),
        monitor: MonitorConfig {
            interval_secs: 3600,
            probe_timeout_secs: 1,
            ..MonitorConfig::default()
        },
        backup: BackupConfig {
            dir: backup_dir.to_path_buf(),
            timeout_secs: 5,
            ..BackupConfig::default()
        },
        replica_check: ReplicaCheckConfig {
            query_timeout_secs: 1,
            ..ReplicaCheckConfig::default()
        },
        logging: LoggingConfig { file: None },
        metrics: MetricsConfig::default(),
    }
}

/// Database fake keyed by endpoint host
#[derive(Default)]
pub(crate) struct FakeConnector {
    down: Mutex<HashMap<String, String>>,
    counts: Mutex<HashMap<String, i64>>,
    statements: Mutex<Vec<(String, String)>>,
    count_hosts: Mutex<Vec<String>>,
    pings: AtomicUsize,
    delay: Option<Duration>,
}

impl FakeConnector {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub(crate) fn set_down(&self, host: &str) {
        self.set_down_with(host, "connection refused");
    }

    pub(crate) fn set_down_with(&self, host: &str, error: &str) {
        self.down.lock().insert(host.to_string(), error.to_string());
    }

    pub(crate) fn set_up(&self, host: &str) {
        self.down.lock().remove(host);
    }

    pub(crate) fn set_count(&self, host: &str, count: i64) {
        self.counts.lock().insert(host.to_string(), count);
    }

    pub(crate) fn pings(&self) -> usize {
        self.pings.load(Ordering::SeqCst)
    }

    /// `(host, sql)` pairs passed to `execute`
    pub(crate) fn statements(&self) -> Vec<(String, String)> {
        self.statements.lock().clone()
    }

    /// Number of `count_rows` calls made against `host`
    pub(crate) fn count_queries(&self, host: &str) -> usize {
        self.count_hosts.lock().iter().filter(|h| *h == host).count()
    }

    async fn reach(&self, endpoint: &EndpointConfig) -> Result<(), DbError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match self.down.lock().get(&endpoint.host) {
            Some(error) => Err(DbError::Connection(error.clone())),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl Connector for FakeConnector {
    async fn ping(&self, endpoint: &EndpointConfig) -> Result<(), DbError> {
        self.pings.fetch_add(1, Ordering::SeqCst);
        self.reach(endpoint).await
    }

    async fn count_rows(&self, endpoint: &EndpointConfig, table: &str) -> Result<i64, DbError> {
        crate::db::count_rows_sql(table)?;
        self.count_hosts.lock().push(endpoint.host.clone());
        self.reach(endpoint).await?;
        self.counts
            .lock()
            .get(&endpoint.host)
            .copied()
            .ok_or_else(|| DbError::Query(format!("relation \"{}\" does not exist", table)))
    }

    async fn execute(&self, endpoint: &EndpointConfig, sql: &str) -> Result<(), DbError> {
        self.reach(endpoint).await?;
        self.statements
            .lock()
            .push((endpoint.host.clone(), sql.to_string()));
        Ok(())
    }
}

/// Scripted behavior for [`FakeSnapshot`]
#[derive(Clone)]
pub(crate) enum SnapshotScript {
    /// Write the bytes and succeed
    Dump(Vec<u8>),
    /// Write the bytes, then fail like a non-zero exit
    Fail { partial: Vec<u8>, stderr: String },
    /// Never finish
    Hang,
}

pub(crate) struct FakeSnapshot {
    script: Mutex<SnapshotScript>,
    calls: AtomicUsize,
}

impl FakeSnapshot {
    pub(crate) fn new(script: SnapshotScript) -> Self {
        Self {
            script: Mutex::new(script),
            calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn dumping(contents: &str) -> Self {
        Self::new(SnapshotScript::Dump(contents.as_bytes().to_vec()))
    }

    pub(crate) fn failing(stderr: &str) -> Self {
        Self::new(SnapshotScript::Fail {
            partial: Vec::new(),
            stderr: stderr.to_string(),
        })
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SnapshotSource for FakeSnapshot {
    async fn snapshot(
        &self,
        _endpoint: &EndpointConfig,
        out: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> Result<u64, SnapshotError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let script = self.script.lock().clone();
        match script {
            SnapshotScript::Dump(bytes) => {
                out.write_all(&bytes).await?;
                Ok(bytes.len() as u64)
            }
            SnapshotScript::Fail { partial, stderr } => {
                out.write_all(&partial).await?;
                Err(SnapshotError::Exit {
                    code: Some(1),
                    stderr,
                })
            }
            SnapshotScript::Hang => {
                std::future::pending::<()>().await;
                Ok(0)
            }
        }
    }
}

/// Mail fake recording every event it accepts
#[derive(Default)]
pub(crate) struct RecordingTransport {
    sent: Mutex<Vec<NotificationEvent>>,
    attempts: AtomicUsize,
    fail: AtomicBool,
}

impl RecordingTransport {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Transport that rejects every send, like an unreachable relay
    pub(crate) fn failing() -> Self {
        let transport = Self::default();
        transport.fail.store(true, Ordering::SeqCst);
        transport
    }

    pub(crate) fn sent(&self) -> Vec<NotificationEvent> {
        self.sent.lock().clone()
    }

    pub(crate) fn kinds(&self) -> Vec<NotificationKind> {
        self.sent.lock().iter().map(|e| e.kind).collect()
    }

    pub(crate) fn count(&self, kind: NotificationKind) -> usize {
        self.sent.lock().iter().filter(|e| e.kind == kind).count()
    }

    pub(crate) fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn send(&self, event: &NotificationEvent) -> Result<(), NotifyError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(NotifyError::Transport("535 authentication failed".into()));
        }
        self.sent.lock().push(event.clone());
        Ok(())
    }
}
