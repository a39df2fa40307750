//! Logical backups of the primary
//!
//! Each attempt creates a fresh `db_backup_<YYYYMMDD_HHMMSS>.sql` artifact and
//! streams a snapshot into it. A failed attempt leaves whatever was written
//! on disk for inspection.

mod snapshot;

use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Local};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{error, info};

use crate::config::EndpointConfig;
use crate::metrics::metrics;

pub use snapshot::{CommandSnapshot, SnapshotError, SnapshotSource};

pub const ARTIFACT_PREFIX: &str = "db_backup_";
pub const ARTIFACT_EXTENSION: &str = "sql";

/// Names tried per timestamp: the bare name, then `_1` .. `_99`
const MAX_NAME_ATTEMPTS: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackupOutcome {
    Success,
    Failure,
}

impl BackupOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackupOutcome::Success => "success",
            BackupOutcome::Failure => "failure",
        }
    }
}

/// Result of one backup attempt
#[derive(Debug, Clone)]
pub struct BackupResult {
    /// Artifact file name, e.g. `db_backup_20240101_120000.sql`
    pub artifact: String,
    /// Full path of the artifact, `None` if it could not be created
    pub path: Option<PathBuf>,
    pub outcome: BackupOutcome,
    /// Redacted error text when the attempt failed
    pub error: Option<String>,
    /// Bytes in the artifact, partial output included on failure
    pub bytes: u64,
    pub elapsed: Duration,
}

impl BackupResult {
    pub fn is_success(&self) -> bool {
        self.outcome == BackupOutcome::Success
    }
}

/// Artifact name for an attempt started at `at`
pub fn artifact_name(at: &DateTime<Local>) -> String {
    format!(
        "{}{}.{}",
        ARTIFACT_PREFIX,
        at.format("%Y%m%d_%H%M%S"),
        ARTIFACT_EXTENSION
    )
}

fn suffixed_name(base: &str, n: u32) -> String {
    match base.strip_suffix(&format!(".{}", ARTIFACT_EXTENSION)) {
        Some(stem) => format!("{}_{}.{}", stem, n, ARTIFACT_EXTENSION),
        None => format!("{}_{}", base, n),
    }
}

pub struct BackupRunner {
    source: Arc<dyn SnapshotSource>,
    dir: PathBuf,
    timeout: Duration,
}

impl BackupRunner {
    pub fn new(source: Arc<dyn SnapshotSource>, dir: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            source,
            dir: dir.into(),
            timeout,
        }
    }

    /// Take a fresh snapshot of `endpoint`; never idempotent
    pub async fn run(&self, endpoint: &EndpointConfig) -> BackupResult {
        let started = Instant::now();
        let base = artifact_name(&Local::now());

        let result = match self.create_artifact(&base).await {
            Ok((artifact, path, file)) => {
                let written = self.write_snapshot(endpoint, file).await;
                match written {
                    Ok(bytes) => BackupResult {
                        artifact,
                        path: Some(path),
                        outcome: BackupOutcome::Success,
                        error: None,
                        bytes,
                        elapsed: started.elapsed(),
                    },
                    Err(e) => {
                        let kept = tokio::fs::metadata(&path).await.map(|m| m.len()).unwrap_or(0);
                        BackupResult {
                            artifact,
                            path: Some(path),
                            outcome: BackupOutcome::Failure,
                            error: Some(endpoint.redact(&e)),
                            bytes: kept,
                            elapsed: started.elapsed(),
                        }
                    }
                }
            }
            Err(e) => BackupResult {
                artifact: base,
                path: None,
                outcome: BackupOutcome::Failure,
                error: Some(format!("Failed to create artifact: {}", e)),
                bytes: 0,
                elapsed: started.elapsed(),
            },
        };

        match &result.error {
            None => info!(
                artifact = %result.artifact,
                bytes = result.bytes,
                elapsed_ms = result.elapsed.as_millis() as u64,
                "Database backup successful"
            ),
            Some(e) => error!(artifact = %result.artifact, error = %e, "Database backup failed"),
        }
        metrics().record_backup(&result);
        result
    }

    async fn write_snapshot(&self, endpoint: &EndpointConfig, file: File) -> Result<u64, String> {
        let mut writer = BufWriter::new(file);

        let snapshot =
            tokio::time::timeout(self.timeout, self.source.snapshot(endpoint, &mut writer)).await;
        let bytes = match snapshot {
            Ok(Ok(bytes)) => bytes,
            Ok(Err(e)) => {
                // Keep whatever made it out for forensics
                let _ = writer.flush().await;
                return Err(e.to_string());
            }
            Err(_) => {
                let _ = writer.flush().await;
                return Err(format!("Snapshot timed out after {:?}", self.timeout));
            }
        };

        writer
            .flush()
            .await
            .map_err(|e| format!("Failed to flush artifact: {}", e))?;
        writer
            .into_inner()
            .sync_all()
            .await
            .map_err(|e| format!("Failed to sync artifact: {}", e))?;
        Ok(bytes)
    }

    /// Create the artifact with create-new semantics, suffixing on collision
    async fn create_artifact(&self, base: &str) -> std::io::Result<(String, PathBuf, File)> {
        tokio::fs::create_dir_all(&self.dir).await?;

        for n in 0..MAX_NAME_ATTEMPTS {
            let name = match n {
                0 => base.to_string(),
                n => suffixed_name(base, n),
            };
            let path = self.dir.join(&name);
            match OpenOptions::new().write(true).create_new(true).open(&path).await {
                Ok(file) => return Ok((name, path, file)),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(e),
            }
        }

        Err(std::io::Error::new(
            ErrorKind::AlreadyExists,
            format!("no free artifact name for {}", base),
        ))
    }
}
