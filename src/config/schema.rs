use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer};

#[derive(Debug, Deserialize)]
pub struct Config {
    /// Authoritative database, probed and backed up
    pub primary: EndpointConfig,
    /// Secondary database checked for drift
    pub replica: EndpointConfig,
    /// Operator notification transport
    pub smtp: SmtpConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub backup: BackupConfig,
    #[serde(default)]
    pub replica_check: ReplicaCheckConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

// ============================================================================
// Endpoints
// ============================================================================

/// Connection details for one database endpoint
///
/// The password is held as a [`SecretString`] so `Debug` output never
/// carries it. Use [`EndpointConfig::redact`] on any error text that might
/// echo it back.
#[derive(Debug, Deserialize)]
pub struct EndpointConfig {
    pub host: String,
    #[serde(default = "default_pg_port")]
    pub port: u16,
    pub user: String,
    #[serde(deserialize_with = "deserialize_secret")]
    pub password: SecretString,
    pub database: String,
}

fn default_pg_port() -> u16 {
    5432
}

const REDACTED: &str = "********";

impl EndpointConfig {
    pub fn new(
        host: impl Into<String>,
        port: u16,
        user: impl Into<String>,
        password: impl Into<String>,
        database: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            user: user.into(),
            password: secret(password.into()),
            database: database.into(),
        }
    }

    /// Get the address string (host:port)
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Credential-free description for log lines
    pub fn describe(&self) -> String {
        format!("{}@{}:{}/{}", self.user, self.host, self.port, self.database)
    }

    /// Strip the password from text that may have been produced by a driver
    /// or an external process.
    pub fn redact(&self, text: &str) -> String {
        let password = self.password.expose_secret();
        if password.is_empty() {
            text.to_string()
        } else {
            text.replace(password, REDACTED)
        }
    }
}

// ============================================================================
// Notification transport
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct SmtpConfig {
    pub host: String,
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    /// Account used to authenticate against the relay
    pub username: String,
    #[serde(deserialize_with = "deserialize_secret")]
    pub password: SecretString,
    /// Fixed operator address
    pub recipient: String,
    /// From address, defaults to `username`
    #[serde(default)]
    pub sender: Option<String>,
    #[serde(default = "default_smtp_timeout_secs")]
    pub timeout_secs: u64,
}

pub(crate) fn default_smtp_port() -> u16 {
    587
}

fn default_smtp_timeout_secs() -> u64 {
    30
}

impl SmtpConfig {
    pub fn sender(&self) -> &str {
        self.sender.as_deref().unwrap_or(&self.username)
    }
}

// ============================================================================
// Health / backup cycle
// ============================================================================

/// What to do when the primary fails its probe
///
/// A backup is never attempted against an unreachable primary, whichever
/// policy is selected. The policy only decides how often the operator hears
/// about it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum UnreachablePolicy {
    /// Alert on every cycle the primary is down
    #[default]
    AlertEveryCycle,
    /// Alert once when the primary goes down, stay quiet until it recovers
    AlertOnTransition,
}

impl FromStr for UnreachablePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "alert_every_cycle" => Ok(Self::AlertEveryCycle),
            "alert_on_transition" => Ok(Self::AlertOnTransition),
            other => Err(format!(
                "unknown policy '{}', expected alert_every_cycle or alert_on_transition",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MonitorConfig {
    /// Sleep between cycles (seconds)
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    /// Timeout for the primary probe connect (seconds)
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,
    #[serde(default)]
    pub on_unreachable: UnreachablePolicy,
}

fn default_interval_secs() -> u64 {
    300
}

fn default_probe_timeout_secs() -> u64 {
    10
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            probe_timeout_secs: default_probe_timeout_secs(),
            on_unreachable: UnreachablePolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BackupConfig {
    /// Directory receiving `db_backup_*.sql` artifacts
    #[serde(default = "default_backup_dir")]
    pub dir: PathBuf,
    /// Snapshot program, fed libpq environment variables
    #[serde(default = "default_backup_program")]
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default = "default_backup_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_backup_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_backup_program() -> String {
    "pg_dump".to_string()
}

fn default_backup_timeout_secs() -> u64 {
    3600
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            dir: default_backup_dir(),
            program: default_backup_program(),
            args: Vec::new(),
            timeout_secs: default_backup_timeout_secs(),
        }
    }
}

// ============================================================================
// Replica consistency
// ============================================================================

/// When the replica comparison runs relative to the health/backup cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReplicaSchedule {
    Disabled,
    /// Once at startup, before the first cycle
    #[default]
    Once,
    /// After every health/backup cycle
    EveryCycle,
}

impl FromStr for ReplicaSchedule {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "disabled" => Ok(Self::Disabled),
            "once" => Ok(Self::Once),
            "every_cycle" => Ok(Self::EveryCycle),
            other => Err(format!(
                "unknown schedule '{}', expected disabled, once or every_cycle",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReplicaCheckConfig {
    #[serde(default)]
    pub schedule: ReplicaSchedule,
    /// Table counted on the primary
    #[serde(default = "default_primary_table")]
    pub primary_table: String,
    /// Table counted on the replica
    #[serde(default = "default_replica_table")]
    pub replica_table: String,
    /// Create the replica table from the primary table before comparing
    #[serde(default = "default_seed_replica_table")]
    pub seed_replica_table: bool,
    /// Send an operator notification on count mismatch
    #[serde(default)]
    pub alert_on_mismatch: bool,
    #[serde(default = "default_query_timeout_secs")]
    pub query_timeout_secs: u64,
}

fn default_primary_table() -> String {
    "main_table".to_string()
}

fn default_replica_table() -> String {
    "replica_table".to_string()
}

fn default_seed_replica_table() -> bool {
    true
}

fn default_query_timeout_secs() -> u64 {
    30
}

impl Default for ReplicaCheckConfig {
    fn default() -> Self {
        Self {
            schedule: ReplicaSchedule::default(),
            primary_table: default_primary_table(),
            replica_table: default_replica_table(),
            seed_replica_table: default_seed_replica_table(),
            alert_on_mismatch: false,
            query_timeout_secs: default_query_timeout_secs(),
        }
    }
}

// ============================================================================
// Ambient
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Append-only log file next to console output
    #[serde(default = "default_log_file")]
    pub file: Option<PathBuf>,
}

fn default_log_file() -> Option<PathBuf> {
    Some(PathBuf::from("db_monitor.log"))
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            file: default_log_file(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MetricsConfig {
    /// Prometheus textfile written after every cycle
    #[serde(default)]
    pub textfile: Option<PathBuf>,
}

// ============================================================================
// Helpers
// ============================================================================

pub(crate) fn secret(value: String) -> SecretString {
    SecretString::new(value.into_boxed_str())
}

fn deserialize_secret<'de, D>(deserializer: D) -> Result<SecretString, D::Error>
where
    D: Deserializer<'de>,
{
    String::deserialize(deserializer).map(secret)
}

impl fmt::Display for UnreachablePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlertEveryCycle => f.write_str("alert_every_cycle"),
            Self::AlertOnTransition => f.write_str("alert_on_transition"),
        }
    }
}

impl fmt::Display for ReplicaSchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disabled => f.write_str("disabled"),
            Self::Once => f.write_str("once"),
            Self::EveryCycle => f.write_str("every_cycle"),
        }
    }
}
