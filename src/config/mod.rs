mod schema;

pub use schema::*;

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("Missing required setting {0}")]
    MissingKey(String),
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Environment variable naming an explicit config file
pub const CONFIG_PATH_ENV: &str = "WARDEN_CONFIG";

const DEFAULT_CONFIG_PATHS: [&str; 2] = ["config/warden.toml", "warden.toml"];

/// Where the running configuration came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    File(PathBuf),
    Environment,
}

impl fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File(path) => write!(f, "{}", path.display()),
            Self::Environment => f.write_str("environment"),
        }
    }
}

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let config: Config = toml::from_str(&content)?;
    config.validate()?;
    Ok(config)
}

/// Resolve the configuration for the process
///
/// An explicit `WARDEN_CONFIG` path must exist. Otherwise the first default
/// path present on disk wins, and without any file the environment is used.
pub fn load() -> Result<(Config, ConfigSource), ConfigError> {
    if let Some(path) = non_empty(std::env::var(CONFIG_PATH_ENV).ok()) {
        let config = load_config(&path)?;
        return Ok((config, ConfigSource::File(PathBuf::from(path))));
    }

    for path in DEFAULT_CONFIG_PATHS {
        if Path::new(path).is_file() {
            let config = load_config(path)?;
            return Ok((config, ConfigSource::File(PathBuf::from(path))));
        }
    }

    Ok((from_env()?, ConfigSource::Environment))
}

pub fn from_env() -> Result<Config, ConfigError> {
    from_lookup(|key| std::env::var(key).ok())
}

/// Build the configuration from a key/value source using the environment
/// key names.
pub fn from_lookup<F>(lookup: F) -> Result<Config, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let env = EnvReader { lookup };

    let primary = EndpointConfig::new(
        env.required("DATABASE_HOST")?,
        env.required_parse("DATABASE_PORT")?,
        env.required("DATABASE_USER")?,
        env.required("DATABASE_PASSWORD")?,
        env.required("DATABASE_NAME")?,
    );
    let replica = EndpointConfig::new(
        env.required("REPLICA_HOST")?,
        env.required_parse("REPLICA_PORT")?,
        env.required("REPLICA_USER")?,
        env.required("REPLICA_PASSWORD")?,
        env.required("REPLICA_DATABASE_NAME")?,
    );

    let smtp = SmtpConfig {
        host: env.required("SMTP_SERVER")?,
        port: env.parse_or("SMTP_PORT", default_smtp_port())?,
        username: env.required("GMAIL_USER")?,
        password: secret(env.required("GMAIL_PASSWORD")?),
        recipient: env.required("GMAIL_RECIPIENT")?,
        sender: None,
        timeout_secs: env.parse_or("WARDEN_SMTP_TIMEOUT_SECS", 30)?,
    };

    let defaults = MonitorConfig::default();
    let monitor = MonitorConfig {
        interval_secs: env.parse_or("WARDEN_INTERVAL_SECS", defaults.interval_secs)?,
        probe_timeout_secs: env.parse_or("WARDEN_PROBE_TIMEOUT_SECS", defaults.probe_timeout_secs)?,
        on_unreachable: env.parse_or("WARDEN_ON_UNREACHABLE", defaults.on_unreachable)?,
    };

    let defaults = BackupConfig::default();
    let backup = BackupConfig {
        dir: env.get("WARDEN_BACKUP_DIR").map(PathBuf::from).unwrap_or(defaults.dir),
        program: env.get("WARDEN_BACKUP_PROGRAM").unwrap_or(defaults.program),
        args: defaults.args,
        timeout_secs: env.parse_or("WARDEN_BACKUP_TIMEOUT_SECS", defaults.timeout_secs)?,
    };

    let defaults = ReplicaCheckConfig::default();
    let replica_check = ReplicaCheckConfig {
        schedule: env.parse_or("WARDEN_REPLICA_SCHEDULE", defaults.schedule)?,
        primary_table: env.get("WARDEN_PRIMARY_TABLE").unwrap_or(defaults.primary_table),
        replica_table: env.get("WARDEN_REPLICA_TABLE").unwrap_or(defaults.replica_table),
        seed_replica_table: env.parse_or("WARDEN_SEED_REPLICA_TABLE", defaults.seed_replica_table)?,
        alert_on_mismatch: env.parse_or("WARDEN_ALERT_ON_MISMATCH", defaults.alert_on_mismatch)?,
        query_timeout_secs: env.parse_or("WARDEN_QUERY_TIMEOUT_SECS", defaults.query_timeout_secs)?,
    };

    let logging = match env.get("WARDEN_LOG_FILE") {
        Some(file) if file.eq_ignore_ascii_case("none") => LoggingConfig { file: None },
        Some(file) => LoggingConfig {
            file: Some(PathBuf::from(file)),
        },
        None => LoggingConfig::default(),
    };

    let metrics = MetricsConfig {
        textfile: env.get("WARDEN_METRICS_FILE").map(PathBuf::from),
    };

    let config = Config {
        primary,
        replica,
        smtp,
        monitor,
        backup,
        replica_check,
        logging,
        metrics,
    };
    config.validate()?;
    Ok(config)
}

impl Config {
    /// Reject settings that would make the loop spin, hang or query nothing
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (prefix, endpoint) in [("primary", &self.primary), ("replica", &self.replica)] {
            non_blank(&format!("{}.host", prefix), &endpoint.host)?;
            non_blank(&format!("{}.user", prefix), &endpoint.user)?;
            non_blank(&format!("{}.database", prefix), &endpoint.database)?;
        }
        non_blank("smtp.host", &self.smtp.host)?;
        non_blank("smtp.recipient", &self.smtp.recipient)?;
        non_blank("backup.program", &self.backup.program)?;
        non_blank("replica_check.primary_table", &self.replica_check.primary_table)?;
        non_blank("replica_check.replica_table", &self.replica_check.replica_table)?;

        positive("monitor.interval_secs", self.monitor.interval_secs)?;
        positive("monitor.probe_timeout_secs", self.monitor.probe_timeout_secs)?;
        positive("backup.timeout_secs", self.backup.timeout_secs)?;
        positive("replica_check.query_timeout_secs", self.replica_check.query_timeout_secs)?;
        positive("smtp.timeout_secs", self.smtp.timeout_secs)?;
        Ok(())
    }
}

struct EnvReader<F> {
    lookup: F,
}

impl<F> EnvReader<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, key: &str) -> Option<String> {
        non_empty((self.lookup)(key))
    }

    fn required(&self, key: &str) -> Result<String, ConfigError> {
        self.get(key)
            .ok_or_else(|| ConfigError::MissingKey(key.to_string()))
    }

    fn required_parse<T>(&self, key: &str) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        parse_value(key, &self.required(key)?)
    }

    fn parse_or<T>(&self, key: &str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        match self.get(key) {
            Some(raw) => parse_value(key, &raw),
            None => Ok(default),
        }
    }
}

fn parse_value<T>(key: &str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
        key: key.to_string(),
        message: e.to_string(),
    })
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn non_blank(key: &str, value: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: "must not be empty".to_string(),
        });
    }
    Ok(())
}

fn positive(key: &str, value: u64) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: "must be greater than zero".to_string(),
        });
    }
    Ok(())
}
