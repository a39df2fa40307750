use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::config::EndpointConfig;
use crate::db::{Connector, DbError};
use crate::metrics::metrics;

/// Result of a single probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Connection established and released
    Up,
    /// Connection failed, with the redacted error text
    Down { reason: String },
}

impl HealthStatus {
    pub fn is_up(&self) -> bool {
        matches!(self, HealthStatus::Up)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Up => "up",
            HealthStatus::Down { .. } => "down",
        }
    }
}

/// Error during a probe
#[derive(Debug, thiserror::Error)]
pub enum CheckError {
    #[error("Connection failed: {0}")]
    Connection(String),
    #[error("Probe timed out after {0:?}")]
    Timeout(Duration),
}

impl From<DbError> for CheckError {
    fn from(e: DbError) -> Self {
        match e {
            DbError::Timeout(limit) => CheckError::Timeout(limit),
            other => CheckError::Connection(other.to_string()),
        }
    }
}

/// Single-shot reachability check, no internal retry
pub struct HealthProbe {
    connector: Arc<dyn Connector>,
    timeout: Duration,
}

impl HealthProbe {
    pub fn new(connector: Arc<dyn Connector>, timeout: Duration) -> Self {
        Self { connector, timeout }
    }

    pub async fn probe(&self, endpoint: &EndpointConfig) -> HealthStatus {
        let result = crate::db::with_timeout(self.timeout, self.connector.ping(endpoint)).await;

        let status = match result.map_err(CheckError::from) {
            Ok(()) => {
                debug!(addr = %endpoint.addr(), "Health check passed");
                HealthStatus::Up
            }
            Err(e) => {
                let reason = endpoint.redact(&e.to_string());
                warn!(addr = %endpoint.addr(), error = %reason, "Health check failed");
                HealthStatus::Down { reason }
            }
        };

        metrics().record_probe(&status);
        status
    }
}
