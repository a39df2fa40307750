//! Replica drift detection by row count
//!
//! Counts are read from each endpoint over separate connections, one after
//! the other. There is no shared snapshot, so a write landing between the
//! two reads can show up as a mismatch.

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use crate::config::EndpointConfig;
use crate::db::{self, Connector, DbError};
use crate::metrics::metrics;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonOutcome {
    Match,
    Mismatch,
}

impl ComparisonOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComparisonOutcome::Match => "match",
            ComparisonOutcome::Mismatch => "mismatch",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComparisonResult {
    pub primary_count: i64,
    pub replica_count: i64,
    pub outcome: ComparisonOutcome,
}

impl ComparisonResult {
    /// Exact equality, no tolerance
    pub fn from_counts(primary_count: i64, replica_count: i64) -> Self {
        let outcome = if primary_count == replica_count {
            ComparisonOutcome::Match
        } else {
            ComparisonOutcome::Mismatch
        };
        Self {
            primary_count,
            replica_count,
            outcome,
        }
    }

    pub fn is_match(&self) -> bool {
        self.outcome == ComparisonOutcome::Match
    }
}

/// A comparison that could not be carried out, as opposed to a mismatch
#[derive(Debug, thiserror::Error)]
pub enum CompareError {
    #[error("Primary count failed: {0}")]
    Primary(#[source] DbError),
    #[error("Replica count failed: {0}")]
    Replica(#[source] DbError),
}

impl CompareError {
    /// Whether either endpoint could not be reached, as opposed to a failing query
    pub fn is_connectivity(&self) -> bool {
        match self {
            CompareError::Primary(e) | CompareError::Replica(e) => e.is_connectivity(),
        }
    }
}

pub struct ReplicaComparator {
    connector: Arc<dyn Connector>,
    timeout: Duration,
}

impl ReplicaComparator {
    pub fn new(connector: Arc<dyn Connector>, timeout: Duration) -> Self {
        Self { connector, timeout }
    }

    /// Compare the same table on both endpoints
    pub async fn compare(
        &self,
        primary: &EndpointConfig,
        replica: &EndpointConfig,
        table: &str,
    ) -> Result<ComparisonResult, CompareError> {
        self.compare_tables(primary, table, replica, table).await
    }

    pub async fn compare_tables(
        &self,
        primary: &EndpointConfig,
        primary_table: &str,
        replica: &EndpointConfig,
        replica_table: &str,
    ) -> Result<ComparisonResult, CompareError> {
        let outcome = self
            .counts(primary, primary_table, replica, replica_table)
            .await;

        match &outcome {
            Ok(result) => {
                metrics().record_comparison(result.outcome.as_str());
                metrics().set_row_counts(result.primary_count, result.replica_count);
                match result.outcome {
                    ComparisonOutcome::Match => info!(
                        count = result.primary_count,
                        "Databases match"
                    ),
                    ComparisonOutcome::Mismatch => warn!(
                        primary = result.primary_count,
                        replica = result.replica_count,
                        "Mismatch detected"
                    ),
                }
            }
            Err(e) => {
                metrics().record_comparison("error");
                error!(error = %e, unreachable = e.is_connectivity(), "Comparison failed");
            }
        }
        outcome
    }

    async fn counts(
        &self,
        primary: &EndpointConfig,
        primary_table: &str,
        replica: &EndpointConfig,
        replica_table: &str,
    ) -> Result<ComparisonResult, CompareError> {
        let primary_count = self
            .count(primary, primary_table)
            .await
            .map_err(CompareError::Primary)?;
        let replica_count = self
            .count(replica, replica_table)
            .await
            .map_err(CompareError::Replica)?;
        Ok(ComparisonResult::from_counts(primary_count, replica_count))
    }

    async fn count(&self, endpoint: &EndpointConfig, table: &str) -> Result<i64, DbError> {
        db::with_timeout(self.timeout, self.connector.count_rows(endpoint, table))
            .await
            .map_err(|e| match e {
                DbError::Connection(text) => DbError::Connection(endpoint.redact(&text)),
                DbError::Query(text) => DbError::Query(endpoint.redact(&text)),
                other => other,
            })
    }

    /// Create `target` from `source` on `endpoint` unless it already exists
    pub async fn seed(
        &self,
        endpoint: &EndpointConfig,
        source: &str,
        target: &str,
    ) -> Result<(), DbError> {
        let sql = db::seed_table_sql(source, target)?;
        db::with_timeout(self.timeout, self.connector.execute(endpoint, &sql)).await?;
        info!(source = %source, target = %target, "Replica created successfully");
        Ok(())
    }
}
