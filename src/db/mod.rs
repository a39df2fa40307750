//! Database access for probes and replica comparisons
//!
//! The rest of the crate only sees the [`Connector`] capability: "run SQL
//! against endpoint X". [`PgConnector`] is the PostgreSQL implementation.
//! Every call opens its own connection and releases it before returning.

mod postgres;
mod sql;

use std::time::Duration;

use async_trait::async_trait;

use crate::config::EndpointConfig;

pub use postgres::PgConnector;
pub use sql::{count_rows_sql, seed_table_sql, SqlError};

/// Error from a database call
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("Connection failed: {0}")]
    Connection(String),
    #[error("Query failed: {0}")]
    Query(String),
    #[error("Invalid statement: {0}")]
    Statement(#[from] SqlError),
    #[error("Timed out after {0:?}")]
    Timeout(Duration),
}

impl DbError {
    /// Whether the endpoint could not be reached at all
    pub fn is_connectivity(&self) -> bool {
        matches!(self, DbError::Connection(_) | DbError::Timeout(_))
    }
}

#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a connection to `endpoint` and release it immediately
    async fn ping(&self, endpoint: &EndpointConfig) -> Result<(), DbError>;

    /// `SELECT COUNT(*)` against `table`
    async fn count_rows(&self, endpoint: &EndpointConfig, table: &str) -> Result<i64, DbError>;

    /// Execute a statement that returns no rows
    async fn execute(&self, endpoint: &EndpointConfig, sql: &str) -> Result<(), DbError>;
}

/// Run a database call under a deadline, folding expiry into [`DbError`]
pub async fn with_timeout<T, F>(limit: Duration, call: F) -> Result<T, DbError>
where
    F: std::future::Future<Output = Result<T, DbError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(DbError::Timeout(limit)),
    }
}
