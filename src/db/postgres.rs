use async_trait::async_trait;
use secrecy::ExposeSecret;
use sqlx::postgres::PgConnectOptions;
use sqlx::{Connection, PgConnection};
use tracing::debug;

use crate::config::EndpointConfig;

use super::sql::count_rows_sql;
use super::{Connector, DbError};

/// PostgreSQL connector backed by one short-lived `sqlx` connection per call
#[derive(Debug, Clone, Copy, Default)]
pub struct PgConnector;

impl PgConnector {
    pub fn new() -> Self {
        Self
    }

    fn options(endpoint: &EndpointConfig) -> PgConnectOptions {
        PgConnectOptions::new()
            .host(&endpoint.host)
            .port(endpoint.port)
            .username(&endpoint.user)
            .password(endpoint.password.expose_secret())
            .database(&endpoint.database)
            .application_name("db-warden")
    }

    async fn connect(endpoint: &EndpointConfig) -> Result<PgConnection, DbError> {
        debug!(addr = %endpoint.addr(), database = %endpoint.database, "Connecting to database");
        PgConnection::connect_with(&Self::options(endpoint))
            .await
            .map_err(|e| DbError::Connection(endpoint.redact(&e.to_string())))
    }

    /// Close the connection, whatever happened on it
    async fn release(endpoint: &EndpointConfig, conn: PgConnection) {
        if let Err(e) = conn.close().await {
            debug!(addr = %endpoint.addr(), error = %e, "Connection did not close cleanly");
        }
    }
}

#[async_trait]
impl Connector for PgConnector {
    async fn ping(&self, endpoint: &EndpointConfig) -> Result<(), DbError> {
        let conn = Self::connect(endpoint).await?;
        Self::release(endpoint, conn).await;
        Ok(())
    }

    async fn count_rows(&self, endpoint: &EndpointConfig, table: &str) -> Result<i64, DbError> {
        let sql = count_rows_sql(table)?;
        let mut conn = Self::connect(endpoint).await?;

        let result = sqlx::query_scalar::<_, i64>(&sql)
            .fetch_one(&mut conn)
            .await;
        Self::release(endpoint, conn).await;

        result.map_err(|e| DbError::Query(endpoint.redact(&e.to_string())))
    }

    async fn execute(&self, endpoint: &EndpointConfig, sql: &str) -> Result<(), DbError> {
        let mut conn = Self::connect(endpoint).await?;

        let result = sqlx::query(sql).execute(&mut conn).await;
        Self::release(endpoint, conn).await;

        result
            .map(|done| debug!(rows = done.rows_affected(), "Statement executed"))
            .map_err(|e| DbError::Query(endpoint.redact(&e.to_string())))
    }
}
