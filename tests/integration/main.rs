//! Integration test entry point
//!
//! Run with: WARDEN_RUN_INTEGRATION_TESTS=1 cargo test --test integration
//!
//! Environment variables:
//! - WARDEN_RUN_INTEGRATION_TESTS: Set to "1" to enable tests against a live PostgreSQL
//! - WARDEN_TEST_PG_HOST: Server host (default: 127.0.0.1)
//! - WARDEN_TEST_PG_PORT: Server port (default: 5432)
//! - WARDEN_TEST_PG_USER: User (default: postgres)
//! - WARDEN_TEST_PG_PASS: Password (default: postgres)
//! - WARDEN_TEST_PG_DB: Database (default: warden_test)
//!
//! Tests against unreachable endpoints need no server and always run.

mod backup;
mod comparator;
mod probe;

use std::env;
use std::sync::Arc;
use std::time::Duration;

use db_warden::config::EndpointConfig;
use db_warden::db::{Connector, PgConnector};

/// Check if integration tests should run
pub fn should_run_integration_tests() -> bool {
    env::var("WARDEN_RUN_INTEGRATION_TESTS")
        .map(|v| v == "1")
        .unwrap_or(false)
}

/// Skip test if integration tests are not enabled
#[macro_export]
macro_rules! skip_if_not_enabled {
    () => {
        if !crate::should_run_integration_tests() {
            eprintln!("Skipping integration test (set WARDEN_RUN_INTEGRATION_TESTS=1 to run)");
            return;
        }
    };
}

/// Live server endpoint from environment
pub fn live_endpoint() -> EndpointConfig {
    EndpointConfig::new(
        env::var("WARDEN_TEST_PG_HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
        env::var("WARDEN_TEST_PG_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(5432),
        env::var("WARDEN_TEST_PG_USER").unwrap_or_else(|_| "postgres".to_string()),
        env::var("WARDEN_TEST_PG_PASS").unwrap_or_else(|_| "postgres".to_string()),
        env::var("WARDEN_TEST_PG_DB").unwrap_or_else(|_| "warden_test".to_string()),
    )
}

/// Endpoint nothing listens on
pub fn dead_endpoint() -> EndpointConfig {
    EndpointConfig::new("127.0.0.1", 1, "monitor", "dead-secret", "shop")
}

pub fn connector() -> Arc<dyn Connector> {
    Arc::new(PgConnector::new())
}

pub const TIMEOUT: Duration = Duration::from_secs(10);

/// Table name unique to this test process
pub fn scratch_table(prefix: &str) -> String {
    format!("warden_{}_{}", prefix, std::process::id())
}

/// Create `table` with `rows` rows, replacing any previous copy
pub async fn create_table_with_rows(endpoint: &EndpointConfig, table: &str, rows: i64) {
    let connector = PgConnector::new();
    connector
        .execute(endpoint, &format!("DROP TABLE IF EXISTS {}", table))
        .await
        .expect("Failed to drop table");
    connector
        .execute(
            endpoint,
            &format!(
                "CREATE TABLE {} AS SELECT g AS id FROM generate_series(1, {}) AS g",
                table, rows
            ),
        )
        .await
        .expect("Failed to create table");
}

pub async fn drop_table(endpoint: &EndpointConfig, table: &str) {
    let _ = PgConnector::new()
        .execute(endpoint, &format!("DROP TABLE IF EXISTS {}", table))
        .await;
}
