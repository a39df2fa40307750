//! Backups with the real `pg_dump`

use std::sync::Arc;

use db_warden::backup::{BackupOutcome, BackupRunner, CommandSnapshot};

use crate::{dead_endpoint, live_endpoint, skip_if_not_enabled, TIMEOUT};

fn runner(dir: &std::path::Path) -> BackupRunner {
    BackupRunner::new(
        Arc::new(CommandSnapshot::new("pg_dump", Vec::new())),
        dir,
        TIMEOUT,
    )
}

#[tokio::test]
async fn test_dump_of_live_database() {
    skip_if_not_enabled!();

    let dir = tempfile::tempdir().unwrap();
    let result = runner(dir.path()).run(&live_endpoint()).await;

    assert_eq!(result.outcome, BackupOutcome::Success, "{:?}", result.error);
    let contents = std::fs::read_to_string(result.path.unwrap()).unwrap();
    assert!(contents.contains("PostgreSQL database dump"));
}

#[tokio::test]
async fn test_dump_of_dead_endpoint_fails() {
    skip_if_not_enabled!();

    let dir = tempfile::tempdir().unwrap();
    let result = runner(dir.path()).run(&dead_endpoint()).await;

    assert_eq!(result.outcome, BackupOutcome::Failure);
    assert!(!result.error.unwrap().contains("dead-secret"));
}
