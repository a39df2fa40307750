//! Row-count comparison against a live server
//!
//! Both "endpoints" point at the same server; the tables differ.

use db_warden::replica::{CompareError, ComparisonOutcome, ReplicaComparator};

use crate::{
    connector, create_table_with_rows, dead_endpoint, drop_table, live_endpoint, scratch_table,
    skip_if_not_enabled, TIMEOUT,
};

#[tokio::test]
async fn test_equal_tables_match() {
    skip_if_not_enabled!();

    let endpoint = live_endpoint();
    let primary_table = scratch_table("match_main");
    let replica_table = scratch_table("match_copy");
    create_table_with_rows(&endpoint, &primary_table, 100).await;
    create_table_with_rows(&endpoint, &replica_table, 100).await;

    let result = ReplicaComparator::new(connector(), TIMEOUT)
        .compare_tables(&endpoint, &primary_table, &endpoint, &replica_table)
        .await
        .unwrap();

    assert_eq!(result.outcome, ComparisonOutcome::Match);
    assert_eq!(result.primary_count, 100);

    drop_table(&endpoint, &primary_table).await;
    drop_table(&endpoint, &replica_table).await;
}

#[tokio::test]
async fn test_off_by_one_is_mismatch() {
    skip_if_not_enabled!();

    let endpoint = live_endpoint();
    let primary_table = scratch_table("drift_main");
    let replica_table = scratch_table("drift_copy");
    create_table_with_rows(&endpoint, &primary_table, 100).await;
    create_table_with_rows(&endpoint, &replica_table, 99).await;

    let result = ReplicaComparator::new(connector(), TIMEOUT)
        .compare_tables(&endpoint, &primary_table, &endpoint, &replica_table)
        .await
        .unwrap();

    assert_eq!(result.outcome, ComparisonOutcome::Mismatch);
    assert_eq!((result.primary_count, result.replica_count), (100, 99));

    drop_table(&endpoint, &primary_table).await;
    drop_table(&endpoint, &replica_table).await;
}

#[tokio::test]
async fn test_seed_copies_rows_once() {
    skip_if_not_enabled!();

    let endpoint = live_endpoint();
    let source = scratch_table("seed_main");
    let target = scratch_table("seed_copy");
    create_table_with_rows(&endpoint, &source, 10).await;
    drop_table(&endpoint, &target).await;

    let comparator = ReplicaComparator::new(connector(), TIMEOUT);
    comparator.seed(&endpoint, &source, &target).await.unwrap();
    // Second seed is a no-op on the existing table
    comparator.seed(&endpoint, &source, &target).await.unwrap();

    let result = comparator
        .compare_tables(&endpoint, &source, &endpoint, &target)
        .await
        .unwrap();
    assert!(result.is_match());

    drop_table(&endpoint, &source).await;
    drop_table(&endpoint, &target).await;
}

#[tokio::test]
async fn test_unreachable_replica_is_a_failure_not_a_mismatch() {
    skip_if_not_enabled!();

    let endpoint = live_endpoint();
    let table = scratch_table("lonely");
    create_table_with_rows(&endpoint, &table, 3).await;

    let err = ReplicaComparator::new(connector(), TIMEOUT)
        .compare_tables(&endpoint, &table, &dead_endpoint(), &table)
        .await
        .unwrap_err();

    assert!(matches!(err, CompareError::Replica(_)));

    drop_table(&endpoint, &table).await;
}
