//! Bootstrap population against a seeded SQLite system of record.

mod support;

use std::time::Duration;

use cellmirror_core::MirroredTable;
use cellmirror_test_utils::assertions::{assert_counts_match, assert_no_overlap};
use support::Harness;

#[tokio::test]
async fn test_populate_all_matches_remote_counts() {
    let h = Harness::new().await;

    let report = h.populator().populate_all(4).await;

    assert!(report.is_complete(), "{:?}", report);
    assert!(h.sink.is_empty(), "{:?}", h.sink.notifications());
    assert_counts_match(&h.fixture, &h.mirror_counts().await);
    for table in MirroredTable::ALL {
        assert_eq!(report.rows_for(table), Some(h.fixture.source_count(table)));
    }
}

#[tokio::test]
async fn test_populate_all_is_idempotent() {
    let h = Harness::new().await;

    h.populator().populate_all(4).await;
    let first = h.mirror_counts().await;
    h.populator().populate_all(4).await;
    let second = h.mirror_counts().await;

    assert_eq!(first, second);
    assert_counts_match(&h.fixture, &second);
}

#[tokio::test]
async fn test_populate_respects_parallelism_bound() {
    let h = Harness::with_delay(Duration::from_millis(40)).await;

    let report = h.populator().populate_all(2).await;

    assert!(report.is_complete());
    assert_eq!(h.store.max_in_flight(), 2);
    assert_eq!(h.store.intervals().len(), MirroredTable::ALL.len());
}

#[tokio::test]
async fn test_zero_parallelism_runs_sequentially() {
    let h = Harness::with_delay(Duration::from_millis(10)).await;

    let report = h.populator().populate_all(0).await;

    assert!(report.is_complete());
    assert_eq!(h.store.max_in_flight(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_nine_tables_parallel_four_without_errors() {
    let h = Harness::with_delay(Duration::from_millis(20)).await;

    let report = h.populator().populate_all(4).await;

    assert_eq!(report.succeeded.len(), 9);
    assert!(report.failed.is_empty());
    assert!(h.sink.is_empty());
    assert!(h.store.max_in_flight() <= 4);
    assert_no_overlap(&h.store.intervals());
    assert!(h.gate.known_tables().iter().all(|t| !h.gate.is_refreshing(t)));
}

#[tokio::test]
async fn test_failed_table_is_reported_and_left_empty() {
    let h = Harness::new().await;
    h.populator().populate_all(4).await;
    h.store.fail_table(MirroredTable::Tla);

    let report = h.populator().populate_all(4).await;

    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, MirroredTable::Tla);
    assert_eq!(report.succeeded.len(), 8);
    assert_eq!(h.mirror_count(MirroredTable::Tla).await, 0);
    assert_eq!(h.sink.unexpected_operations(), vec!["populate_all".to_string()]);

    h.store.heal_table(MirroredTable::Tla);
    h.refresher.refresh(MirroredTable::Tla).await.unwrap();
    assert_eq!(h.mirror_count(MirroredTable::Tla).await, 2);
}

#[tokio::test]
async fn test_missing_remote_relation_fails_only_that_table() {
    let h = Harness::new().await;
    h.fixture.execute("DROP VIEW v_cell_part_no;");

    let report = h.populator().populate_all(3).await;

    assert_eq!(
        report.failed.iter().map(|(t, _)| *t).collect::<Vec<_>>(),
        vec![MirroredTable::CellByPartNoView]
    );
    assert_eq!(h.sink.len(), 1);
    assert_eq!(h.mirror_count(MirroredTable::Cell).await, 3);
}

#[tokio::test]
async fn test_empty_remote_populates_empty_tables() {
    let h = Harness::over(
        cellmirror_test_utils::fixtures::RemoteFixture::empty(),
        Duration::ZERO,
    )
    .await;

    let report = h.populator().populate_all(4).await;

    assert!(report.is_complete());
    assert!(h.mirror_counts().await.iter().all(|(_, rows)| *rows == 0));
}
