//! Gate exclusion, reader suspension and the refresh queue.

mod support;

use std::time::Duration;

use cellmirror_core::{Cell, ChangeKind, MirroredTable, QueueError, RefreshRequest};
use cellmirror_storage::query::{self, Relations};
use cellmirror_storage::{ChangeNotifier, MirrorStore, ReadPort};
use cellmirror_test_utils::assertions::{assert_no_overlap, eventually};
use support::Harness;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(5);

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_refreshes_of_one_table_do_not_interleave() {
    let h = Harness::with_delay(Duration::from_millis(25)).await;

    let tasks: Vec<_> = (0..4)
        .map(|_| {
            let refresher = h.refresher.clone();
            tokio::spawn(async move { refresher.refresh(MirroredTable::Cell).await })
        })
        .collect();
    for task in tasks {
        assert_eq!(task.await.unwrap().unwrap(), 3);
    }

    let intervals = h.store.intervals_for(MirroredTable::Cell);
    assert_eq!(intervals.len(), 4);
    assert_no_overlap(&intervals);
    assert_eq!(h.mirror_count(MirroredTable::Cell).await, 3);
}

#[tokio::test]
async fn test_read_waits_for_lease_release() {
    let h = Harness::new().await;
    h.populator().populate_all(4).await;

    let lease = h.gate.acquire(MirroredTable::Cell).await;
    let reader = h.reader();
    let read = tokio::spawn(async move { reader.list_cells().await });

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!read.is_finished());

    drop(lease);
    let cells = timeout(WAIT, read).await.unwrap().unwrap();
    assert_eq!(cells.len(), 3);
}

#[tokio::test]
async fn test_read_gives_up_on_shutdown() {
    let h = Harness::new().await;
    h.populator().populate_all(4).await;
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let reader = h.reader().with_shutdown(shutdown_rx);

    let lease = h.gate.acquire(MirroredTable::Cell).await;
    let read = tokio::spawn(async move { reader.list_cells().await });
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!read.is_finished());

    shutdown_tx.send_replace(true);
    let cells = timeout(WAIT, read).await.unwrap().unwrap();
    assert!(cells.is_empty());
    assert!(h.sink.is_empty());
    drop(lease);
}

#[tokio::test]
async fn test_bootstrap_gives_up_on_shutdown() {
    let h = Harness::new().await;
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let populator = h.populator().with_shutdown(shutdown_rx);

    let lease = h.gate.acquire(MirroredTable::Tla).await;
    let run = tokio::spawn(async move { populator.populate_all(MirroredTable::ALL.len()).await });
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!run.is_finished());

    shutdown_tx.send_replace(true);
    let report = timeout(WAIT, run).await.unwrap().unwrap();
    drop(lease);

    assert_eq!(report.cancelled, vec![MirroredTable::Tla]);
    assert_eq!(report.succeeded.len(), MirroredTable::ALL.len() - 1);
    assert_eq!(h.mirror_count(MirroredTable::Tla).await, 0);
    assert!(h.sink.is_empty());
}

#[tokio::test]
async fn test_gate_wait_does_not_hold_off_a_later_refresh() {
    let h = Harness::new().await;
    h.populator().populate_all(4).await;

    // Reader side: passes the gate while the table is free.
    h.gate.wait_until_free(MirroredTable::Cell).await;

    // A refresh starts right afterwards and clears the table.
    let lease = h.gate.acquire(MirroredTable::Cell).await;
    h.mirror.clear_table(MirroredTable::Cell).await.unwrap();

    // The reader's query is not covered by the gate and sees the cleared table.
    let rows: Vec<Cell> = h
        .mirror
        .fetch(query::list_cells(Relations::Mirror))
        .await
        .unwrap();
    assert!(rows.is_empty());
    assert!(h.gate.is_refreshing(MirroredTable::Cell));

    drop(lease);
    h.refresher.refresh(MirroredTable::Cell).await.unwrap();
    assert_eq!(h.reader().list_cells().await.len(), 3);
}

#[tokio::test]
async fn test_read_of_other_table_is_not_blocked() {
    let h = Harness::new().await;
    h.populator().populate_all(4).await;

    let _lease = h.gate.acquire(MirroredTable::Tla).await;
    let cells = timeout(Duration::from_millis(500), h.reader().list_cells())
        .await
        .unwrap();
    assert_eq!(cells.len(), 3);
}

#[tokio::test]
async fn test_linked_read_waits_on_link_table() {
    let h = Harness::new().await;
    h.populator().populate_all(4).await;

    let lease = h.gate.acquire(MirroredTable::CellByPcStation).await;
    let reader = h.reader();
    let read = tokio::spawn(async move { reader.cells_for_pc_station("PC-01").await });

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!read.is_finished());
    drop(lease);

    let cells = timeout(WAIT, read).await.unwrap().unwrap();
    assert_eq!(
        cells.iter().map(|c| c.name.as_str()).collect::<Vec<_>>(),
        vec!["Alpha", "Beta"]
    );
}

#[tokio::test]
async fn test_read_after_close_fails_soft_with_one_notification() {
    let h = Harness::new().await;
    h.populator().populate_all(4).await;
    h.handle.close().await;

    assert_eq!(h.reader().get_cell_by_id(1).await, None);

    let notifications = h.sink.notifications();
    assert_eq!(notifications.len(), 1);
    assert!(!notifications[0].is_remote_unreachable());
    assert_eq!(notifications[0].operation(), Some("get_cell_by_id"));
}

#[tokio::test]
async fn test_pc_station_change_drains_and_frees_gate() {
    let h = Harness::new().await;
    h.populator().populate_all(4).await;
    let queue = h.queue();
    queue.start().unwrap();
    let notifier = ChangeNotifier::new(queue.sender());

    h.fixture
        .execute("INSERT INTO pc_station VALUES ('PC-03', 'Lab C', NULL);");
    notifier.pc_station_changed("PC-03");

    assert!(eventually(WAIT, || async { queue.metrics().requests_processed == 1 }).await);
    timeout(
        Duration::from_millis(100),
        h.gate.wait_until_free(MirroredTable::PcStation),
    )
    .await
    .unwrap();
    assert_eq!(h.mirror_count(MirroredTable::PcStation).await, 3);
    assert!(h.reader().get_pc_station("PC-03").await.is_some());
    assert_eq!(queue.pending(), 0);

    assert!(queue.stop(WAIT).await);
}

#[tokio::test]
async fn test_queue_processes_requests_in_order() {
    let h = Harness::new().await;
    let queue = h.queue();

    queue.enqueue(RefreshRequest::new(vec![MirroredTable::Tla], "first").unwrap());
    queue.enqueue(
        RefreshRequest::new(vec![MirroredTable::Cell, MirroredTable::PcStation], "second").unwrap(),
    );
    queue.enqueue(RefreshRequest::new(vec![MirroredTable::SwTestMap], "third").unwrap());
    queue.start().unwrap();

    assert!(eventually(WAIT, || async { queue.metrics().requests_processed == 3 }).await);

    let mut intervals = h.store.intervals();
    intervals.sort_by_key(|i| i.started);
    assert_eq!(
        intervals.iter().map(|i| i.table).collect::<Vec<_>>(),
        vec![
            MirroredTable::Tla,
            MirroredTable::Cell,
            MirroredTable::PcStation,
            MirroredTable::SwTestMap,
        ]
    );
    assert_eq!(queue.metrics().tables_refreshed, 4);
    assert!(queue.stop(WAIT).await);
}

#[tokio::test]
async fn test_cell_change_refreshes_its_cascade() {
    let h = Harness::new().await;
    h.populator().populate_all(4).await;
    let before = h.store.intervals().len();
    let queue = h.queue();
    queue.start().unwrap();

    ChangeNotifier::new(queue.sender()).cell_changed(3);

    assert!(eventually(WAIT, || async { queue.metrics().requests_processed == 1 }).await);
    let refreshed: Vec<_> = h.store.intervals()[before..].iter().map(|i| i.table).collect();
    assert_eq!(refreshed, ChangeKind::Cell.cascade().to_vec());
    assert!(queue.stop(WAIT).await);
}

#[tokio::test]
async fn test_failed_refresh_is_reported_and_worker_continues() {
    let h = Harness::new().await;
    let queue = h.queue();
    queue.start().unwrap();
    h.store.fail_table(MirroredTable::Tla);

    queue.enqueue(RefreshRequest::new(vec![MirroredTable::Tla, MirroredTable::Cell], "test").unwrap());
    assert!(eventually(WAIT, || async { queue.metrics().requests_processed == 1 }).await);

    let metrics = queue.metrics();
    assert_eq!(metrics.refresh_failures, 1);
    assert_eq!(metrics.tables_refreshed, 1);
    assert_eq!(h.sink.unexpected_operations(), vec!["refresh_table".to_string()]);
    assert_eq!(h.mirror_count(MirroredTable::Cell).await, 3);
    assert!(queue.stop(WAIT).await);
}

#[tokio::test]
async fn test_start_twice_is_rejected() {
    let h = Harness::new().await;
    let queue = h.queue();

    queue.start().unwrap();
    assert_eq!(queue.start(), Err(QueueError::AlreadyStarted));
    assert!(queue.is_running());
    assert!(queue.stop(WAIT).await);
}

#[tokio::test]
async fn test_stopped_queue_ignores_requests() {
    let h = Harness::new().await;
    let queue = h.queue();

    assert!(queue.stop(WAIT).await);
    assert_eq!(queue.start(), Err(QueueError::Stopped));

    queue.enqueue(RefreshRequest::new(vec![MirroredTable::Cell], "late").unwrap());
    assert_eq!(queue.metrics().requests_enqueued, 0);
}

#[tokio::test]
async fn test_stop_abandons_worker_after_grace() {
    let h = Harness::with_delay(Duration::from_millis(500)).await;
    let queue = h.queue();
    queue.start().unwrap();

    queue.enqueue(RefreshRequest::new(vec![MirroredTable::Cell, MirroredTable::Tla], "slow").unwrap());
    assert!(eventually(WAIT, || async { h.store.in_flight() == 1 }).await);

    assert!(!queue.stop(Duration::from_millis(20)).await);
}

#[tokio::test]
async fn test_stop_waits_for_in_flight_refresh() {
    let h = Harness::with_delay(Duration::from_millis(100)).await;
    let queue = h.queue();
    queue.start().unwrap();

    queue.enqueue(RefreshRequest::new(vec![MirroredTable::Cell, MirroredTable::Tla], "slow").unwrap());
    assert!(eventually(WAIT, || async { h.store.in_flight() == 1 }).await);

    assert!(queue.stop(WAIT).await);
    // The in-flight table completes; the rest of the request is skipped.
    assert_eq!(h.store.intervals().len(), 1);
    assert_eq!(h.store.intervals()[0].table, MirroredTable::Cell);
    assert!(!queue.is_running());
}
