//! Cellmirror Test Utilities
//!
//! Shared test infrastructure for the cellmirror workspace:
//! - Proptest generators for records, events and write commands
//! - A seeded SQLite system of record in a temp directory
//! - Instrumented store and recording error sink
//! - Assertions and polling helpers

pub use cellmirror_core::{
    Cell, CellId, CellPartNo, CellPartNoView, CellPcStation, CellSwTest, CellSwTestView,
    ChangeEvent, ChangeKind, MirrorConfig, MirrorError, MirrorNotification, MirrorResult,
    MirroredTable, PcStation, ReadBackend, StorageError, SwTest, SwTestId, Tla, WriteCommand,
};

use std::time::Duration;

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for mirror types.

    use super::*;
    use proptest::prelude::*;

    pub fn arb_mirrored_table() -> impl Strategy<Value = MirroredTable> {
        prop::sample::select(MirroredTable::ALL.to_vec())
    }

    /// Non-empty table list, duplicates allowed.
    pub fn arb_table_list() -> impl Strategy<Value = Vec<MirroredTable>> {
        prop::collection::vec(arb_mirrored_table(), 1..6)
    }

    pub fn arb_change_kind() -> impl Strategy<Value = ChangeKind> {
        prop::sample::select(ChangeKind::ALL.to_vec())
    }

    pub fn arb_cell_id() -> impl Strategy<Value = CellId> {
        1i64..10_000
    }

    pub fn arb_pc_name() -> impl Strategy<Value = String> {
        "PC-[0-9]{2,4}"
    }

    pub fn arb_part_no() -> impl Strategy<Value = String> {
        "TLA-[0-9]{3}(-[A-Z])?"
    }

    pub fn arb_change_event() -> impl Strategy<Value = ChangeEvent> {
        prop_oneof![
            arb_cell_id().prop_map(ChangeEvent::CellChanged),
            arb_pc_name().prop_map(ChangeEvent::PcStationChanged),
            arb_pc_name().prop_map(ChangeEvent::PcStationCellChanged),
            (1i64..500).prop_map(ChangeEvent::SwTestChanged),
            (1i64..500).prop_map(ChangeEvent::SwTestCellChanged),
            arb_part_no().prop_map(ChangeEvent::TlaChanged),
            arb_part_no().prop_map(ChangeEvent::TlaCellChanged),
        ]
    }

    pub fn arb_cell() -> impl Strategy<Value = Cell> {
        (
            arb_cell_id(),
            "[A-Za-z][A-Za-z0-9 ]{0,15}",
            prop::option::of("[a-z ]{1,20}"),
            any::<bool>(),
        )
            .prop_map(|(cell_id, name, description, is_active)| Cell {
                cell_id,
                name,
                description,
                is_active,
            })
    }

    pub fn arb_tla() -> impl Strategy<Value = Tla> {
        (arb_part_no(), prop::option::of("[a-z ]{1,20}"), any::<bool>()).prop_map(
            |(part_no, description, is_active)| Tla {
                part_no,
                description,
                is_active,
            },
        )
    }

    pub fn arb_write_command() -> impl Strategy<Value = WriteCommand> {
        prop_oneof![
            arb_cell().prop_map(WriteCommand::UpsertCell),
            (arb_pc_name(), arb_cell_id()).prop_map(|(pc_name, cell_id)| {
                WriteCommand::AssignCellToPcStation { pc_name, cell_id }
            }),
            (arb_pc_name(), arb_cell_id()).prop_map(|(pc_name, cell_id)| {
                WriteCommand::UnassignCellFromPcStation { pc_name, cell_id }
            }),
            ((1i64..500), arb_cell_id()).prop_map(|(sw_test_id, cell_id)| {
                WriteCommand::AssignCellToSwTest { sw_test_id, cell_id }
            }),
            arb_tla().prop_map(WriteCommand::UpsertTla),
            (arb_part_no(), arb_cell_id()).prop_map(|(part_no, cell_id)| {
                WriteCommand::AssignCellToPartNo { part_no, cell_id }
            }),
        ]
    }
}

// ============================================================================
// FIXTURES
// ============================================================================

pub mod fixtures {
    //! A seeded SQLite system of record with the same relations the mirror
    //! loads from.

    use super::*;
    use cellmirror_storage::SqliteRemoteStore;
    use rusqlite::Connection;
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;

    /// DDL for the remote base tables and join views.
    pub const REMOTE_SCHEMA: &str = "
        CREATE TABLE cell (
            cell_id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            description TEXT,
            is_active INTEGER NOT NULL
        );
        CREATE TABLE pc_station (
            pc_name TEXT PRIMARY KEY,
            location TEXT,
            description TEXT
        );
        CREATE TABLE cell_pc_station (
            pc_name TEXT NOT NULL,
            cell_id INTEGER NOT NULL,
            PRIMARY KEY (pc_name, cell_id)
        );
        CREATE TABLE sw_test (
            sw_test_id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            version TEXT,
            description TEXT
        );
        CREATE TABLE cell_sw_test (
            sw_test_id INTEGER NOT NULL,
            cell_id INTEGER NOT NULL,
            PRIMARY KEY (sw_test_id, cell_id)
        );
        CREATE TABLE tla (
            part_no TEXT PRIMARY KEY,
            description TEXT,
            is_active INTEGER NOT NULL
        );
        CREATE TABLE cell_part_no (
            part_no TEXT NOT NULL,
            cell_id INTEGER NOT NULL,
            PRIMARY KEY (part_no, cell_id)
        );
        CREATE VIEW v_cell_sw_test AS
            SELECT l.sw_test_id, l.cell_id,
                   t.name AS sw_test_name, t.version AS sw_test_version,
                   c.name AS cell_name
            FROM cell_sw_test l
            LEFT JOIN sw_test t ON t.sw_test_id = l.sw_test_id
            LEFT JOIN cell c ON c.cell_id = l.cell_id;
        CREATE VIEW v_cell_part_no AS
            SELECT l.part_no, l.cell_id,
                   t.description AS tla_description,
                   c.name AS cell_name
            FROM cell_part_no l
            LEFT JOIN tla t ON t.part_no = l.part_no
            LEFT JOIN cell c ON c.cell_id = l.cell_id;
    ";

    /// Seed rows. Every relation ends up with at least one row.
    pub const SEED_DATA: &str = "
        INSERT INTO cell VALUES
            (1, 'Alpha', NULL, 1),
            (2, 'Beta', 'spare', 0),
            (3, 'Gamma', 'burn-in', 1);
        INSERT INTO pc_station VALUES
            ('PC-01', 'Lab A', NULL),
            ('PC-02', 'Lab B', 'backup');
        INSERT INTO cell_pc_station VALUES
            ('PC-01', 1), ('PC-01', 2), ('PC-02', 3);
        INSERT INTO sw_test VALUES
            (10, 'Boot', '1.0', NULL),
            (11, 'Thermal', '2.1', 'soak');
        INSERT INTO cell_sw_test VALUES
            (10, 1), (10, 2), (11, 3);
        INSERT INTO tla VALUES
            ('TLA-100', 'Main board', 1),
            ('TLA-200', 'Riser', 0);
        INSERT INTO cell_part_no VALUES
            ('TLA-100', 1), ('TLA-200', 2), ('TLA-200', 3);
    ";

    /// Remote database file plus a scratch directory for the mirror store.
    pub struct RemoteFixture {
        dir: TempDir,
        path: PathBuf,
    }

    impl RemoteFixture {
        /// Schema and seed rows.
        pub fn seeded() -> Self {
            let fixture = Self::empty();
            fixture.execute(SEED_DATA);
            fixture
        }

        /// Schema only.
        pub fn empty() -> Self {
            let dir = tempfile::tempdir().expect("create temp dir");
            let path = dir.path().join("records.db");
            let conn = Connection::open(&path).expect("create remote db");
            conn.execute_batch(REMOTE_SCHEMA).expect("create remote schema");
            Self { dir, path }
        }

        pub fn path(&self) -> &Path {
            &self.path
        }

        pub fn dir(&self) -> &Path {
            self.dir.path()
        }

        pub fn connection_string(&self) -> String {
            self.path.to_string_lossy().into_owned()
        }

        /// Where tests put the embedded mirror store.
        pub fn store_path(&self) -> PathBuf {
            self.dir.path().join("mirror").join("mirror.db")
        }

        pub fn connection(&self) -> Connection {
            Connection::open(&self.path).expect("open remote db")
        }

        /// Run `sql` against the remote, panicking on error.
        pub fn execute(&self, sql: &str) {
            self.connection().execute_batch(sql).expect("execute fixture sql");
        }

        /// Row count of a remote table or view.
        pub fn row_count(&self, relation: &str) -> u64 {
            let sql = format!("SELECT COUNT(*) FROM \"{}\"", relation);
            let count: i64 = self
                .connection()
                .query_row(&sql, [], |row| row.get(0))
                .expect("count remote rows");
            count as u64
        }

        /// Remote row count feeding `table`.
        pub fn source_count(&self, table: MirroredTable) -> u64 {
            self.row_count(table.source_relation())
        }

        pub fn remote(&self) -> SqliteRemoteStore {
            SqliteRemoteStore::new(self.connection_string(), Duration::from_secs(2))
        }

        /// Valid config pointing at this remote, with the store in the
        /// fixture directory.
        pub fn config(&self) -> MirrorConfig {
            let mut config = MirrorConfig::default();
            config.store_path = self.store_path().to_string_lossy().into_owned();
            config.remote.connection_string = self.connection_string();
            config.remote.probe_timeout_ms = 2_000;
            config.shutdown_grace_ms = 2_000;
            config
        }

        /// Config whose remote does not exist.
        pub fn unreachable_config(&self) -> MirrorConfig {
            let mut config = self.config();
            config.remote.connection_string = self
                .dir
                .path()
                .join("missing")
                .join("records.db")
                .to_string_lossy()
                .into_owned();
            config
        }
    }

    pub fn sample_cell(cell_id: CellId, name: &str) -> Cell {
        Cell {
            cell_id,
            name: name.to_string(),
            description: None,
            is_active: true,
        }
    }

    pub fn sample_tla(part_no: &str) -> Tla {
        Tla {
            part_no: part_no.to_string(),
            description: Some("fixture assembly".to_string()),
            is_active: true,
        }
    }
}

// ============================================================================
// MOCKS
// ============================================================================

pub mod mocks {
    //! Store wrapper that records concurrency, and an error sink that keeps
    //! every notification.

    use super::*;
    use async_trait::async_trait;
    use cellmirror_storage::{ErrorSink, MirrorStore, RemoteSource};
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Instant;

    /// One completed `bulk_load`, in wall-clock time.
    #[derive(Debug, Clone, Copy)]
    pub struct LoadInterval {
        pub table: MirroredTable,
        pub started: Instant,
        pub finished: Instant,
    }

    impl LoadInterval {
        pub fn overlaps(&self, other: &LoadInterval) -> bool {
            self.started < other.finished && other.started < self.finished
        }
    }

    /// Wraps a [`MirrorStore`] and records how many refreshes run at once.
    ///
    /// A refresh counts as in flight from `clear_table` until its
    /// `bulk_load` returns.
    pub struct InstrumentedStore {
        inner: Arc<dyn MirrorStore>,
        delay: Duration,
        failing: Mutex<HashSet<MirroredTable>>,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        open: Mutex<Vec<(MirroredTable, Instant)>>,
        intervals: Mutex<Vec<LoadInterval>>,
    }

    impl InstrumentedStore {
        pub fn new(inner: Arc<dyn MirrorStore>) -> Self {
            Self {
                inner,
                delay: Duration::ZERO,
                failing: Mutex::new(HashSet::new()),
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
                open: Mutex::new(Vec::new()),
                intervals: Mutex::new(Vec::new()),
            }
        }

        /// Sleep this long inside every `bulk_load`.
        pub fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }

        /// Make `bulk_load` fail for `table` until cleared.
        pub fn fail_table(&self, table: MirroredTable) {
            self.failing.lock().expect("failing lock").insert(table);
        }

        /// Undo [`fail_table`](Self::fail_table).
        pub fn heal_table(&self, table: MirroredTable) {
            self.failing.lock().expect("failing lock").remove(&table);
        }

        /// Highest number of refreshes seen running at once.
        pub fn max_in_flight(&self) -> usize {
            self.max_in_flight.load(Ordering::SeqCst)
        }

        pub fn in_flight(&self) -> usize {
            self.in_flight.load(Ordering::SeqCst)
        }

        pub fn intervals(&self) -> Vec<LoadInterval> {
            self.intervals.lock().expect("intervals lock").clone()
        }

        pub fn intervals_for(&self, table: MirroredTable) -> Vec<LoadInterval> {
            self.intervals()
                .into_iter()
                .filter(|i| i.table == table)
                .collect()
        }

        fn begin(&self, table: MirroredTable) {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            self.open
                .lock()
                .expect("open lock")
                .push((table, Instant::now()));
        }

        fn end(&self, table: MirroredTable) {
            let started = {
                let mut open = self.open.lock().expect("open lock");
                open.iter()
                    .position(|(t, _)| *t == table)
                    .map(|idx| open.remove(idx).1)
            };
            if let Some(started) = started {
                self.intervals.lock().expect("intervals lock").push(LoadInterval {
                    table,
                    started,
                    finished: Instant::now(),
                });
                self.in_flight.fetch_sub(1, Ordering::SeqCst);
            }
        }
    }

    #[async_trait]
    impl MirrorStore for InstrumentedStore {
        async fn clear_table(&self, table: MirroredTable) -> MirrorResult<u64> {
            self.begin(table);
            let result = self.inner.clear_table(table).await;
            if result.is_err() {
                self.end(table);
            }
            result
        }

        async fn bulk_load(&self, table: MirroredTable, source: &RemoteSource) -> MirrorResult<u64> {
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            let failing = self.failing.lock().expect("failing lock").contains(&table);
            let result = if failing {
                Err(StorageError::BulkLoadFailed {
                    table,
                    reason: "injected failure".to_string(),
                }
                .into())
            } else {
                self.inner.bulk_load(table, source).await
            };
            self.end(table);
            result
        }

        async fn row_count(&self, table: MirroredTable) -> MirrorResult<u64> {
            self.inner.row_count(table).await
        }
    }

    /// Keeps every notification it receives.
    #[derive(Debug, Default)]
    pub struct RecordingSink {
        notifications: Mutex<Vec<MirrorNotification>>,
    }

    impl RecordingSink {
        pub fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        pub fn notifications(&self) -> Vec<MirrorNotification> {
            self.notifications.lock().expect("sink lock").clone()
        }

        pub fn len(&self) -> usize {
            self.notifications.lock().expect("sink lock").len()
        }

        pub fn is_empty(&self) -> bool {
            self.len() == 0
        }

        /// Operation tags of the unexpected-error notifications.
        pub fn unexpected_operations(&self) -> Vec<String> {
            self.notifications()
                .iter()
                .filter_map(|n| n.operation().map(str::to_string))
                .collect()
        }

        pub fn remote_unreachable_count(&self) -> usize {
            self.notifications()
                .iter()
                .filter(|n| n.is_remote_unreachable())
                .count()
        }
    }

    impl ErrorSink for RecordingSink {
        fn report(&self, notification: MirrorNotification) {
            self.notifications.lock().expect("sink lock").push(notification);
        }
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions and polling helpers for mirror tests.

    use super::*;
    use std::future::Future;

    /// Poll `check` every 10ms until it holds or `timeout` elapses.
    pub async fn eventually<F, Fut>(timeout: Duration, mut check: F) -> bool
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = bool>,
    {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if check().await {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    #[track_caller]
    pub fn assert_ok<T: std::fmt::Debug>(result: &MirrorResult<T>) {
        assert!(result.is_ok(), "Expected Ok, got Err: {:?}", result);
    }

    #[track_caller]
    pub fn assert_storage_error<T: std::fmt::Debug>(result: &MirrorResult<T>) {
        match result {
            Err(MirrorError::Storage(_)) => {}
            other => panic!("Expected Storage error, got: {:?}", other),
        }
    }

    #[track_caller]
    pub fn assert_config_error<T: std::fmt::Debug>(result: &MirrorResult<T>) {
        match result {
            Err(MirrorError::Config(_)) => {}
            other => panic!("Expected Config error, got: {:?}", other),
        }
    }

    /// Every pair of loads of the same table ran one after the other.
    #[track_caller]
    pub fn assert_no_overlap(intervals: &[mocks::LoadInterval]) {
        for (i, a) in intervals.iter().enumerate() {
            for b in &intervals[i + 1..] {
                if a.table == b.table {
                    assert!(!a.overlaps(b), "Refreshes of {} overlapped: {:?} / {:?}", a.table, a, b);
                }
            }
        }
    }

    /// Mirror row counts equal the remote source counts for every table.
    #[track_caller]
    pub fn assert_counts_match(fixture: &fixtures::RemoteFixture, counts: &[(MirroredTable, u64)]) {
        assert_eq!(counts.len(), MirroredTable::ALL.len(), "Missing tables: {:?}", counts);
        for (table, rows) in counts {
            assert_eq!(
                *rows,
                fixture.source_count(*table),
                "Row count mismatch for {}",
                table
            );
        }
    }
}
