//! System-of-record port.
//!
//! The remote store is authoritative. The mirror only ever reads it through
//! a bulk scan ([`RemoteSource`]) or, in direct mode, through the same read
//! queries the mirror serves. Writes go here first and invalidate the mirror
//! afterwards.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use cellmirror_core::{MirrorResult, MirroredTable, RemoteError, WriteCommand};
use rusqlite::{params, Connection, OpenFlags};

use crate::query::ReadQuery;
use crate::store::CachedRow;

/// A remote relation a mirrored table is bulk-loaded from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteSource {
    /// Path (or `file:` URI) of the remote database.
    pub connection_string: String,
    /// Remote table or view name, unquoted.
    pub relation: String,
}

impl RemoteSource {
    pub fn new(connection_string: impl Into<String>, relation: impl Into<String>) -> Self {
        Self {
            connection_string: connection_string.into(),
            relation: relation.into(),
        }
    }

    /// Read-only SQLite URI for attaching the source database.
    pub fn attach_uri(&self) -> String {
        if self.connection_string.starts_with("file:") {
            return self.connection_string.clone();
        }
        let mut uri = String::from("file:");
        for ch in self.connection_string.chars() {
            match ch {
                '%' => uri.push_str("%25"),
                '?' => uri.push_str("%3f"),
                '#' => uri.push_str("%23"),
                c => uri.push(c),
            }
        }
        uri.push_str("?mode=ro");
        uri
    }
}

/// Port onto the system of record.
///
/// Held as `Arc<dyn RemoteStore>` by the refresher, the health check and the
/// remote writer.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Trivial round trip. Any error means unreachable.
    async fn ping(&self) -> MirrorResult<()>;

    /// Where `table` is bulk-loaded from.
    fn source_for(&self, table: MirroredTable) -> RemoteSource;

    /// Apply one write. Returns the number of rows affected.
    async fn execute(&self, command: &WriteCommand) -> MirrorResult<u64>;
}

/// Remote store backed by a SQLite database file.
///
/// Every operation opens a throwaway connection, so an unreachable file
/// shows up on the next call rather than being cached in a dead handle.
#[derive(Debug, Clone)]
pub struct SqliteRemoteStore {
    connection_string: String,
    timeout: Duration,
}

impl SqliteRemoteStore {
    /// Remote at `connection_string`. `timeout` bounds each call, including
    /// opening the connection.
    pub fn new(connection_string: impl Into<String>, timeout: Duration) -> Self {
        Self {
            connection_string: connection_string.into(),
            timeout,
        }
    }

    pub fn connection_string(&self) -> &str {
        &self.connection_string
    }

    /// Run a read query against the remote relations.
    pub async fn fetch<T: CachedRow>(&self, query: ReadQuery) -> MirrorResult<Vec<T>> {
        let relation = T::TABLE.source_relation().to_string();
        self.with_connection(OpenFlags::SQLITE_OPEN_READ_ONLY, move |conn| {
            let mut stmt = conn.prepare(&query.sql).map_err(|e| query_failed(&relation, e))?;
            let rows = stmt
                .query_map(rusqlite::params_from_iter(query.params.iter()), T::from_row)
                .map_err(|e| query_failed(&relation, e))?;
            rows.collect::<rusqlite::Result<Vec<T>>>()
                .map_err(|e| query_failed(&relation, e))
        })
        .await
    }

    async fn with_connection<F, T>(&self, flags: OpenFlags, f: F) -> MirrorResult<T>
    where
        F: FnOnce(&Connection) -> Result<T, RemoteError> + Send + 'static,
        T: Send + 'static,
    {
        let path = self.connection_string.clone();
        let timeout = self.timeout;
        let task = tokio::task::spawn_blocking(move || {
            let conn = open_remote(&path, flags, timeout)?;
            f(&conn)
        });

        match tokio::time::timeout(timeout, task).await {
            Ok(Ok(result)) => result.map_err(Into::into),
            Ok(Err(join)) => Err(RemoteError::Unreachable {
                reason: join.to_string(),
            }
            .into()),
            Err(_) => Err(RemoteError::Timeout {
                timeout_ms: timeout.as_millis() as u64,
            }
            .into()),
        }
    }
}

#[async_trait]
impl RemoteStore for SqliteRemoteStore {
    async fn ping(&self) -> MirrorResult<()> {
        self.with_connection(OpenFlags::SQLITE_OPEN_READ_ONLY, |conn| {
            conn.query_row("SELECT COUNT(*) FROM sqlite_master", [], |row| row.get::<_, i64>(0))
                .map(|_| ())
                .map_err(|e| RemoteError::Unreachable {
                    reason: e.to_string(),
                })
        })
        .await
    }

    fn source_for(&self, table: MirroredTable) -> RemoteSource {
        RemoteSource::new(self.connection_string.clone(), table.source_relation())
    }

    async fn execute(&self, command: &WriteCommand) -> MirrorResult<u64> {
        let command = command.clone();
        self.with_connection(OpenFlags::SQLITE_OPEN_READ_WRITE, move |conn| {
            apply_command(conn, &command)
                .map(|n| n as u64)
                .map_err(|e| RemoteError::WriteFailed {
                    reason: format!("{}: {}", command.operation(), e),
                })
        })
        .await
    }
}

fn open_remote(path: &str, flags: OpenFlags, timeout: Duration) -> Result<Connection, RemoteError> {
    let flags = flags | OpenFlags::SQLITE_OPEN_URI | OpenFlags::SQLITE_OPEN_NO_MUTEX;
    let conn = Connection::open_with_flags(Path::new(path), flags).map_err(|e| {
        RemoteError::Unreachable {
            reason: format!("{}: {}", path, e),
        }
    })?;
    conn.busy_timeout(timeout)
        .map_err(|e| RemoteError::Unreachable {
            reason: e.to_string(),
        })?;
    Ok(conn)
}

fn query_failed(relation: &str, e: rusqlite::Error) -> RemoteError {
    RemoteError::QueryFailed {
        relation: relation.to_string(),
        reason: e.to_string(),
    }
}

fn apply_command(conn: &Connection, command: &WriteCommand) -> rusqlite::Result<usize> {
    match command {
        WriteCommand::UpsertCell(cell) => conn.execute(
            "INSERT OR REPLACE INTO cell (cell_id, name, description, is_active) VALUES (?1, ?2, ?3, ?4)",
            params![cell.cell_id, cell.name, cell.description, cell.is_active],
        ),
        WriteCommand::UpsertPcStation(station) => conn.execute(
            "INSERT OR REPLACE INTO pc_station (pc_name, location, description) VALUES (?1, ?2, ?3)",
            params![station.pc_name, station.location, station.description],
        ),
        WriteCommand::AssignCellToPcStation { pc_name, cell_id } => conn.execute(
            "INSERT OR IGNORE INTO cell_pc_station (pc_name, cell_id) VALUES (?1, ?2)",
            params![pc_name, cell_id],
        ),
        WriteCommand::UnassignCellFromPcStation { pc_name, cell_id } => conn.execute(
            "DELETE FROM cell_pc_station WHERE pc_name = ?1 AND cell_id = ?2",
            params![pc_name, cell_id],
        ),
        WriteCommand::UpsertSwTest(test) => conn.execute(
            "INSERT OR REPLACE INTO sw_test (sw_test_id, name, version, description) VALUES (?1, ?2, ?3, ?4)",
            params![test.sw_test_id, test.name, test.version, test.description],
        ),
        WriteCommand::AssignCellToSwTest { sw_test_id, cell_id } => conn.execute(
            "INSERT OR IGNORE INTO cell_sw_test (sw_test_id, cell_id) VALUES (?1, ?2)",
            params![sw_test_id, cell_id],
        ),
        WriteCommand::UnassignCellFromSwTest { sw_test_id, cell_id } => conn.execute(
            "DELETE FROM cell_sw_test WHERE sw_test_id = ?1 AND cell_id = ?2",
            params![sw_test_id, cell_id],
        ),
        WriteCommand::UpsertTla(tla) => conn.execute(
            "INSERT OR REPLACE INTO tla (part_no, description, is_active) VALUES (?1, ?2, ?3)",
            params![tla.part_no, tla.description, tla.is_active],
        ),
        WriteCommand::AssignCellToPartNo { part_no, cell_id } => conn.execute(
            "INSERT OR IGNORE INTO cell_part_no (part_no, cell_id) VALUES (?1, ?2)",
            params![part_no, cell_id],
        ),
        WriteCommand::UnassignCellFromPartNo { part_no, cell_id } => conn.execute(
            "DELETE FROM cell_part_no WHERE part_no = ?1 AND cell_id = ?2",
            params![part_no, cell_id],
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{self, Relations};
    use cellmirror_core::{Cell, MirrorError};

    fn remote_with_cells(dir: &Path) -> SqliteRemoteStore {
        let path = dir.join("records.db");
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch(
            "CREATE TABLE cell (cell_id INTEGER PRIMARY KEY, name TEXT NOT NULL, description TEXT, is_active INTEGER NOT NULL);
             INSERT INTO cell VALUES (1, 'Alpha', NULL, 1), (2, 'Beta', 'spare', 0);",
        )
        .unwrap();
        SqliteRemoteStore::new(path.to_string_lossy(), Duration::from_secs(2))
    }

    #[test]
    fn test_attach_uri_escapes() {
        let source = RemoteSource::new("/data/odd?name#1%.db", "cell");
        assert_eq!(source.attach_uri(), "file:/data/odd%3fname%231%25.db?mode=ro");
        let uri = RemoteSource::new("file:records.db?mode=ro", "cell");
        assert_eq!(uri.attach_uri(), "file:records.db?mode=ro");
    }

    #[tokio::test]
    async fn test_ping_missing_file_is_unreachable() {
        let dir = tempfile::tempdir().unwrap();
        let remote = SqliteRemoteStore::new(
            dir.path().join("absent.db").to_string_lossy(),
            Duration::from_secs(1),
        );
        let err = remote.ping().await.unwrap_err();
        assert!(err.is_remote_connectivity());
        assert!(!dir.path().join("absent.db").exists());
    }

    #[tokio::test]
    async fn test_ping_and_fetch() {
        let dir = tempfile::tempdir().unwrap();
        let remote = remote_with_cells(dir.path());
        remote.ping().await.unwrap();

        let cells: Vec<Cell> = remote.fetch(query::list_cells(Relations::Remote)).await.unwrap();
        assert_eq!(cells.len(), 2);
        assert_eq!(cells[0].name, "Alpha");
    }

    #[tokio::test]
    async fn test_fetch_missing_relation_is_query_failure() {
        let dir = tempfile::tempdir().unwrap();
        let remote = remote_with_cells(dir.path());
        let err = remote
            .fetch::<cellmirror_core::Tla>(query::list_tlas(Relations::Remote))
            .await
            .unwrap_err();
        assert!(matches!(err, MirrorError::Remote(RemoteError::QueryFailed { .. })));
        assert!(!err.is_remote_connectivity());
    }

    #[tokio::test]
    async fn test_execute_upsert() {
        let dir = tempfile::tempdir().unwrap();
        let remote = remote_with_cells(dir.path());
        let changed = remote
            .execute(&WriteCommand::UpsertCell(Cell {
                cell_id: 2,
                name: "Beta II".to_string(),
                description: None,
                is_active: true,
            }))
            .await
            .unwrap();
        assert_eq!(changed, 1);

        let cells: Vec<Cell> = remote
            .fetch(query::get_cell_by_id(Relations::Remote, 2))
            .await
            .unwrap();
        assert_eq!(cells[0].name, "Beta II");
    }

    #[test]
    fn test_source_for_uses_relation() {
        let remote = SqliteRemoteStore::new("/srv/records.db", Duration::from_secs(1));
        let source = remote.source_for(MirroredTable::CellBySwTestView);
        assert_eq!(source.relation, "v_cell_sw_test");
        assert_eq!(source.connection_string, "/srv/records.db");
    }
}
