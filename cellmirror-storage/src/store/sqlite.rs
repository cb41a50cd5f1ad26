//! SQLite-backed mirror store.
//!
//! Bulk loads attach the remote database read-only and copy rows with a
//! single `INSERT ... SELECT`, so no row passes through application code.
//! Attach, copy and detach all happen under one hold of the shared
//! connection.

use async_trait::async_trait;
use cellmirror_core::{MirrorResult, MirroredTable, StorageError};

use super::error::SqliteStoreError;
use super::handle::SharedConnection;
use super::rows::CachedRow;
use super::traits::MirrorStore;
use crate::query::ReadQuery;
use crate::remote::RemoteSource;

/// Schema name the remote database is attached under during a bulk load.
const SOURCE_ALIAS: &str = "cellmirror_src";

/// Mirror store over the process-wide SQLite connection.
///
/// Clones share the connection; none of them closes it. Table names come
/// from [`MirroredTable`] and are never user input, so they are formatted
/// into the SQL directly.
#[derive(Debug, Clone)]
pub struct SqliteMirrorStore {
    conn: SharedConnection,
}

impl SqliteMirrorStore {
    /// Store over `conn`, usually [`StoreHandle::connection`](super::StoreHandle::connection).
    pub fn new(conn: SharedConnection) -> Self {
        Self { conn }
    }

    /// Run a read query and map every row.
    ///
    /// # Errors
    ///
    /// Any SQLite failure is reported as a read failure of the query's
    /// operation; a closed connection as [`StorageError::ConnectionClosed`].
    pub async fn fetch<T: CachedRow>(&self, query: ReadQuery) -> MirrorResult<Vec<T>> {
        let operation = query.operation;
        self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&query.sql)?;
                let rows = stmt.query_map(rusqlite::params_from_iter(query.params.iter()), T::from_row)?;
                Ok(rows.collect::<rusqlite::Result<Vec<T>>>()?)
            })
            .await
            .map_err(|e| e.into_mirror(operation))
    }
}

#[async_trait]
impl MirrorStore for SqliteMirrorStore {
    /// `DELETE FROM` the local table. Runs in its own implicit transaction.
    async fn clear_table(&self, table: MirroredTable) -> MirrorResult<u64> {
        self.conn
            .call(move |conn| {
                let removed = conn.execute(&format!("DELETE FROM \"{}\"", table.as_str()), [])?;
                Ok(removed as u64)
            })
            .await
            .map_err(|e| match e {
                SqliteStoreError::Sqlite(e) => StorageError::ClearFailed {
                    table,
                    reason: e.to_string(),
                }
                .into(),
                other => other.into(),
            })
    }

    /// Attach `source` read-only, copy its rows, detach.
    ///
    /// The detach runs even when the copy fails, so a failed load never
    /// leaves the alias attached for the next one.
    async fn bulk_load(&self, table: MirroredTable, source: &RemoteSource) -> MirrorResult<u64> {
        let uri = source.attach_uri();
        let relation = source.relation.clone();
        self.conn
            .call(move |conn| {
                conn.execute(&format!("ATTACH DATABASE ?1 AS {}", SOURCE_ALIAS), [&uri])?;
                let columns = table.column_list();
                let copied = conn.execute(
                    &format!(
                        "INSERT INTO main.\"{}\" ({}) SELECT {} FROM {}.\"{}\"",
                        table.as_str(),
                        columns,
                        columns,
                        SOURCE_ALIAS,
                        relation
                    ),
                    [],
                );
                let detached = conn.execute(&format!("DETACH DATABASE {}", SOURCE_ALIAS), []);
                let copied = copied?;
                detached?;
                Ok(copied as u64)
            })
            .await
            .map_err(|e| match e {
                SqliteStoreError::Sqlite(e) => StorageError::BulkLoadFailed {
                    table,
                    reason: e.to_string(),
                }
                .into(),
                other => other.into(),
            })
    }

    async fn row_count(&self, table: MirroredTable) -> MirrorResult<u64> {
        self.conn
            .call(move |conn| {
                let count: i64 = conn.query_row(
                    &format!("SELECT COUNT(*) FROM \"{}\"", table.as_str()),
                    [],
                    |row| row.get(0),
                )?;
                Ok(count.max(0) as u64)
            })
            .await
            .map_err(|e| e.into_mirror("row_count"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{self, Relations};
    use crate::store::StoreHandle;
    use cellmirror_core::{Cell, MirrorError};
    use rusqlite::Connection;

    fn seed_remote(path: &std::path::Path) {
        let conn = Connection::open(path).unwrap();
        conn.execute_batch(
            "CREATE TABLE cell (cell_id INTEGER PRIMARY KEY, name TEXT NOT NULL, description TEXT, is_active INTEGER NOT NULL);
             INSERT INTO cell VALUES (1, 'Alpha', NULL, 1), (2, 'Beta', NULL, 1), (3, 'Gamma', 'old', 0);",
        )
        .unwrap();
    }

    async fn open(dir: &std::path::Path) -> (StoreHandle, SqliteMirrorStore) {
        let handle = StoreHandle::open_at(dir.join("mirror.db"), None).await.unwrap();
        let store = SqliteMirrorStore::new(handle.connection());
        (handle, store)
    }

    #[tokio::test]
    async fn test_clear_then_bulk_load() {
        let dir = tempfile::tempdir().unwrap();
        let remote = dir.path().join("records.db");
        seed_remote(&remote);
        let (_handle, store) = open(dir.path()).await;
        let source = RemoteSource::new(remote.to_string_lossy(), "cell");

        assert_eq!(store.bulk_load(MirroredTable::Cell, &source).await.unwrap(), 3);
        assert_eq!(store.row_count(MirroredTable::Cell).await.unwrap(), 3);

        assert_eq!(store.clear_table(MirroredTable::Cell).await.unwrap(), 3);
        assert_eq!(store.bulk_load(MirroredTable::Cell, &source).await.unwrap(), 3);
        assert_eq!(store.row_count(MirroredTable::Cell).await.unwrap(), 3);

        let cells: Vec<Cell> = store
            .fetch(query::search_cells_by_name(Relations::Mirror, "g"))
            .await
            .unwrap();
        assert_eq!(cells.len(), 1);
        assert_eq!(cells[0].cell_id, 3);
    }

    #[tokio::test]
    async fn test_bulk_load_missing_relation_fails_and_detaches() {
        let dir = tempfile::tempdir().unwrap();
        let remote = dir.path().join("records.db");
        seed_remote(&remote);
        let (_handle, store) = open(dir.path()).await;

        let bad = RemoteSource::new(remote.to_string_lossy(), "tla");
        let err = store.bulk_load(MirroredTable::Tla, &bad).await.unwrap_err();
        assert!(matches!(
            err,
            MirrorError::Storage(StorageError::BulkLoadFailed { table: MirroredTable::Tla, .. })
        ));

        let good = RemoteSource::new(remote.to_string_lossy(), "cell");
        assert_eq!(store.bulk_load(MirroredTable::Cell, &good).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_bulk_load_missing_remote_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let (_handle, store) = open(dir.path()).await;
        let source = RemoteSource::new(dir.path().join("absent.db").to_string_lossy(), "cell");
        assert!(store.bulk_load(MirroredTable::Cell, &source).await.is_err());
        assert!(!dir.path().join("absent.db").exists());
    }

    #[tokio::test]
    async fn test_fetch_after_close_reports_closed() {
        let dir = tempfile::tempdir().unwrap();
        let (handle, store) = open(dir.path()).await;
        handle.close().await;
        let err = store
            .fetch::<Cell>(query::get_cell_by_id(Relations::Mirror, 1))
            .await
            .unwrap_err();
        assert_eq!(err, MirrorError::Storage(StorageError::ConnectionClosed));
    }
}
