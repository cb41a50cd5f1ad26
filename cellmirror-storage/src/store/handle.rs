//! Embedded store connection lifecycle.
//!
//! One SQLite connection is opened at startup and shared by every component.
//! Components hold a [`SharedConnection`]; dropping a clone never closes the
//! connection. Only [`StoreHandle::close`] and [`StoreHandle::shutdown`] do.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use cellmirror_core::{MirrorConfig, MirrorResult, MirroredTable};
use rusqlite::Connection;

use super::error::SqliteStoreError;
use super::path::resolve_store_path_for_host;

/// Non-closing handle onto the process-wide store connection.
#[derive(Clone)]
pub struct SharedConnection {
    inner: Arc<Mutex<Option<Connection>>>,
}

impl SharedConnection {
    /// Wrap an open connection.
    pub fn new(conn: Connection) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Some(conn))),
        }
    }

    /// Run `f` against the connection on the blocking pool.
    pub async fn call<F, T>(&self, f: F) -> Result<T, SqliteStoreError>
    where
        F: FnOnce(&mut Connection) -> Result<T, SqliteStoreError> + Send + 'static,
        T: Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || {
            let mut guard = inner.lock().map_err(|_| SqliteStoreError::LockPoisoned)?;
            let conn = guard.as_mut().ok_or(SqliteStoreError::Closed)?;
            f(conn)
        })
        .await
        .map_err(|e| SqliteStoreError::Task(e.to_string()))?
    }

    /// False once the handle has closed the connection.
    pub fn is_open(&self) -> bool {
        self.inner.lock().map(|g| g.is_some()).unwrap_or(false)
    }

    /// Take the connection out, leaving every clone closed.
    fn take(&self) -> Option<Connection> {
        match self.inner.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        }
    }
}

impl std::fmt::Debug for SharedConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedConnection")
            .field("open", &self.is_open())
            .finish()
    }
}

/// Owner of the embedded store file and its connection.
#[derive(Debug)]
pub struct StoreHandle {
    path: PathBuf,
    conn: SharedConnection,
}

impl StoreHandle {
    /// Resolve the configured path and open the store.
    pub async fn open(config: &MirrorConfig) -> MirrorResult<Self> {
        let path = resolve_store_path_for_host(&config.store_path)?;
        let init_script = config.init_script_path.as_ref().map(PathBuf::from);
        Self::open_at(path, init_script).await
    }

    /// Open the store at an already resolved path.
    ///
    /// The schema comes from `init_script` when given, else from the built-in
    /// DDL for the mirrored tables.
    pub async fn open_at(path: PathBuf, init_script: Option<PathBuf>) -> MirrorResult<Self> {
        let open_path = path.clone();
        let conn = tokio::task::spawn_blocking(move || open_connection(&open_path, init_script.as_deref()))
            .await
            .map_err(|e| SqliteStoreError::Task(e.to_string()))??;

        tracing::info!(path = %path.display(), "Embedded store opened");

        Ok(Self {
            path,
            conn: SharedConnection::new(conn),
        })
    }

    /// Resolved store file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A non-closing handle for store users.
    pub fn connection(&self) -> SharedConnection {
        self.conn.clone()
    }

    pub fn is_open(&self) -> bool {
        self.conn.is_open()
    }

    /// Close the shared connection. Later calls through any clone fail with
    /// a closed-connection error.
    pub async fn close(&self) {
        let conn = self.conn.clone();
        let closed = tokio::task::spawn_blocking(move || {
            if let Some(conn) = conn.take() {
                if let Err((_, e)) = conn.close() {
                    tracing::debug!(error = %e, "Embedded store close reported an error");
                }
            }
        })
        .await;
        if let Err(e) = closed {
            tracing::debug!(error = %e, "Embedded store close task failed");
        }
    }

    /// Compact and/or delete on exit, then close. Failures are logged and
    /// swallowed.
    pub async fn shutdown(self, compact: bool, delete: bool) {
        if compact {
            let vacuum = self
                .conn
                .call(|conn| conn.execute_batch("VACUUM").map_err(Into::into))
                .await;
            match vacuum {
                Ok(()) => tracing::info!(path = %self.path.display(), "Embedded store compacted"),
                Err(e) => tracing::warn!(error = %e, "Embedded store compaction failed"),
            }
        }

        self.close().await;

        if delete {
            for file in store_files(&self.path) {
                match std::fs::remove_file(&file) {
                    Ok(()) => tracing::debug!(path = %file.display(), "Removed store file"),
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => tracing::debug!(path = %file.display(), error = %e, "Could not remove store file"),
                }
            }
        }

        tracing::info!(path = %self.path.display(), compact, delete, "Embedded store shut down");
    }
}

/// The store file and its write-ahead-log sidecars.
pub fn store_files(path: &Path) -> Vec<PathBuf> {
    let base = path.as_os_str().to_os_string();
    let mut files = vec![path.to_path_buf()];
    for suffix in [".wal", "-wal", "-shm"] {
        let mut name = base.clone();
        name.push(suffix);
        files.push(PathBuf::from(name));
    }
    files
}

fn open_connection(path: &Path, init_script: Option<&Path>) -> Result<Connection, SqliteStoreError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| SqliteStoreError::io(parent, e))?;
        }
    }

    let conn = Connection::open(path)?;
    let mode: String = conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
    tracing::debug!(path = %path.display(), journal_mode = %mode, "Embedded store journal mode set");

    match init_script {
        Some(script) => {
            let sql = std::fs::read_to_string(script).map_err(|e| SqliteStoreError::io(script, e))?;
            conn.execute_batch(&sql)?;
        }
        None => conn.execute_batch(&default_schema_sql())?,
    }

    Ok(conn)
}

/// DDL for all mirrored tables.
pub fn default_schema_sql() -> String {
    MirroredTable::ALL
        .iter()
        .map(|t| format!("{};", t.create_table_sql(t.as_str())))
        .collect::<Vec<_>>()
        .join("\n")
}
