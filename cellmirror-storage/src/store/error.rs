//! SQLite backend error type.

use cellmirror_core::{MirrorError, StorageError};

/// Error type for embedded store operations.
#[derive(Debug, thiserror::Error)]
pub enum SqliteStoreError {
    /// Any statement or connection failure reported by SQLite.
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Filesystem failure while creating, compacting or removing the store.
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The shared connection was closed by shutdown.
    #[error("Connection is closed")]
    Closed,

    /// A thread panicked while holding the connection.
    #[error("Connection lock poisoned")]
    LockPoisoned,

    /// The blocking task running the call panicked or was cancelled.
    #[error("Blocking task failed: {0}")]
    Task(String),
}

impl SqliteStoreError {
    /// Attach the path the I/O failure happened on.
    pub fn io(path: impl AsRef<std::path::Path>, source: std::io::Error) -> Self {
        SqliteStoreError::Io {
            path: path.as_ref().display().to_string(),
            source,
        }
    }

    /// Convert, attributing SQLite failures to `operation`.
    pub fn into_mirror(self, operation: &str) -> MirrorError {
        match self {
            SqliteStoreError::Sqlite(e) => StorageError::QueryFailed {
                operation: operation.to_string(),
                reason: e.to_string(),
            }
            .into(),
            other => other.into(),
        }
    }
}

/// Convert SqliteStoreError to MirrorError.
impl From<SqliteStoreError> for MirrorError {
    fn from(e: SqliteStoreError) -> Self {
        let storage = match e {
            SqliteStoreError::Sqlite(e) => StorageError::QueryFailed {
                operation: "sqlite".to_string(),
                reason: e.to_string(),
            },
            SqliteStoreError::Io { path, source } => StorageError::Io {
                path,
                reason: source.to_string(),
            },
            SqliteStoreError::Closed => StorageError::ConnectionClosed,
            SqliteStoreError::LockPoisoned => StorageError::LockPoisoned,
            SqliteStoreError::Task(reason) => StorageError::TaskFailed { reason },
        };
        MirrorError::Storage(storage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closed_maps_to_connection_closed() {
        let err: MirrorError = SqliteStoreError::Closed.into();
        assert_eq!(err, MirrorError::Storage(StorageError::ConnectionClosed));
    }

    #[test]
    fn test_sqlite_error_carries_operation() {
        let err = SqliteStoreError::Sqlite(rusqlite::Error::InvalidQuery).into_mirror("list_cells");
        assert!(matches!(
            err,
            MirrorError::Storage(StorageError::QueryFailed { ref operation, .. }) if operation == "list_cells"
        ));
    }
}
