//! Error types for cellmirror operations

use crate::MirroredTable;
use thiserror::Error;

/// Embedded store errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Embedded store connection is closed")]
    ConnectionClosed,

    #[error("Query failed in {operation}: {reason}")]
    QueryFailed { operation: String, reason: String },

    /// The table was already cleared, so it stays empty until the next
    /// successful refresh.
    #[error("Bulk load into {table} failed: {reason}")]
    BulkLoadFailed { table: MirroredTable, reason: String },

    #[error("Clearing {table} failed: {reason}")]
    ClearFailed { table: MirroredTable, reason: String },

    #[error("I/O error on {path}: {reason}")]
    Io { path: String, reason: String },

    #[error("Storage lock poisoned")]
    LockPoisoned,

    #[error("Blocking task failed: {reason}")]
    TaskFailed { reason: String },
}

/// System-of-record errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RemoteError {
    #[error("Remote store unreachable: {reason}")]
    Unreachable { reason: String },

    /// Includes time spent opening the connection.
    #[error("Remote store did not answer within {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Remote query on {relation} failed: {reason}")]
    QueryFailed { relation: String, reason: String },

    #[error("Remote write failed: {reason}")]
    WriteFailed { reason: String },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Failed to parse configuration: {reason}")]
    Parse { reason: String },

    #[error("Failed to read configuration file {path}: {reason}")]
    Read { path: String, reason: String },
}

/// Validation errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Refresh request from {origin} names no tables")]
    EmptyRefreshRequest { origin: String },

    #[error("Unknown mirrored table: {name}")]
    UnknownTable { name: String },
}

/// Refresh queue errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("Refresh worker already started")]
    AlreadyStarted,

    #[error("Refresh queue is stopped")]
    Stopped,
}

/// Master error type for all cellmirror errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MirrorError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Remote error: {0}")]
    Remote(#[from] RemoteError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),
}

impl MirrorError {
    /// True for faults that mean the system of record cannot be reached at all.
    ///
    /// Timeouts count as unreachable; transient and permanent failures are
    /// not told apart.
    pub fn is_remote_connectivity(&self) -> bool {
        matches!(
            self,
            MirrorError::Remote(RemoteError::Unreachable { .. })
                | MirrorError::Remote(RemoteError::Timeout { .. })
        )
    }
}

/// Result type alias for cellmirror operations.
pub type MirrorResult<T> = Result<T, MirrorError>;

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_error_display_bulk_load() {
        let err = StorageError::BulkLoadFailed {
            table: MirroredTable::CellBySwTestView,
            reason: "no such table".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("Bulk load"));
        assert!(msg.contains("CellBySwTestView"));
        assert!(msg.contains("no such table"));
    }

    #[test]
    fn test_remote_error_display_timeout() {
        let err = RemoteError::Timeout { timeout_ms: 3000 };
        let msg = format!("{}", err);
        assert!(msg.contains("3000ms"));
    }

    #[test]
    fn test_config_error_display_invalid_value() {
        let err = ConfigError::InvalidValue {
            field: "max_bootstrap_parallelism".to_string(),
            value: "0".to_string(),
            reason: "must be at least 1".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("max_bootstrap_parallelism"));
        assert!(msg.contains("must be at least 1"));
    }

    #[test]
    fn test_validation_error_display_empty_request() {
        let err = ValidationError::EmptyRefreshRequest {
            origin: "CellChanged(7)".to_string(),
        };
        assert!(format!("{}", err).contains("CellChanged(7)"));
    }

    #[test]
    fn test_mirror_error_from_variants() {
        let storage = MirrorError::from(StorageError::ConnectionClosed);
        assert!(matches!(storage, MirrorError::Storage(_)));

        let remote = MirrorError::from(RemoteError::Unreachable {
            reason: "refused".to_string(),
        });
        assert!(matches!(remote, MirrorError::Remote(_)));

        let config = MirrorError::from(ConfigError::MissingRequired {
            field: "store_path".to_string(),
        });
        assert!(matches!(config, MirrorError::Config(_)));

        let queue = MirrorError::from(QueueError::AlreadyStarted);
        assert!(matches!(queue, MirrorError::Queue(_)));
    }

    #[test]
    fn test_connectivity_classification() {
        assert!(MirrorError::from(RemoteError::Timeout { timeout_ms: 10 }).is_remote_connectivity());
        assert!(MirrorError::from(RemoteError::Unreachable {
            reason: "dns".to_string()
        })
        .is_remote_connectivity());
        assert!(!MirrorError::from(RemoteError::QueryFailed {
            relation: "cell".to_string(),
            reason: "syntax".to_string(),
        })
        .is_remote_connectivity());
        assert!(!MirrorError::from(StorageError::ConnectionClosed).is_remote_connectivity());
    }
}
