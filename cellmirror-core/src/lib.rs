//! Cellmirror Core - Mirror Data Types
//!
//! Pure data structures shared by the mirror. All other crates depend on this.
//! No async runtime and no SQL engine live here.

use chrono::{DateTime, Utc};

mod cascade;
mod command;
mod config;
mod entities;
mod error;
mod health;
mod notification;
mod request;
mod tables;

pub use cascade::{ChangeEvent, ChangeKind, CASCADE_RULES};
pub use command::WriteCommand;
pub use config::{MirrorConfig, ReadBackend, RemoteConfig, DOCUMENTS_PREFIX};
pub use entities::{
    Cell, CellId, CellPartNo, CellPartNoView, CellPcStation, CellSwTest, CellSwTestView,
    PcStation, SwTest, SwTestId, TableRecord, Tla,
};
pub use error::{
    ConfigError, MirrorError, MirrorResult, QueueError, RemoteError, StorageError,
    ValidationError,
};
pub use health::{HealthCheck, HealthStatus};
pub use notification::MirrorNotification;
pub use request::RefreshRequest;
pub use tables::{Column, ColumnType, MirroredTable};

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;
