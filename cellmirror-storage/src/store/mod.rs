//! Embedded mirror store.
//!
//! [`StoreHandle`] owns the single SQLite connection and its file;
//! [`SqliteMirrorStore`] implements the refresh and read operations on top
//! of it.

pub mod error;
pub mod handle;
pub mod path;
pub mod rows;
pub mod sqlite;
pub mod traits;

pub use error::SqliteStoreError;
pub use handle::{default_schema_sql, store_files, SharedConnection, StoreHandle};
pub use path::{resolve_store_path, resolve_store_path_for_host};
pub use rows::CachedRow;
pub use sqlite::SqliteMirrorStore;
pub use traits::MirrorStore;
