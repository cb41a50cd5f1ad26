//! Cellmirror Storage - Embedded Mirror and Refresh Machinery
//!
//! Keeps a local SQLite copy of the cell-management tables in step with the
//! system of record. Readers query the mirror; writers go to the remote and
//! trigger a cascade of table refreshes through the [`cache::RefreshQueue`].

pub mod cache;
pub mod direct;
pub mod notify;
pub mod ports;
pub mod query;
pub mod remote;
pub mod runtime;
pub mod store;

pub use cache::{
    BootstrapPopulator, BootstrapReport, CacheReader, ChangeNotifier, RefreshMetricsSnapshot,
    RefreshQueue, RemoteHealthProbe, TableGate, TableLease, TableRefresher,
};
pub use direct::DirectReader;
pub use notify::{report_error, ChannelErrorSink, ErrorSink, TracingErrorSink};
pub use ports::{MirroredWriter, OfflineWriter, ReadPort, RemoteWriter, WritePort};
pub use query::{ReadQuery, Relations};
pub use remote::{RemoteSource, RemoteStore, SqliteRemoteStore};
pub use runtime::{MirrorMode, MirrorRuntime};
pub use store::{
    CachedRow, MirrorStore, SharedConnection, SqliteMirrorStore, SqliteStoreError, StoreHandle,
};
