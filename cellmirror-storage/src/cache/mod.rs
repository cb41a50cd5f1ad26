//! Mirror synchronization.
//!
//! Startup runs [`BootstrapPopulator`] over every table. Afterwards each
//! write to the system of record goes through [`ChangeNotifier`], which
//! enqueues its cascade on the [`RefreshQueue`]. Both paths refresh tables
//! through [`TableRefresher`] under the per-table [`TableGate`], and
//! [`CacheReader`] waits on the same gate before each read.

pub mod bootstrap;
pub mod gate;
pub mod notifier;
pub mod probe;
pub mod queue;
pub mod reader;
pub mod refresh;

pub use bootstrap::{BootstrapPopulator, BootstrapReport};
pub use gate::{TableGate, TableLease};
pub use notifier::ChangeNotifier;
pub use probe::RemoteHealthProbe;
pub use queue::{
    refresh_channel, RefreshMetrics, RefreshMetricsSnapshot, RefreshQueue, RefreshReceiver,
    RefreshSender,
};
pub use reader::CacheReader;
pub use refresh::TableRefresher;
