//! Mirror store trait.

use async_trait::async_trait;
use cellmirror_core::{MirrorResult, MirroredTable};

use crate::remote::RemoteSource;

/// The refresh-side capabilities of the embedded store.
///
/// Both bootstrap and incremental refresh use exactly these two steps:
/// delete every row of a table, then bulk-load it from its remote source.
/// Implementations must be safe to call from many tasks at once; callers
/// serialize per table through the readiness gate, not through the store.
#[async_trait]
pub trait MirrorStore: Send + Sync {
    /// Delete all rows of `table`. Returns the number of rows removed.
    async fn clear_table(&self, table: MirroredTable) -> MirrorResult<u64>;

    /// Copy every row of `source` into `table`. Returns the rows inserted.
    async fn bulk_load(&self, table: MirroredTable, source: &RemoteSource) -> MirrorResult<u64>;

    async fn row_count(&self, table: MirroredTable) -> MirrorResult<u64>;
}
