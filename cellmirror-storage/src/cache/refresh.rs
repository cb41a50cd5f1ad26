//! Single-table refresh: acquire, delete, bulk-load, release.

use std::sync::Arc;
use std::time::Instant;

use cellmirror_core::{MirrorResult, MirroredTable};
use tokio::sync::watch;

use super::gate::TableGate;
use crate::remote::RemoteStore;
use crate::store::MirrorStore;

/// Refreshes one mirrored table at a time under its gate lease.
///
/// Shared by bootstrap and the refresh worker so both paths run the exact
/// same sequence.
#[derive(Clone)]
pub struct TableRefresher {
    gate: TableGate,
    store: Arc<dyn MirrorStore>,
    remote: Arc<dyn RemoteStore>,
}

impl TableRefresher {
    pub fn new(gate: TableGate, store: Arc<dyn MirrorStore>, remote: Arc<dyn RemoteStore>) -> Self {
        Self {
            gate,
            store,
            remote,
        }
    }

    pub fn gate(&self) -> &TableGate {
        &self.gate
    }

    pub fn store(&self) -> &Arc<dyn MirrorStore> {
        &self.store
    }

    /// Replace every row of `table`. Returns the rows loaded.
    ///
    /// If the load fails after the delete, the table stays empty until the
    /// next successful refresh.
    pub async fn refresh(&self, table: MirroredTable) -> MirrorResult<u64> {
        let lease = self.gate.acquire(table).await;
        let result = self.replace_rows(table).await;
        drop(lease);
        result
    }

    /// Like [`refresh`](Self::refresh), but returns `Ok(None)` without
    /// touching the table if `shutdown` fires while waiting for the lease.
    pub async fn refresh_or_cancel(
        &self,
        table: MirroredTable,
        shutdown: &mut watch::Receiver<bool>,
    ) -> MirrorResult<Option<u64>> {
        let Some(lease) = self.gate.acquire_or_cancel(table, shutdown).await else {
            tracing::debug!(table = %table, "Refresh cancelled before lease");
            return Ok(None);
        };
        let result = self.replace_rows(table).await;
        drop(lease);
        result.map(Some)
    }

    async fn replace_rows(&self, table: MirroredTable) -> MirrorResult<u64> {
        let started = Instant::now();
        let removed = self.store.clear_table(table).await?;
        let source = self.remote.source_for(table);
        let rows = self.store.bulk_load(table, &source).await?;
        tracing::debug!(
            table = %table,
            source = %source.relation,
            removed,
            rows,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Table refreshed"
        );
        Ok(rows)
    }
}

impl std::fmt::Debug for TableRefresher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TableRefresher")
            .field("gate", &self.gate)
            .finish_non_exhaustive()
    }
}
