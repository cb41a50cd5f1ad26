//! Gated reads from the embedded mirror.

use std::sync::Arc;

use tokio::sync::watch;

use crate::notify::{report_error, ErrorSink};
use crate::ports::impl_read_port;
use crate::query::{ReadQuery, Relations};
use crate::store::{CachedRow, SqliteMirrorStore};

use super::gate::TableGate;

/// Read API over the mirror.
///
/// Every read first waits until no refresh is in flight on each table it
/// touches, then queries without holding any lease. A refresh that starts
/// after the wait can race the read. Failures are reported through the
/// sink and the read returns empty or absent.
#[derive(Clone)]
pub struct CacheReader {
    gate: TableGate,
    store: SqliteMirrorStore,
    sink: Arc<dyn ErrorSink>,
    shutdown: Option<watch::Receiver<bool>>,
}

impl CacheReader {
    pub fn new(gate: TableGate, store: SqliteMirrorStore, sink: Arc<dyn ErrorSink>) -> Self {
        Self {
            gate,
            store,
            sink,
            shutdown: None,
        }
    }

    /// Give up waiting on the gate once `shutdown` turns true. Cancelled
    /// reads return empty and are not reported.
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Run `query` once every table it touches is free.
    pub async fn rows<T: CachedRow>(&self, query: ReadQuery) -> Vec<T> {
        let operation = query.operation;
        if !self.wait_for_tables(&query).await {
            tracing::debug!(operation, "Mirror read cancelled by shutdown");
            return Vec::new();
        }
        match self.store.fetch::<T>(query).await {
            Ok(rows) => rows,
            Err(e) => {
                tracing::debug!(operation, error = %e, "Mirror read failed");
                report_error(self.sink.as_ref(), operation, e);
                Vec::new()
            }
        }
    }

    pub async fn first<T: CachedRow>(&self, query: ReadQuery) -> Option<T> {
        self.rows(query).await.into_iter().next()
    }

    async fn wait_for_tables(&self, query: &ReadQuery) -> bool {
        match &self.shutdown {
            Some(shutdown) => {
                let mut shutdown = shutdown.clone();
                for table in &query.tables {
                    if !self.gate.wait_until_free_or_cancel(table, &mut shutdown).await {
                        return false;
                    }
                }
            }
            None => {
                for table in &query.tables {
                    self.gate.wait_until_free(table).await;
                }
            }
        }
        true
    }
}

impl_read_port!(CacheReader, Relations::Mirror);

impl std::fmt::Debug for CacheReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheReader")
            .field("gate", &self.gate)
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}
