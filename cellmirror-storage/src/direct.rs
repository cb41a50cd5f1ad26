//! Reads served straight from the system of record.

use std::sync::Arc;

use crate::notify::{report_error, ErrorSink};
use crate::ports::impl_read_port;
use crate::query::{ReadQuery, Relations};
use crate::remote::SqliteRemoteStore;
use crate::store::CachedRow;

/// Read API against the remote store, bypassing the mirror and its gate.
///
/// Each read opens its own short-lived remote connection, so reads see
/// writes immediately and never wait on a refresh.
#[derive(Clone)]
pub struct DirectReader {
    remote: SqliteRemoteStore,
    sink: Arc<dyn ErrorSink>,
}

impl DirectReader {
    /// Reader over `remote`. Failures go to `sink`.
    pub fn new(remote: SqliteRemoteStore, sink: Arc<dyn ErrorSink>) -> Self {
        Self { remote, sink }
    }

    /// Run `query` against the remote relations. A failed read is reported
    /// as an unexpected error of the query's operation and yields no rows.
    pub async fn rows<T: CachedRow>(&self, query: ReadQuery) -> Vec<T> {
        let operation = query.operation;
        match self.remote.fetch::<T>(query).await {
            Ok(rows) => rows,
            Err(e) => {
                tracing::debug!(operation, error = %e, "Direct read failed");
                report_error(self.sink.as_ref(), operation, e);
                Vec::new()
            }
        }
    }

    /// First row of [`rows`](Self::rows), if any.
    pub async fn first<T: CachedRow>(&self, query: ReadQuery) -> Option<T> {
        self.rows(query).await.into_iter().next()
    }
}

impl_read_port!(DirectReader, Relations::Remote);

impl std::fmt::Debug for DirectReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectReader")
            .field("remote", &self.remote)
            .finish_non_exhaustive()
    }
}
