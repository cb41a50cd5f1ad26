//! Startup population of every mirrored table.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use cellmirror_core::{MirrorError, MirrorNotification, MirroredTable, StorageError};
use tokio::sync::{watch, Semaphore};
use tokio::task::{Id, JoinSet};

use super::refresh::TableRefresher;
use crate::notify::{report_error, ErrorSink};

/// Per-table outcome of a bootstrap run.
///
/// Every table passed to [`BootstrapPopulator::populate`] ends up in exactly
/// one of the three lists. Lists are ordered like [`MirroredTable::ALL`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BootstrapReport {
    /// Tables loaded, with the number of rows copied.
    pub succeeded: Vec<(MirroredTable, u64)>,
    /// Tables whose refresh failed or whose task died, with the reason.
    pub failed: Vec<(MirroredTable, String)>,
    /// Tables skipped because shutdown was signalled before their lease.
    pub cancelled: Vec<MirroredTable>,
}

impl BootstrapReport {
    /// Every table loaded without error.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
            && self.cancelled.is_empty()
            && self.succeeded.len() == MirroredTable::ALL.len()
    }

    pub fn rows_for(&self, table: MirroredTable) -> Option<u64> {
        self.succeeded
            .iter()
            .find(|(t, _)| *t == table)
            .map(|(_, rows)| *rows)
    }

    fn sort(&mut self) {
        let position = |t: &MirroredTable| MirroredTable::ALL.iter().position(|x| x == t);
        self.succeeded.sort_by_key(|(t, _)| position(t));
        self.failed.sort_by_key(|(t, _)| position(t));
        self.cancelled.sort_by_key(position);
    }
}

enum TableOutcome {
    Loaded(u64),
    Failed(MirrorError),
    Cancelled,
}

/// Populates all mirrored tables with bounded concurrency.
///
/// Runs directly against the refresher, not through the refresh queue.
#[derive(Clone)]
pub struct BootstrapPopulator {
    refresher: TableRefresher,
    sink: Arc<dyn ErrorSink>,
    shutdown: Option<watch::Receiver<bool>>,
}

impl BootstrapPopulator {
    pub fn new(refresher: TableRefresher, sink: Arc<dyn ErrorSink>) -> Self {
        Self {
            refresher,
            sink,
            shutdown: None,
        }
    }

    /// Stop waiting for permits and leases once `shutdown` turns true.
    /// Tables already being loaded finish; the rest are reported as
    /// cancelled.
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Refresh every table, at most `max_parallel` at once (0 counts as 1).
    ///
    /// Never fails as a whole: each table's error is reported through the
    /// sink and recorded in the report.
    pub async fn populate_all(&self, max_parallel: usize) -> BootstrapReport {
        self.populate(&MirroredTable::ALL, max_parallel).await
    }

    /// Like [`populate_all`](Self::populate_all) for a subset of tables.
    pub async fn populate(&self, tables: &[MirroredTable], max_parallel: usize) -> BootstrapReport {
        let max_parallel = max_parallel.max(1);
        let started = Instant::now();
        let permits = Arc::new(Semaphore::new(max_parallel));
        let mut tasks = JoinSet::new();
        let mut spawned: HashMap<Id, MirroredTable> = HashMap::with_capacity(tables.len());

        tracing::info!(tables = tables.len(), max_parallel, "Bootstrap population started");

        for &table in tables {
            let permits = Arc::clone(&permits);
            let refresher = self.refresher.clone();
            let shutdown = self.shutdown.clone();
            let handle = tasks.spawn(async move {
                let outcome = match shutdown {
                    Some(mut shutdown) => {
                        let _permit = tokio::select! {
                            permit = permits.acquire_owned() => permit,
                            Ok(_) = shutdown.wait_for(|stop| *stop) => {
                                return (table, TableOutcome::Cancelled);
                            }
                        };
                        match refresher.refresh_or_cancel(table, &mut shutdown).await {
                            Ok(Some(rows)) => TableOutcome::Loaded(rows),
                            Ok(None) => TableOutcome::Cancelled,
                            Err(e) => TableOutcome::Failed(e),
                        }
                    }
                    None => {
                        let _permit = permits.acquire_owned().await;
                        match refresher.refresh(table).await {
                            Ok(rows) => TableOutcome::Loaded(rows),
                            Err(e) => TableOutcome::Failed(e),
                        }
                    }
                };
                (table, outcome)
            });
            spawned.insert(handle.id(), table);
        }

        let mut report = BootstrapReport::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((table, TableOutcome::Loaded(rows))) => {
                    tracing::debug!(table = %table, rows, "Bootstrap table loaded");
                    report.succeeded.push((table, rows));
                }
                Ok((table, TableOutcome::Failed(e))) => {
                    tracing::warn!(table = %table, error = %e, "Bootstrap table failed");
                    report.failed.push((table, e.to_string()));
                    report_error(self.sink.as_ref(), "populate_all", e);
                }
                Ok((table, TableOutcome::Cancelled)) => {
                    tracing::debug!(table = %table, "Bootstrap table cancelled");
                    report.cancelled.push(table);
                }
                Err(join) => {
                    let reason = join.to_string();
                    match spawned.get(&join.id()) {
                        Some(&table) => {
                            tracing::error!(table = %table, error = %reason, "Bootstrap task aborted");
                            report.failed.push((table, reason.clone()));
                        }
                        None => tracing::error!(error = %reason, "Bootstrap task aborted"),
                    }
                    self.sink.report(MirrorNotification::unexpected(
                        "populate_all",
                        StorageError::TaskFailed { reason },
                    ));
                }
            }
        }
        report.sort();

        tracing::info!(
            succeeded = report.succeeded.len(),
            failed = report.failed.len(),
            cancelled = report.cancelled.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Bootstrap population finished"
        );
        report
    }
}
