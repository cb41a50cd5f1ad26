//! Startup and shutdown orchestration.

use std::sync::Arc;
use std::time::Duration;

use cellmirror_core::{MirrorConfig, MirrorResult, MirroredTable, ReadBackend};
use tokio::sync::watch;

use crate::cache::{
    BootstrapPopulator, BootstrapReport, CacheReader, ChangeNotifier, RefreshMetricsSnapshot,
    RefreshQueue, RemoteHealthProbe, TableGate, TableRefresher,
};
use crate::direct::DirectReader;
use crate::notify::ErrorSink;
use crate::ports::{MirroredWriter, OfflineWriter, ReadPort, RemoteWriter, WritePort};
use crate::remote::{RemoteStore, SqliteRemoteStore};
use crate::store::{MirrorStore, SqliteMirrorStore, StoreHandle};

/// Whether the system of record was reachable at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MirrorMode {
    Online,
    /// Remote unreachable: no bootstrap, no refresh worker, writes rejected.
    Offline,
}

/// The assembled mirror: store, gate, queue, ports.
///
/// Every gate wait made on behalf of the runtime (bootstrap and mirror
/// reads) gives up once the shutdown signal turns true.
pub struct MirrorRuntime {
    config: MirrorConfig,
    mode: MirrorMode,
    store: StoreHandle,
    mirror: SqliteMirrorStore,
    gate: TableGate,
    queue: RefreshQueue,
    notifier: ChangeNotifier,
    reader: Arc<dyn ReadPort>,
    writer: Arc<dyn WritePort>,
    bootstrap: Option<BootstrapReport>,
    /// Present when the runtime created its own shutdown signal.
    shutdown_tx: Option<watch::Sender<bool>>,
}

impl MirrorRuntime {
    /// Open the store, check the remote, then either bootstrap and start the
    /// refresh worker or fall back to offline mode.
    ///
    /// The runtime owns its shutdown signal and raises it in
    /// [`shutdown`](Self::shutdown).
    pub async fn start(config: MirrorConfig, sink: Arc<dyn ErrorSink>) -> MirrorResult<Self> {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut runtime = Self::start_cancellable(config, sink, shutdown_rx).await?;
        runtime.shutdown_tx = Some(shutdown_tx);
        Ok(runtime)
    }

    /// Like [`start`](Self::start), but driven by a caller-owned signal.
    /// Raising it during bootstrap skips the tables still waiting and
    /// leaves the refresh queue closed.
    pub async fn start_cancellable(
        config: MirrorConfig,
        sink: Arc<dyn ErrorSink>,
        shutdown: watch::Receiver<bool>,
    ) -> MirrorResult<Self> {
        config.validate()?;
        let store = StoreHandle::open(&config).await?;
        Self::start_with_store(config, store, sink, shutdown).await
    }

    /// Like [`start_cancellable`](Self::start_cancellable) with an already
    /// opened store.
    pub async fn start_with_store(
        config: MirrorConfig,
        store: StoreHandle,
        sink: Arc<dyn ErrorSink>,
        shutdown: watch::Receiver<bool>,
    ) -> MirrorResult<Self> {
        let remote = SqliteRemoteStore::new(
            config.remote.connection_string.clone(),
            config.remote.probe_timeout(),
        );
        let remote_port: Arc<dyn RemoteStore> = Arc::new(remote.clone());

        let mirror = SqliteMirrorStore::new(store.connection());
        let mirror_port: Arc<dyn MirrorStore> = Arc::new(mirror.clone());
        let gate = TableGate::new();
        let refresher = TableRefresher::new(gate.clone(), mirror_port, Arc::clone(&remote_port));
        let queue = RefreshQueue::new(refresher.clone(), Arc::clone(&sink));
        let notifier = ChangeNotifier::new(queue.sender());

        let probe = RemoteHealthProbe::new(
            Arc::clone(&remote_port),
            Arc::clone(&sink),
            config.remote.probe_timeout(),
        );
        let mode = if probe.test_connectivity().await {
            MirrorMode::Online
        } else {
            MirrorMode::Offline
        };

        let mut bootstrap = None;
        let writer: Arc<dyn WritePort> = match mode {
            MirrorMode::Online => {
                let populator = BootstrapPopulator::new(refresher, Arc::clone(&sink))
                    .with_shutdown(shutdown.clone());
                bootstrap = Some(populator.populate_all(config.max_bootstrap_parallelism).await);
                let cancelled = *shutdown.borrow();
                if cancelled {
                    tracing::info!("Shutdown during bootstrap; refresh worker not started");
                    queue.stop(Duration::ZERO).await;
                } else {
                    queue.start()?;
                }
                Arc::new(MirroredWriter::new(
                    Arc::new(RemoteWriter::new(remote_port, Arc::clone(&sink))),
                    notifier.clone(),
                ))
            }
            MirrorMode::Offline => {
                tracing::warn!("Remote store unreachable; starting in offline mode");
                // Nothing drains the queue offline.
                queue.stop(Duration::ZERO).await;
                Arc::new(OfflineWriter::new(Arc::clone(&sink)))
            }
        };

        let reader: Arc<dyn ReadPort> = match config.read_backend {
            ReadBackend::Mirror => Arc::new(
                CacheReader::new(gate.clone(), mirror.clone(), sink).with_shutdown(shutdown),
            ),
            ReadBackend::Direct => Arc::new(DirectReader::new(remote, sink)),
        };

        tracing::info!(
            mode = ?mode,
            read_backend = ?config.read_backend,
            store = %store.path().display(),
            "Mirror runtime started"
        );

        Ok(Self {
            config,
            mode,
            store,
            mirror,
            gate,
            queue,
            notifier,
            reader,
            writer,
            bootstrap,
            shutdown_tx: None,
        })
    }

    /// Whether the remote answered the startup connectivity check.
    pub fn mode(&self) -> MirrorMode {
        self.mode
    }

    /// Read port for the configured backend.
    pub fn reader(&self) -> Arc<dyn ReadPort> {
        Arc::clone(&self.reader)
    }

    /// Write port; rejects every command in offline mode.
    pub fn writer(&self) -> Arc<dyn WritePort> {
        Arc::clone(&self.writer)
    }

    pub fn notifier(&self) -> &ChangeNotifier {
        &self.notifier
    }

    pub fn gate(&self) -> &TableGate {
        &self.gate
    }

    pub fn store(&self) -> &StoreHandle {
        &self.store
    }

    /// Outcome of startup population. `None` in offline mode.
    pub fn bootstrap_report(&self) -> Option<&BootstrapReport> {
        self.bootstrap.as_ref()
    }

    pub fn refresh_metrics(&self) -> RefreshMetricsSnapshot {
        self.queue.metrics()
    }

    /// Current row count of every mirrored table. Tables that cannot be
    /// counted are left out.
    pub async fn row_counts(&self) -> Vec<(MirroredTable, u64)> {
        let mut counts = Vec::with_capacity(MirroredTable::ALL.len());
        for table in MirroredTable::ALL {
            match self.mirror.row_count(table).await {
                Ok(rows) => counts.push((table, rows)),
                Err(e) => tracing::warn!(table = %table, error = %e, "Row count failed"),
            }
        }
        counts
    }

    /// Raise the runtime's own shutdown signal, stop the worker within the
    /// grace period, then compact/delete and close the store as configured.
    pub async fn shutdown(self) {
        if let Some(tx) = &self.shutdown_tx {
            tx.send_replace(true);
        }
        let drained = self.queue.stop(self.config.shutdown_grace()).await;
        tracing::info!(drained, "Refresh queue stopped");
        self.store
            .shutdown(self.config.compact_on_exit, self.config.delete_on_exit)
            .await;
    }
}

impl std::fmt::Debug for MirrorRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MirrorRuntime")
            .field("mode", &self.mode)
            .field("store", &self.store)
            .field("queue", &self.queue)
            .finish_non_exhaustive()
    }
}
