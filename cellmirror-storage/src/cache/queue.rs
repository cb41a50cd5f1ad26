//! Refresh queue and its single background worker.
//!
//! Producers enqueue [`RefreshRequest`]s through cheap [`RefreshSender`]
//! clones. One worker drains the queue in FIFO order and refreshes the
//! tables of each request one after another.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use cellmirror_core::{QueueError, RefreshRequest};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use super::refresh::TableRefresher;
use crate::notify::{report_error, ErrorSink};

// ============================================================================
// METRICS
// ============================================================================

/// Refresh queue counters.
#[derive(Debug, Default)]
pub struct RefreshMetrics {
    /// Requests accepted by [`RefreshSender::enqueue`].
    pub requests_enqueued: AtomicU64,
    /// Requests the worker has finished, including partly failed ones.
    pub requests_processed: AtomicU64,
    /// Single-table refreshes that completed.
    pub tables_refreshed: AtomicU64,
    /// Single-table refreshes that failed and were reported.
    pub refresh_failures: AtomicU64,
}

impl RefreshMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Point-in-time copy of every counter.
    pub fn snapshot(&self) -> RefreshMetricsSnapshot {
        RefreshMetricsSnapshot {
            requests_enqueued: self.requests_enqueued.load(Ordering::Relaxed),
            requests_processed: self.requests_processed.load(Ordering::Relaxed),
            tables_refreshed: self.tables_refreshed.load(Ordering::Relaxed),
            refresh_failures: self.refresh_failures.load(Ordering::Relaxed),
        }
    }
}

/// Plain copy of [`RefreshMetrics`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshMetricsSnapshot {
    pub requests_enqueued: u64,
    pub requests_processed: u64,
    pub tables_refreshed: u64,
    pub refresh_failures: u64,
}

impl RefreshMetricsSnapshot {
    /// Requests enqueued but not yet fully processed.
    pub fn pending(&self) -> u64 {
        self.requests_enqueued.saturating_sub(self.requests_processed)
    }
}

// ============================================================================
// CHANNEL
// ============================================================================

/// Producer side of the refresh queue. Cheap to clone.
#[derive(Debug, Clone)]
pub struct RefreshSender {
    tx: mpsc::UnboundedSender<RefreshRequest>,
    closed: Arc<AtomicBool>,
    metrics: Arc<RefreshMetrics>,
}

impl RefreshSender {
    /// Enqueue without blocking. After the queue is stopped the request is
    /// dropped silently.
    pub fn enqueue(&self, request: RefreshRequest) {
        if self.closed.load(Ordering::Acquire) {
            tracing::debug!(source = %request.source(), "Refresh queue stopped; request ignored");
            return;
        }
        let id = request.id();
        match self.tx.send(request) {
            Ok(()) => {
                self.metrics.requests_enqueued.fetch_add(1, Ordering::Relaxed);
                tracing::trace!(request_id = %id, "Refresh request enqueued");
            }
            Err(_) => tracing::debug!(request_id = %id, "Refresh queue has no reader; request ignored"),
        }
    }

    /// True once the owning queue has been stopped.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn metrics(&self) -> RefreshMetricsSnapshot {
        self.metrics.snapshot()
    }
}

/// Consumer side of the refresh queue.
#[derive(Debug)]
pub struct RefreshReceiver {
    rx: mpsc::UnboundedReceiver<RefreshRequest>,
}

impl RefreshReceiver {
    /// Next request, or `None` once every sender is gone.
    pub async fn recv(&mut self) -> Option<RefreshRequest> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<RefreshRequest> {
        self.rx.try_recv().ok()
    }

    fn close(&mut self) {
        self.rx.close();
    }
}

/// A connected producer/consumer pair.
pub fn refresh_channel() -> (RefreshSender, RefreshReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        RefreshSender {
            tx,
            closed: Arc::new(AtomicBool::new(false)),
            metrics: Arc::new(RefreshMetrics::new()),
        },
        RefreshReceiver { rx },
    )
}

// ============================================================================
// QUEUE
// ============================================================================

/// Unbounded MPSC refresh queue drained by exactly one worker.
pub struct RefreshQueue {
    sender: RefreshSender,
    receiver: Mutex<Option<RefreshReceiver>>,
    refresher: TableRefresher,
    sink: Arc<dyn ErrorSink>,
    shutdown_tx: watch::Sender<bool>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl RefreshQueue {
    pub fn new(refresher: TableRefresher, sink: Arc<dyn ErrorSink>) -> Self {
        let (sender, receiver) = refresh_channel();
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            sender,
            receiver: Mutex::new(Some(receiver)),
            refresher,
            sink,
            shutdown_tx,
            worker: Mutex::new(None),
        }
    }

    /// Producer handle for notifiers.
    pub fn sender(&self) -> RefreshSender {
        self.sender.clone()
    }

    /// Shorthand for `self.sender().enqueue(request)`.
    pub fn enqueue(&self, request: RefreshRequest) {
        self.sender.enqueue(request);
    }

    pub fn metrics(&self) -> RefreshMetricsSnapshot {
        self.sender.metrics()
    }

    pub fn pending(&self) -> u64 {
        self.metrics().pending()
    }

    /// Worker spawned and not yet finished.
    pub fn is_running(&self) -> bool {
        lock(&self.worker)
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    /// Launch the worker. Only the first call succeeds.
    pub fn start(&self) -> Result<(), QueueError> {
        if self.sender.is_closed() {
            return Err(QueueError::Stopped);
        }
        let receiver = lock(&self.receiver).take().ok_or(QueueError::AlreadyStarted)?;

        let worker = RefreshWorker {
            receiver,
            refresher: self.refresher.clone(),
            sink: Arc::clone(&self.sink),
            metrics: Arc::clone(&self.sender.metrics),
            shutdown_rx: self.shutdown_tx.subscribe(),
        };
        *lock(&self.worker) = Some(tokio::spawn(worker.run()));
        tracing::info!("Refresh worker started");
        Ok(())
    }

    /// Stop accepting requests, signal the worker and wait up to `grace`
    /// for the in-flight refresh. Returns `true` if the worker finished in
    /// time; otherwise it is abandoned, not aborted.
    pub async fn stop(&self, grace: Duration) -> bool {
        self.sender.closed.store(true, Ordering::Release);
        self.shutdown_tx.send_replace(true);

        let Some(handle) = lock(&self.worker).take() else {
            tracing::debug!("Refresh queue stopped before worker start");
            return true;
        };

        match tokio::time::timeout(grace, handle).await {
            Ok(Ok(())) => {
                tracing::info!("Refresh worker stopped");
                true
            }
            Ok(Err(e)) => {
                tracing::error!(error = %e, "Refresh worker panicked");
                true
            }
            Err(_) => {
                tracing::warn!(grace_ms = grace.as_millis() as u64, "Refresh worker abandoned after grace period");
                false
            }
        }
    }
}

impl std::fmt::Debug for RefreshQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshQueue")
            .field("metrics", &self.metrics())
            .field("running", &self.is_running())
            .finish()
    }
}

// ============================================================================
// WORKER
// ============================================================================

struct RefreshWorker {
    receiver: RefreshReceiver,
    refresher: TableRefresher,
    sink: Arc<dyn ErrorSink>,
    metrics: Arc<RefreshMetrics>,
    shutdown_rx: watch::Receiver<bool>,
}

impl RefreshWorker {
    async fn run(mut self) {
        loop {
            let request = tokio::select! {
                biased;

                _ = self.shutdown_rx.wait_for(|stop| *stop) => break,

                next = self.receiver.recv() => match next {
                    Some(request) => request,
                    None => break,
                },
            };
            self.process(request).await;
        }

        self.receiver.close();
        let snapshot = self.metrics.snapshot();
        tracing::info!(
            requests_processed = snapshot.requests_processed,
            tables_refreshed = snapshot.tables_refreshed,
            refresh_failures = snapshot.refresh_failures,
            "Refresh worker exiting"
        );
    }

    async fn process(&mut self, request: RefreshRequest) {
        tracing::debug!(
            request_id = %request.id(),
            source = %request.source(),
            tables = request.tables().len(),
            "Processing refresh request"
        );

        for &table in request.tables() {
            if *self.shutdown_rx.borrow() {
                tracing::debug!(request_id = %request.id(), "Shutdown mid-request; remaining tables skipped");
                break;
            }
            match self.refresher.refresh_or_cancel(table, &mut self.shutdown_rx).await {
                Ok(Some(_)) => {
                    self.metrics.tables_refreshed.fetch_add(1, Ordering::Relaxed);
                }
                Ok(None) => break,
                Err(e) => {
                    self.metrics.refresh_failures.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(
                        table = %table,
                        source = %request.source(),
                        error = %e,
                        "Table refresh failed"
                    );
                    report_error(self.sink.as_ref(), "refresh_table", e);
                }
            }
        }

        self.metrics.requests_processed.fetch_add(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cellmirror_core::MirroredTable;

    #[test]
    fn test_channel_delivers_in_order() {
        let (tx, mut rx) = refresh_channel();
        let first = RefreshRequest::new(vec![MirroredTable::Cell], "first").unwrap();
        let second = RefreshRequest::new(vec![MirroredTable::Tla], "second").unwrap();
        tx.enqueue(first.clone());
        tx.clone().enqueue(second.clone());

        assert_eq!(rx.try_recv(), Some(first));
        assert_eq!(rx.try_recv(), Some(second));
        assert_eq!(rx.try_recv(), None);
        assert_eq!(tx.metrics().requests_enqueued, 2);
    }

    #[test]
    fn test_enqueue_after_close_is_ignored() {
        let (tx, mut rx) = refresh_channel();
        tx.closed.store(true, Ordering::Release);
        tx.enqueue(RefreshRequest::new(vec![MirroredTable::Cell], "late").unwrap());
        assert_eq!(rx.try_recv(), None);
        assert_eq!(tx.metrics().requests_enqueued, 0);
    }

    #[test]
    fn test_enqueue_without_reader_does_not_panic() {
        let (tx, rx) = refresh_channel();
        drop(rx);
        tx.enqueue(RefreshRequest::new(vec![MirroredTable::Cell], "orphan").unwrap());
        assert_eq!(tx.metrics().pending(), 0);
    }

    #[test]
    fn test_pending_saturates() {
        let snapshot = RefreshMetricsSnapshot {
            requests_enqueued: 1,
            requests_processed: 3,
            tables_refreshed: 0,
            refresh_failures: 0,
        };
        assert_eq!(snapshot.pending(), 0);
    }
}
