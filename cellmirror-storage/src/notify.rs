//! Error channel sinks.
//!
//! Components never return failures to their callers; they hand a
//! [`MirrorNotification`] to an [`ErrorSink`] instead.
//!
//! Only the startup connectivity check raises "remote unreachable". Faults
//! of individual reads, writes and refreshes are always reported as
//! unexpected errors of the named operation, even when the cause is a lost
//! connection.

use std::sync::Arc;

use cellmirror_core::{MirrorError, MirrorNotification};
use tokio::sync::mpsc;

/// Receiver of the error channel.
///
/// Implementations must not block; `report` is called from inside reads and
/// from the refresh worker.
pub trait ErrorSink: Send + Sync {
    /// Deliver one notification.
    fn report(&self, notification: MirrorNotification);
}

/// Report `error` as an unexpected failure of `operation`.
pub fn report_error(sink: &dyn ErrorSink, operation: &str, error: MirrorError) {
    tracing::debug!(
        operation,
        remote = error.is_remote_connectivity(),
        error = %error,
        "Operation failed"
    );
    sink.report(MirrorNotification::unexpected(operation, error));
}

/// Writes notifications to the tracing subscriber.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingErrorSink;

impl ErrorSink for TracingErrorSink {
    fn report(&self, notification: MirrorNotification) {
        match &notification {
            MirrorNotification::RemoteUnreachable { reason, .. } => {
                tracing::warn!(reason = %reason, "Remote store unreachable");
            }
            MirrorNotification::UnexpectedError {
                operation, error, ..
            } => {
                tracing::error!(operation = %operation, error = %error, "Unexpected error");
            }
        }
    }
}

/// Forwards notifications to a channel, e.g. for a UI status line.
#[derive(Debug, Clone)]
pub struct ChannelErrorSink {
    tx: mpsc::UnboundedSender<MirrorNotification>,
}

impl ChannelErrorSink {
    /// A sink and the receiver its notifications arrive on. Reports after
    /// the receiver is dropped are discarded.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<MirrorNotification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl ErrorSink for ChannelErrorSink {
    fn report(&self, notification: MirrorNotification) {
        if self.tx.send(notification).is_err() {
            tracing::debug!("Error channel receiver dropped");
        }
    }
}

impl<S: ErrorSink + ?Sized> ErrorSink for Arc<S> {
    fn report(&self, notification: MirrorNotification) {
        (**self).report(notification)
    }
}
