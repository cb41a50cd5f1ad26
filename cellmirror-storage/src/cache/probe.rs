//! Remote connectivity probe.

use std::sync::Arc;
use std::time::{Duration, Instant};

use cellmirror_core::{HealthCheck, MirrorNotification, RemoteError};

use crate::notify::ErrorSink;
use crate::remote::RemoteStore;

const COMPONENT: &str = "remote_store";

/// Decides at startup whether the system of record can be reached.
///
/// Every failure counts as unreachable; timeouts, refused connections and
/// query errors are not told apart.
#[derive(Clone)]
pub struct RemoteHealthProbe {
    remote: Arc<dyn RemoteStore>,
    sink: Arc<dyn ErrorSink>,
    timeout: Duration,
}

impl RemoteHealthProbe {
    /// Probe `remote`, giving up after `timeout`. A reachable remote slower
    /// than half the timeout is reported as degraded.
    pub fn new(remote: Arc<dyn RemoteStore>, sink: Arc<dyn ErrorSink>, timeout: Duration) -> Self {
        Self {
            remote,
            sink,
            timeout,
        }
    }

    /// Probe once. On failure reports "remote unreachable" and returns
    /// `false`.
    pub async fn test_connectivity(&self) -> bool {
        let check = self.check().await;
        if check.is_reachable() {
            return true;
        }
        let reason = check
            .message
            .unwrap_or_else(|| "remote store unreachable".to_string());
        tracing::warn!(reason = %reason, "Remote connectivity test failed");
        self.sink.report(MirrorNotification::remote_unreachable(reason));
        false
    }

    /// Probe once and describe the result. Does not report.
    pub async fn check(&self) -> HealthCheck {
        let started = Instant::now();
        let outcome = tokio::time::timeout(self.timeout, self.remote.ping()).await;
        let elapsed_ms = started.elapsed().as_millis() as i64;
        let timeout_ms = self.timeout.as_millis() as u64;

        let check = match outcome {
            Ok(Ok(())) if elapsed_ms as u64 > timeout_ms / 2 => {
                HealthCheck::degraded(COMPONENT, "slow round trip")
            }
            Ok(Ok(())) => HealthCheck::healthy(COMPONENT),
            Ok(Err(e)) => HealthCheck::unhealthy(COMPONENT, e.to_string()),
            Err(_) => HealthCheck::unhealthy(COMPONENT, RemoteError::Timeout { timeout_ms }.to_string()),
        };
        check
            .with_response_time(elapsed_ms)
            .with_metadata("timeout_ms", timeout_ms.into())
    }
}
