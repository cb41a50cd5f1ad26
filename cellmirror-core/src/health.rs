//! Health check types for the remote connection
//!
//! The remote health check describes each attempt as a [`HealthCheck`]; startup
//! only cares whether it [is reachable](HealthCheck::is_reachable).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Health of one checked component.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Answered within the expected time
    Healthy,
    /// Answered, but slower than expected
    Degraded,
    /// Did not answer, or answered with an error
    Unhealthy,
}

/// Result of one check of one component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthCheck {
    /// Outcome of the check
    pub status: HealthStatus,
    /// Probed component, e.g. `remote_store`
    pub component: String,
    /// Failure or degradation detail
    pub message: Option<String>,
    /// Round trip in milliseconds, when measured
    pub response_time_ms: Option<i64>,
    /// Extra check parameters such as the timeout used
    pub metadata: Option<HashMap<String, serde_json::Value>>,
}

impl HealthCheck {
    /// A component that answered normally.
    pub fn healthy(component: impl Into<String>) -> Self {
        Self::with_status(HealthStatus::Healthy, component, None)
    }

    /// A component that answered, with a note on what was off.
    pub fn degraded(component: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with_status(HealthStatus::Degraded, component, Some(message.into()))
    }

    /// A component that could not be reached.
    pub fn unhealthy(component: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with_status(HealthStatus::Unhealthy, component, Some(message.into()))
    }

    fn with_status(status: HealthStatus, component: impl Into<String>, message: Option<String>) -> Self {
        Self {
            status,
            component: component.into(),
            message,
            response_time_ms: None,
            metadata: None,
        }
    }

    /// Record the measured round trip.
    pub fn with_response_time(mut self, ms: i64) -> Self {
        self.response_time_ms = Some(ms);
        self
    }

    /// Attach one metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata
            .get_or_insert_with(HashMap::new)
            .insert(key.into(), value);
        self
    }

    /// Healthy or degraded; either way the component answered.
    pub fn is_reachable(&self) -> bool {
        matches!(self.status, HealthStatus::Healthy | HealthStatus::Degraded)
    }
}
