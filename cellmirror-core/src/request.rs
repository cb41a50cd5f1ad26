//! Refresh request envelope

use crate::{ChangeEvent, MirroredTable, Timestamp, ValidationError};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An ordered, non-empty list of tables to refresh plus a diagnostic tag.
///
/// Requests are consumed exactly once by the refresh worker and are never
/// persisted. Deserialization goes through the same non-empty check as
/// [`RefreshRequest::new`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawRefreshRequest")]
pub struct RefreshRequest {
    /// UUIDv7, so request ids sort by creation time in logs.
    id: Uuid,
    /// Tables in refresh order. Never empty.
    tables: Vec<MirroredTable>,
    /// Free-form tag naming what caused the request.
    source: String,
    created_at: Timestamp,
}

/// Unchecked wire shape of [`RefreshRequest`].
#[derive(Deserialize)]
struct RawRefreshRequest {
    id: Uuid,
    tables: Vec<MirroredTable>,
    source: String,
    created_at: Timestamp,
}

impl TryFrom<RawRefreshRequest> for RefreshRequest {
    type Error = ValidationError;

    fn try_from(raw: RawRefreshRequest) -> Result<Self, Self::Error> {
        if raw.tables.is_empty() {
            return Err(ValidationError::EmptyRefreshRequest { origin: raw.source });
        }
        Ok(Self {
            id: raw.id,
            tables: raw.tables,
            source: raw.source,
            created_at: raw.created_at,
        })
    }
}

impl RefreshRequest {
    /// Build a request. An empty table list is rejected.
    pub fn new(
        tables: Vec<MirroredTable>,
        source: impl Into<String>,
    ) -> Result<Self, ValidationError> {
        let source = source.into();
        if tables.is_empty() {
            return Err(ValidationError::EmptyRefreshRequest { origin: source });
        }
        Ok(Self {
            id: Uuid::now_v7(),
            tables,
            source,
            created_at: Utc::now(),
        })
    }

    /// Build the request implied by a change event via its cascade.
    pub fn for_event(event: &ChangeEvent) -> Self {
        Self {
            id: Uuid::now_v7(),
            tables: event.cascade().to_vec(),
            source: event.source_tag(),
            created_at: Utc::now(),
        }
    }

    /// Request id, time-ordered.
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn tables(&self) -> &[MirroredTable] {
        &self.tables
    }

    /// Diagnostic tag, e.g. `CellChanged(42)`.
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn created_at(&self) -> Timestamp {
        self.created_at
    }
}
