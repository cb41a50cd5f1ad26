//! Error channel notifications
//!
//! Failures never cross component boundaries as errors. They are reported as
//! one of two signals instead: the remote is unreachable (the caller should
//! switch to offline mode) or an operation failed unexpectedly.

use crate::{MirrorError, Timestamp};
use chrono::Utc;
use std::fmt;

/// One signal on the error channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MirrorNotification {
    /// The startup connectivity check could not reach the system of record.
    RemoteUnreachable {
        reason: String,
        at: Timestamp,
    },
    /// A single operation failed; the caller got an empty result or `false`.
    UnexpectedError {
        operation: String,
        error: MirrorError,
        at: Timestamp,
    },
}

impl MirrorNotification {
    /// Unreachable signal stamped with the current time.
    pub fn remote_unreachable(reason: impl Into<String>) -> Self {
        MirrorNotification::RemoteUnreachable {
            reason: reason.into(),
            at: Utc::now(),
        }
    }

    /// Failure of `operation`, stamped with the current time.
    pub fn unexpected(operation: impl Into<String>, error: impl Into<MirrorError>) -> Self {
        MirrorNotification::UnexpectedError {
            operation: operation.into(),
            error: error.into(),
            at: Utc::now(),
        }
    }

    pub fn is_remote_unreachable(&self) -> bool {
        matches!(self, MirrorNotification::RemoteUnreachable { .. })
    }

    /// Name of the failing operation, if this is an unexpected error.
    pub fn operation(&self) -> Option<&str> {
        match self {
            MirrorNotification::UnexpectedError { operation, .. } => Some(operation),
            MirrorNotification::RemoteUnreachable { .. } => None,
        }
    }

    /// When the notification was raised.
    pub fn at(&self) -> Timestamp {
        match self {
            MirrorNotification::RemoteUnreachable { at, .. }
            | MirrorNotification::UnexpectedError { at, .. } => *at,
        }
    }
}

impl fmt::Display for MirrorNotification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MirrorNotification::RemoteUnreachable { reason, .. } => {
                write!(f, "remote unreachable: {}", reason)
            }
            MirrorNotification::UnexpectedError {
                operation, error, ..
            } => write!(f, "unexpected error in {}: {}", operation, error),
        }
    }
}
