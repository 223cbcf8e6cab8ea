//! Error taxonomy.
//!
//! `PersonaError` is what the engine surfaces to callers. `CollectorError` is what a
//! collector hands back; it never escapes as a `PersonaError` and is instead folded
//! into the job's source outcome.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::ids::JobId;
use super::job::JobStatus;
use super::source::Source;

/// Classification of a collector failure.
///
/// - `Transient`: worth retrying (network, timeout, rate limit).
/// - `Permanent`: retrying cannot help (malformed target, bad credentials).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Transient,
    Permanent,
}

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{kind:?} collector error: {message}")]
pub struct CollectorError {
    pub kind: ErrorKind,
    pub message: String,
}

impl CollectorError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Transient,
            message: message.into(),
        }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Permanent,
            message: message.into(),
        }
    }

    pub fn is_permanent(&self) -> bool {
        self.kind == ErrorKind::Permanent
    }
}

#[derive(Debug, Error)]
pub enum PersonaError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("job not found: {0}")]
    NotFound(JobId),

    #[error("transient collector failure for {collector}: {message}")]
    TransientCollector { collector: Source, message: String },

    #[error("permanent collector failure for {collector}: {message}")]
    PermanentCollector { collector: Source, message: String },

    #[error("{dependency} unavailable: {message}")]
    DependencyUnavailable {
        dependency: &'static str,
        message: String,
    },

    #[error("job {job_id} cannot move from {from} to {to}")]
    InvalidTransition {
        job_id: JobId,
        from: JobStatus,
        to: JobStatus,
    },

    #[error("{0}")]
    Internal(String),
}

impl PersonaError {
    pub fn unavailable(dependency: &'static str, message: impl Into<String>) -> Self {
        Self::DependencyUnavailable {
            dependency,
            message: message.into(),
        }
    }

    /// Wraps a collector error with the source it came from.
    pub fn from_collector(collector: Source, err: CollectorError) -> Self {
        match err.kind {
            ErrorKind::Transient => Self::TransientCollector {
                collector,
                message: err.message,
            },
            ErrorKind::Permanent => Self::PermanentCollector {
                collector,
                message: err.message,
            },
        }
    }

    /// Stable name of the error class, used in API error bodies.
    pub fn kind_name(&self) -> &'static str {
        match self {
            PersonaError::Validation(_) => "ValidationError",
            PersonaError::NotFound(_) => "NotFoundError",
            PersonaError::TransientCollector { .. } => "TransientCollectorError",
            PersonaError::PermanentCollector { .. } => "PermanentCollectorError",
            PersonaError::DependencyUnavailable { .. } => "DependencyUnavailableError",
            PersonaError::InvalidTransition { .. } | PersonaError::Internal(_) => "InternalError",
        }
    }
}
