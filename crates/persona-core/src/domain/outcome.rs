//! Outcome model: what a collector run reports back.

use serde::{Deserialize, Serialize};

use super::errors::CollectorError;

/// Result of one collector attempt, as seen by the orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "outcome", content = "value")]
pub enum CollectorOutcome {
    /// Structured data produced by the collector.
    Succeeded(serde_json::Value),
    Failed(CollectorError),
}

impl CollectorOutcome {
    pub fn success(data: serde_json::Value) -> Self {
        Self::Succeeded(data)
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::Failed(CollectorError::transient(message))
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self::Failed(CollectorError::permanent(message))
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded(_))
    }
}

impl From<Result<serde_json::Value, CollectorError>> for CollectorOutcome {
    fn from(result: Result<serde_json::Value, CollectorError>) -> Self {
        match result {
            Ok(data) => Self::Succeeded(data),
            Err(err) => Self::Failed(err),
        }
    }
}

/// What `report_outcome` did with a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "disposition")]
pub enum ReportDisposition {
    /// Data stored, source marked succeeded.
    Recorded,
    /// Failure counted; the descriptor will be redelivered after `delay_secs`.
    Retrying { attempt: u32, delay_secs: u64 },
    /// Attempts used up; source marked failed.
    Exhausted,
    /// The source was already terminal. Nothing changed.
    Duplicate,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ErrorKind;

    #[test]
    fn result_converts_into_outcome() {
        let ok: CollectorOutcome = Ok(serde_json::json!({"title": "x"})).into();
        assert!(ok.is_success());

        let err: CollectorOutcome = Err(CollectorError::permanent("bad url")).into();
        match err {
            CollectorOutcome::Failed(e) => assert_eq!(e.kind, ErrorKind::Permanent),
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[test]
    fn disposition_is_tagged() {
        let json = serde_json::to_value(ReportDisposition::Retrying {
            attempt: 1,
            delay_secs: 30,
        })
        .unwrap();
        assert_eq!(json["disposition"], "retrying");
        assert_eq!(json["delay_secs"], 30);
    }
}
