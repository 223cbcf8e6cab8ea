//! Job record and status management.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::PersonaError;
use super::ids::JobId;
use super::inputs::JobInputs;
use super::source::Source;

/// Job status.
///
/// State transitions (forward only):
/// - Pending -> Processing
/// - Processing -> Completed
/// - Processing -> Failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Created, descriptors not all enqueued yet.
    Pending,
    /// Every expected source has a descriptor; collectors are running.
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    pub fn can_transition_to(self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Pending, JobStatus::Processing)
                | (JobStatus::Processing, JobStatus::Completed)
                | (JobStatus::Processing, JobStatus::Failed)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one expected source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceOutcome {
    Pending,
    Succeeded,
    Failed,
    /// Not collected because the source is disabled for this deployment.
    Skipped,
}

impl SourceOutcome {
    pub fn is_terminal(self) -> bool {
        !matches!(self, SourceOutcome::Pending)
    }
}

/// How many successes a job needs once every source is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "mode", content = "count")]
pub enum CompletionPolicy {
    /// At least `n` collected sources (clamped to the number of non-skipped sources).
    AtLeast(usize),
    /// Every non-skipped source must succeed.
    All,
}

impl Default for CompletionPolicy {
    fn default() -> Self {
        CompletionPolicy::AtLeast(1)
    }
}

impl CompletionPolicy {
    /// Successes required for a job whose non-skipped source count is `collectable`.
    /// Always at least one: a job that collected nothing cannot complete.
    pub fn required_successes(self, collectable: usize) -> usize {
        let required = match self {
            CompletionPolicy::AtLeast(n) => n.min(collectable),
            CompletionPolicy::All => collectable,
        };
        required.max(1)
    }
}

/// Job record.
///
/// Owned by the job store. The orchestrator loads it, mutates it through the methods
/// below while holding the job's lock, and saves it back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub status: JobStatus,
    pub inputs: JobInputs,

    /// Computed once at creation. Never recomputed from inputs.
    pub expected_sources: BTreeSet<Source>,
    pub source_outcomes: BTreeMap<Source, SourceOutcome>,

    /// Last failure message per source.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub source_errors: BTreeMap<Source, String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    pub fn new(
        id: JobId,
        inputs: JobInputs,
        expected_sources: BTreeSet<Source>,
        now: DateTime<Utc>,
    ) -> Self {
        let source_outcomes = expected_sources
            .iter()
            .map(|source| (*source, SourceOutcome::Pending))
            .collect();
        Self {
            id,
            status: JobStatus::Pending,
            inputs,
            expected_sources,
            source_outcomes,
            source_errors: BTreeMap::new(),
            failure_reason: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    pub fn outcome(&self, source: Source) -> Option<SourceOutcome> {
        self.source_outcomes.get(&source).copied()
    }

    /// Sources still waiting for a terminal outcome.
    pub fn pending_sources(&self) -> Vec<Source> {
        self.source_outcomes
            .iter()
            .filter(|(_, outcome)| !outcome.is_terminal())
            .map(|(source, _)| *source)
            .collect()
    }

    /// Records an outcome for an expected source.
    ///
    /// Returns `false` (and changes nothing) when the source already holds a
    /// terminal outcome: the first terminal report wins.
    pub fn record_outcome(
        &mut self,
        source: Source,
        outcome: SourceOutcome,
        now: DateTime<Utc>,
    ) -> bool {
        match self.source_outcomes.get_mut(&source) {
            Some(current) if !current.is_terminal() => {
                *current = outcome;
                self.updated_at = now;
                true
            }
            _ => false,
        }
    }

    pub fn record_error(&mut self, source: Source, message: impl Into<String>) {
        self.source_errors.insert(source, message.into());
    }

    pub fn transition(&mut self, next: JobStatus, now: DateTime<Utc>) -> Result<(), PersonaError> {
        if !self.status.can_transition_to(next) {
            return Err(PersonaError::InvalidTransition {
                job_id: self.id,
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        self.updated_at = now;
        if next.is_terminal() {
            self.completed_at = Some(now);
        }
        Ok(())
    }

    /// Decides the terminal status the job has earned, if any.
    ///
    /// `None` while any expected source is still pending.
    pub fn evaluate(&self, policy: CompletionPolicy) -> Option<JobStatus> {
        if self.source_outcomes.values().any(|o| !o.is_terminal()) {
            return None;
        }

        let succeeded = self.count(SourceOutcome::Succeeded);
        let collectable = self.source_outcomes.len() - self.count(SourceOutcome::Skipped);
        if succeeded >= policy.required_successes(collectable) {
            Some(JobStatus::Completed)
        } else {
            Some(JobStatus::Failed)
        }
    }

    /// Applies [`Job::evaluate`] to a processing job. Returns the new terminal status
    /// when a transition happened.
    pub fn settle(
        &mut self,
        policy: CompletionPolicy,
        now: DateTime<Utc>,
    ) -> Result<Option<JobStatus>, PersonaError> {
        if self.status != JobStatus::Processing {
            return Ok(None);
        }
        let Some(next) = self.evaluate(policy) else {
            return Ok(None);
        };
        if next == JobStatus::Failed {
            self.failure_reason = Some(self.describe_failure());
        }
        self.transition(next, now)?;
        Ok(Some(next))
    }

    /// Percentage of expected sources with a terminal outcome.
    pub fn progress(&self) -> u8 {
        if self.status.is_terminal() {
            return 100;
        }
        if self.source_outcomes.is_empty() {
            return 0;
        }
        let done = self
            .source_outcomes
            .values()
            .filter(|o| o.is_terminal())
            .count();
        ((done * 100) / self.source_outcomes.len()) as u8
    }

    fn count(&self, outcome: SourceOutcome) -> usize {
        self.source_outcomes
            .values()
            .filter(|o| **o == outcome)
            .count()
    }

    fn describe_failure(&self) -> String {
        let failed: Vec<&str> = self
            .source_outcomes
            .iter()
            .filter(|(_, o)| **o == SourceOutcome::Failed)
            .map(|(s, _)| s.as_str())
            .collect();
        if failed.is_empty() {
            "no source produced data".to_string()
        } else {
            format!("required sources failed: {}", failed.join(", "))
        }
    }
}

/// Collector output stored per `(job_id, source)`. A later successful attempt
/// overwrites an earlier one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobDataRecord {
    pub job_id: JobId,
    pub source: Source,
    pub data: serde_json::Value,
    pub collected_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rstest::rstest;
    use ulid::Ulid;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
    }

    fn job_with(sources: &[Source]) -> Job {
        let mut job = Job::new(
            JobId::from_ulid(Ulid::new()),
            JobInputs::new("https://example.com"),
            sources.iter().copied().collect(),
            now(),
        );
        job.transition(JobStatus::Processing, now()).unwrap();
        job
    }

    #[test]
    fn new_job_starts_pending_with_pending_sources() {
        let job = Job::new(
            JobId::from_ulid(Ulid::new()),
            JobInputs::new("https://example.com"),
            BTreeSet::from([Source::Website]),
            now(),
        );
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.outcome(Source::Website), Some(SourceOutcome::Pending));
        assert_eq!(job.progress(), 0);
    }

    #[rstest]
    #[case::skip_processing(JobStatus::Pending, JobStatus::Completed)]
    #[case::backward(JobStatus::Processing, JobStatus::Pending)]
    #[case::from_terminal(JobStatus::Completed, JobStatus::Failed)]
    #[case::self_loop(JobStatus::Processing, JobStatus::Processing)]
    fn illegal_transitions_are_rejected(#[case] from: JobStatus, #[case] to: JobStatus) {
        assert!(!from.can_transition_to(to));
    }

    #[test]
    fn transition_sets_completed_at_on_terminal() {
        let mut job = job_with(&[Source::Website]);
        assert!(job.completed_at.is_none());
        job.transition(JobStatus::Completed, now()).unwrap();
        assert_eq!(job.completed_at, Some(now()));
        assert!(job.transition(JobStatus::Failed, now()).is_err());
    }

    #[test]
    fn terminal_outcome_is_not_overwritten() {
        let mut job = job_with(&[Source::Reviews]);
        assert!(job.record_outcome(Source::Reviews, SourceOutcome::Failed, now()));
        assert!(!job.record_outcome(Source::Reviews, SourceOutcome::Succeeded, now()));
        assert_eq!(job.outcome(Source::Reviews), Some(SourceOutcome::Failed));
    }

    #[test]
    fn unexpected_source_is_ignored() {
        let mut job = job_with(&[Source::Website]);
        assert!(!job.record_outcome(Source::Reviews, SourceOutcome::Succeeded, now()));
        assert_eq!(job.outcome(Source::Reviews), None);
    }

    #[test]
    fn evaluate_waits_for_pending_sources() {
        let mut job = job_with(&[Source::Website, Source::Reviews]);
        job.record_outcome(Source::Website, SourceOutcome::Succeeded, now());
        assert_eq!(job.evaluate(CompletionPolicy::AtLeast(1)), None);
        assert_eq!(job.progress(), 50);
    }

    #[rstest]
    #[case::lenient(CompletionPolicy::AtLeast(1), JobStatus::Completed)]
    #[case::strict(CompletionPolicy::All, JobStatus::Failed)]
    #[case::two_of_two(CompletionPolicy::AtLeast(2), JobStatus::Failed)]
    fn partial_failure_depends_on_threshold(
        #[case] policy: CompletionPolicy,
        #[case] expected: JobStatus,
    ) {
        let mut job = job_with(&[Source::Website, Source::Reviews]);
        job.record_outcome(Source::Website, SourceOutcome::Succeeded, now());
        job.record_outcome(Source::Reviews, SourceOutcome::Failed, now());
        assert_eq!(job.evaluate(policy), Some(expected));
    }

    #[test]
    fn all_failed_is_failed_even_when_lenient() {
        let mut job = job_with(&[Source::Website]);
        job.record_outcome(Source::Website, SourceOutcome::Failed, now());
        assert_eq!(job.settle(CompletionPolicy::AtLeast(1), now()).unwrap(), Some(JobStatus::Failed));
        assert_eq!(
            job.failure_reason.as_deref(),
            Some("required sources failed: website")
        );
        assert_eq!(job.progress(), 100);
    }

    #[test]
    fn skipped_sources_do_not_count_against_all() {
        let mut job = job_with(&[Source::Website, Source::Social]);
        job.record_outcome(Source::Social, SourceOutcome::Skipped, now());
        job.record_outcome(Source::Website, SourceOutcome::Succeeded, now());
        assert_eq!(job.evaluate(CompletionPolicy::All), Some(JobStatus::Completed));
    }

    #[test]
    fn everything_skipped_fails() {
        let mut job = job_with(&[Source::Social]);
        job.record_outcome(Source::Social, SourceOutcome::Skipped, now());
        assert_eq!(job.evaluate(CompletionPolicy::AtLeast(1)), Some(JobStatus::Failed));
    }

    #[test]
    fn settle_ignores_pending_jobs() {
        let mut job = Job::new(
            JobId::from_ulid(Ulid::new()),
            JobInputs::new("https://example.com"),
            BTreeSet::from([Source::Website]),
            now(),
        );
        job.record_outcome(Source::Website, SourceOutcome::Succeeded, now());
        assert_eq!(job.settle(CompletionPolicy::AtLeast(1), now()).unwrap(), None);
        assert_eq!(job.status, JobStatus::Pending);
    }

    #[test]
    fn required_successes_is_clamped() {
        assert_eq!(CompletionPolicy::AtLeast(3).required_successes(2), 2);
        assert_eq!(CompletionPolicy::AtLeast(0).required_successes(2), 1);
        assert_eq!(CompletionPolicy::All.required_successes(0), 1);
    }
}
