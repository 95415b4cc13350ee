//! Job definitions and traits.
//!
//! - **JobStatus**: lifecycle of a queued job
//! - **JobState**: bookkeeping shared by every job kind (id, retries, timestamps)
//! - **Job**: trait the work queue is generic over
//! - **JobHandler**: the side effect a queue performs for each job

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::error::Result;

// ═══════════════════════════════════════════════════════════════════════════════
// Job Status
// ═══════════════════════════════════════════════════════════════════════════════

/// Status of a queued job.
///
/// Moves forward only: `pending` and `retry` may repeat, the other three are
/// terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Waiting for its first attempt
    #[default]
    Pending,
    /// Failed at least once and waiting at the back of the queue
    Retry,
    /// Image uploaded
    Processed,
    /// Email handed to the provider
    Sent,
    /// Retries exhausted
    Failed,
}

impl JobStatus {
    /// Check if the job is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Processed | Self::Sent | Self::Failed)
    }

    /// Check if a batch may attempt this job.
    pub fn is_processable(&self) -> bool {
        matches!(self, Self::Pending | Self::Retry)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Retry => write!(f, "retry"),
            Self::Processed => write!(f, "processed"),
            Self::Sent => write!(f, "sent"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Job State
// ═══════════════════════════════════════════════════════════════════════════════

/// Bookkeeping common to image and email jobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobState {
    /// Unique within the queue's lifetime. Generated at enqueue when empty.
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub status: JobStatus,
    #[serde(default)]
    pub retries: u32,
    /// Zero means "use the queue default"
    #[serde(default)]
    pub max_retries: u32,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_at: Option<DateTime<Utc>>,
    /// Last failure message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Default for JobState {
    fn default() -> Self {
        Self {
            id: String::new(),
            status: JobStatus::Pending,
            retries: 0,
            max_retries: 0,
            created_at: Utc::now(),
            failed_at: None,
            error: None,
        }
    }
}

impl JobState {
    /// Create state with a caller-chosen ID.
    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    /// Set a per-job retry limit.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Fill the defaults applied at enqueue time.
    pub(crate) fn prepare_for_enqueue(&mut self, default_max_retries: u32) {
        if self.id.is_empty() {
            self.id = Uuid::new_v4().to_string();
        }
        if self.max_retries == 0 {
            self.max_retries = default_max_retries;
        }
        self.created_at = Utc::now();
        self.status = JobStatus::Pending;
    }

    /// Record a failed attempt. Returns true when the retry budget is spent,
    /// in which case the state is already `failed`.
    pub(crate) fn record_failure(&mut self, error: impl Into<String>) -> bool {
        self.retries += 1;
        self.error = Some(error.into());

        if self.retries >= self.max_retries {
            self.status = JobStatus::Failed;
            self.failed_at = Some(Utc::now());
            true
        } else {
            self.status = JobStatus::Retry;
            false
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Job Trait
// ═══════════════════════════════════════════════════════════════════════════════

/// A job kind that can live in a [`WorkQueue`](super::WorkQueue).
pub trait Job: Clone + Send + Sync + 'static {
    /// What the handler produces on success.
    type Output: Send;

    fn state(&self) -> &JobState;

    fn state_mut(&mut self) -> &mut JobState;

    /// Apply a successful attempt: terminal status, success timestamp, the
    /// handler's result, and payload release.
    fn complete(&mut self, output: Self::Output);

    /// Drop the payload held by the job. Called on every terminal transition
    /// and again before eviction.
    fn release_payload(&mut self);

    /// `processed_at` / `sent_at`, set only on success.
    fn succeeded_at(&self) -> Option<DateTime<Utc>>;

    /// The timestamp the age-bound cleanup rule looks at.
    fn terminal_at(&self) -> Option<DateTime<Utc>> {
        self.succeeded_at().or(self.state().failed_at)
    }

    fn id(&self) -> &str {
        &self.state().id
    }

    fn status(&self) -> JobStatus {
        self.state().status
    }
}

/// The side effect a queue performs for each dequeued job.
///
/// Called with no queue lock held.
#[async_trait]
pub trait JobHandler<J: Job>: Send + Sync {
    async fn handle(&self, job: &J) -> Result<J::Output>;
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_terminal() {
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Retry.is_terminal());
        assert!(JobStatus::Processed.is_terminal());
        assert!(JobStatus::Sent.is_terminal());
        assert!(JobStatus::Failed.is_terminal());

        assert!(JobStatus::Retry.is_processable());
        assert!(!JobStatus::Sent.is_processable());
    }

    #[test]
    fn test_status_serialization() {
        assert_eq!(serde_json::to_string(&JobStatus::Retry).unwrap(), "\"retry\"");
        assert_eq!(JobStatus::Processed.to_string(), "processed");
    }

    #[test]
    fn test_prepare_fills_defaults() {
        let mut state = JobState::default();
        state.prepare_for_enqueue(3);
        assert_eq!(state.max_retries, 3);
        assert!(Uuid::parse_str(&state.id).is_ok());
        assert_eq!(state.status, JobStatus::Pending);

        let mut state = JobState::with_id("fixed").with_max_retries(7);
        state.prepare_for_enqueue(3);
        assert_eq!(state.id, "fixed");
        assert_eq!(state.max_retries, 7);
    }

    #[test]
    fn test_record_failure_until_exhausted() {
        let mut state = JobState::with_id("a").with_max_retries(2);

        assert!(!state.record_failure("timeout"));
        assert_eq!(state.status, JobStatus::Retry);
        assert_eq!(state.retries, 1);
        assert!(state.failed_at.is_none());

        assert!(state.record_failure("timeout again"));
        assert_eq!(state.status, JobStatus::Failed);
        assert_eq!(state.error.as_deref(), Some("timeout again"));
        assert!(state.failed_at.is_some());
    }
}
