//! Generic in-memory work queue with retries and bounded cleanup.
//!
//! One mutex guards both partitions and the cleanup timestamp. It is never
//! held across an `.await`: jobs are removed from `pending` under the lock,
//! then handled with the lock released.

use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::job::{Job, JobHandler, JobStatus};
use crate::config::JobsConfig;
use crate::telemetry::QueueMetrics;

/// Configuration for a work queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Retry limit for jobs enqueued with `max_retries == 0`
    pub default_max_retries: u32,
    /// Completed entries kept by the size-bound rule
    pub max_completed: usize,
    /// Minimum time between cleanup passes triggered by batches
    #[serde(with = "humantime_serde")]
    pub cleanup_interval: Duration,
    /// Completed entries older than this are evicted
    #[serde(with = "humantime_serde")]
    pub max_completed_age: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            default_max_retries: 3,
            max_completed: 100,
            cleanup_interval: Duration::from_secs(5 * 60),
            max_completed_age: Duration::from_secs(24 * 60 * 60),
        }
    }
}

impl From<&JobsConfig> for QueueConfig {
    fn from(config: &JobsConfig) -> Self {
        Self {
            default_max_retries: config.max_retries,
            max_completed: config.max_completed,
            cleanup_interval: config.cleanup_interval,
            max_completed_age: config.max_completed_age,
        }
    }
}

/// Point-in-time counts for a queue.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    /// Jobs waiting, including retries
    pub pending: usize,
    /// Pending jobs that have failed at least once
    pub retrying: usize,
    /// Jobs in the completed partition
    pub completed: usize,
    /// Completed jobs that succeeded
    pub succeeded: usize,
    /// Completed jobs that exhausted their retries
    pub failed: usize,
}

struct QueueInner<J> {
    pending: VecDeque<J>,
    completed: VecDeque<J>,
    last_cleanup: Instant,
}

/// A thread-safe mailbox of typed jobs.
///
/// `J` is the job kind; the handler performs its side effect.
pub struct WorkQueue<J: Job> {
    name: &'static str,
    config: QueueConfig,
    handler: Arc<dyn JobHandler<J>>,
    inner: Mutex<QueueInner<J>>,
}

impl<J: Job> std::fmt::Debug for WorkQueue<J> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkQueue")
            .field("name", &self.name)
            .field("config", &self.config)
            .finish()
    }
}

impl<J: Job> WorkQueue<J> {
    /// Create an empty queue. `name` labels logs and metrics.
    pub fn new(name: &'static str, config: QueueConfig, handler: Arc<dyn JobHandler<J>>) -> Self {
        Self {
            name,
            config,
            handler,
            inner: Mutex::new(QueueInner {
                pending: VecDeque::new(),
                completed: VecDeque::new(),
                last_cleanup: Instant::now(),
            }),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Append a job to pending and return its ID.
    ///
    /// Fills `created_at`, the `pending` status, the default retry limit and a
    /// UUID when the ID is empty. Colliding IDs are not rejected.
    pub fn enqueue(&self, mut job: J) -> String {
        job.state_mut()
            .prepare_for_enqueue(self.config.default_max_retries);
        let id = job.id().to_string();

        let (pending, completed) = {
            let mut inner = self.inner.lock();
            inner.pending.push_back(job);
            (inner.pending.len(), inner.completed.len())
        };

        QueueMetrics::set_depths(self.name, pending, completed);
        debug!(queue = self.name, job_id = %id, pending, "Job enqueued");
        id
    }

    pub fn has_pending(&self) -> bool {
        !self.inner.lock().pending.is_empty()
    }

    pub fn pending_count(&self) -> usize {
        self.inner.lock().pending.len()
    }

    pub fn completed_count(&self) -> usize {
        self.inner.lock().completed.len()
    }

    /// Look a job up in pending, then completed. Returns a copy.
    pub fn get_by_id(&self, id: &str) -> Option<J> {
        let inner = self.inner.lock();
        inner
            .pending
            .iter()
            .chain(inner.completed.iter())
            .find(|job| job.id() == id)
            .cloned()
    }

    pub fn stats(&self) -> QueueStats {
        let inner = self.inner.lock();
        let retrying = inner
            .pending
            .iter()
            .filter(|job| job.status() == JobStatus::Retry)
            .count();
        let failed = inner
            .completed
            .iter()
            .filter(|job| job.status() == JobStatus::Failed)
            .count();

        QueueStats {
            pending: inner.pending.len(),
            retrying,
            completed: inner.completed.len(),
            succeeded: inner.completed.len() - failed,
            failed,
        }
    }

    /// Dequeue up to `batch_size` jobs and handle them in order.
    ///
    /// Returns copies of the jobs that succeeded. Failures are recorded on
    /// the job and never fail the batch.
    pub async fn process_batch(&self, batch_size: usize) -> Vec<J> {
        let batch: Vec<J> = {
            let mut inner = self.inner.lock();
            let take = batch_size.min(inner.pending.len());
            inner.pending.drain(..take).collect()
        };

        if batch.is_empty() {
            self.cleanup_if_due();
            return Vec::new();
        }

        let timer = QueueMetrics::start_batch(self.name);
        let batch_len = batch.len();
        let mut succeeded = Vec::new();

        for mut job in batch {
            if !job.status().is_processable() {
                debug!(
                    queue = self.name,
                    job_id = %job.id(),
                    status = %job.status(),
                    "Skipping job that is not pending"
                );
                continue;
            }

            match self.handler.handle(&job).await {
                Ok(output) => {
                    job.complete(output);
                    QueueMetrics::record_processed(self.name);
                    debug!(queue = self.name, job_id = %job.id(), status = %job.status(), "Job completed");

                    succeeded.push(job.clone());
                    self.inner.lock().completed.push_back(job);
                }
                Err(error) => {
                    let message = error.to_string();
                    let exhausted = job.state_mut().record_failure(message.as_str());

                    if exhausted {
                        job.release_payload();
                        QueueMetrics::record_failed(self.name);
                        warn!(
                            queue = self.name,
                            job_id = %job.id(),
                            retries = job.state().retries,
                            error = %message,
                            "Job failed permanently"
                        );
                        self.inner.lock().completed.push_back(job);
                    } else {
                        QueueMetrics::record_retried(self.name);
                        info!(
                            queue = self.name,
                            job_id = %job.id(),
                            retries = job.state().retries,
                            max_retries = job.state().max_retries,
                            error = %message,
                            "Job failed, will retry"
                        );
                        self.inner.lock().pending.push_back(job);
                    }
                }
            }
        }

        self.cleanup_if_due();

        let elapsed = timer.finish();
        debug!(
            queue = self.name,
            batch = batch_len,
            succeeded = succeeded.len(),
            elapsed_secs = elapsed,
            "Batch processed"
        );

        succeeded
    }

    /// Run cleanup now, ignoring the cooldown. Returns the completed count
    /// afterwards.
    pub fn force_cleanup(&self) -> usize {
        let mut inner = self.inner.lock();
        self.cleanup_locked(&mut inner);
        inner.completed.len()
    }

    /// Copies of every pending job, in queue order.
    pub fn pending_snapshot(&self) -> Vec<J> {
        self.inner.lock().pending.iter().cloned().collect()
    }

    /// Append previously persisted jobs to pending without resetting them.
    pub fn restore_pending(&self, jobs: Vec<J>) -> usize {
        let count = jobs.len();
        let (pending, completed) = {
            let mut inner = self.inner.lock();
            inner.pending.extend(jobs);
            (inner.pending.len(), inner.completed.len())
        };
        QueueMetrics::set_depths(self.name, pending, completed);
        count
    }

    fn cleanup_if_due(&self) {
        let mut inner = self.inner.lock();
        if inner.last_cleanup.elapsed() >= self.config.cleanup_interval {
            self.cleanup_locked(&mut inner);
        } else {
            QueueMetrics::set_depths(self.name, inner.pending.len(), inner.completed.len());
        }
    }

    fn cleanup_locked(&self, inner: &mut QueueInner<J>) {
        let before = inner.completed.len();

        // Size bound: oldest entries go first
        if inner.completed.len() > self.config.max_completed {
            let excess = inner.completed.len() - self.config.max_completed;
            for mut job in inner.completed.drain(..excess) {
                job.release_payload();
            }
        }

        // Age bound: only entries with a terminal timestamp are eligible
        let max_age = chrono::Duration::from_std(self.config.max_completed_age)
            .unwrap_or_else(|_| chrono::Duration::days(365 * 100));
        let now = Utc::now();
        inner.completed.retain_mut(|job| {
            let expired = job
                .terminal_at()
                .is_some_and(|at| now.signed_duration_since(at) > max_age);
            if expired {
                job.release_payload();
            }
            !expired
        });

        inner.last_cleanup = Instant::now();

        let evicted = before - inner.completed.len();
        if evicted > 0 {
            QueueMetrics::record_evicted(self.name, evicted);
            info!(
                queue = self.name,
                evicted,
                remaining = inner.completed.len(),
                "Evicted completed jobs"
            );
        }
        QueueMetrics::set_depths(self.name, inner.pending.len(), inner.completed.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{BazaarError, Result};
    use crate::jobs::job::JobState;
    use async_trait::async_trait;
    use chrono::DateTime;

    #[derive(Debug, Clone)]
    struct TestJob {
        state: JobState,
        payload: Vec<u8>,
        fail: bool,
        done_at: Option<DateTime<Utc>>,
    }

    impl TestJob {
        fn new(id: &str, fail: bool) -> Self {
            Self {
                state: JobState::with_id(id),
                payload: vec![1, 2, 3],
                fail,
                done_at: None,
            }
        }
    }

    impl Job for TestJob {
        type Output = ();

        fn state(&self) -> &JobState {
            &self.state
        }

        fn state_mut(&mut self) -> &mut JobState {
            &mut self.state
        }

        fn complete(&mut self, _output: ()) {
            self.state.status = JobStatus::Processed;
            self.done_at = Some(Utc::now());
            self.release_payload();
        }

        fn release_payload(&mut self) {
            self.payload = Vec::new();
        }

        fn succeeded_at(&self) -> Option<DateTime<Utc>> {
            self.done_at
        }
    }

    struct FlakyHandler;

    #[async_trait]
    impl JobHandler<TestJob> for FlakyHandler {
        async fn handle(&self, job: &TestJob) -> Result<()> {
            if job.fail {
                Err(BazaarError::internal("boom"))
            } else {
                Ok(())
            }
        }
    }

    fn queue(config: QueueConfig) -> WorkQueue<TestJob> {
        WorkQueue::new("test", config, Arc::new(FlakyHandler))
    }

    #[test]
    fn test_enqueue_fills_defaults() {
        let queue = queue(QueueConfig::default());
        let id = queue.enqueue(TestJob::new("", false));

        assert!(!id.is_empty());
        assert!(queue.has_pending());
        assert_eq!(queue.pending_count(), 1);

        let job = queue.get_by_id(&id).unwrap();
        assert_eq!(job.state.max_retries, 3);
        assert_eq!(job.status(), JobStatus::Pending);
    }

    #[tokio::test]
    async fn test_batch_takes_fifo_prefix() {
        let queue = queue(QueueConfig::default());
        for id in ["a", "b", "c"] {
            queue.enqueue(TestJob::new(id, false));
        }

        let done = queue.process_batch(2).await;
        let ids: Vec<_> = done.iter().map(|j| j.id().to_string()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(queue.pending_count(), 1);
        assert_eq!(queue.completed_count(), 2);
        assert!(done.iter().all(|j| j.payload.is_empty()));
    }

    #[tokio::test]
    async fn test_failure_goes_to_back_of_queue() {
        let queue = queue(QueueConfig::default());
        queue.enqueue(TestJob::new("bad", true));
        queue.enqueue(TestJob::new("good", false));

        queue.process_batch(1).await;
        let order: Vec<_> = queue
            .pending_snapshot()
            .iter()
            .map(|j| j.id().to_string())
            .collect();
        assert_eq!(order, vec!["good", "bad"]);

        let stats = queue.stats();
        assert_eq!(stats.pending, 2);
        assert_eq!(stats.retrying, 1);
    }

    #[tokio::test]
    async fn test_exhausted_job_is_failed_and_released() {
        let queue = queue(QueueConfig::default());
        let mut job = TestJob::new("bad", true);
        job.state.max_retries = 1;
        queue.enqueue(job);

        let done = queue.process_batch(10).await;
        assert!(done.is_empty());

        let job = queue.get_by_id("bad").unwrap();
        assert_eq!(job.status(), JobStatus::Failed);
        assert!(job.payload.is_empty());
        assert_eq!(job.state.error.as_deref().map(|e| e.contains("boom")), Some(true));

        let stats = queue.stats();
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.succeeded, 0);
    }

    #[tokio::test]
    async fn test_terminal_job_in_pending_is_dropped() {
        let queue = queue(QueueConfig::default());
        let mut job = TestJob::new("stale", false);
        job.state.status = JobStatus::Sent;
        queue.restore_pending(vec![job]);

        let done = queue.process_batch(5).await;
        assert!(done.is_empty());
        assert_eq!(queue.pending_count(), 0);
        assert_eq!(queue.completed_count(), 0);
        assert!(queue.get_by_id("stale").is_none());
    }

    #[tokio::test]
    async fn test_cleanup_respects_cooldown() {
        let queue = queue(QueueConfig {
            max_completed: 1,
            ..Default::default()
        });
        for id in ["a", "b", "c"] {
            queue.enqueue(TestJob::new(id, false));
        }

        queue.process_batch(3).await;
        // Cooldown has not elapsed since construction
        assert_eq!(queue.completed_count(), 3);

        assert_eq!(queue.force_cleanup(), 1);
        assert!(queue.get_by_id("c").is_some());
    }

    #[tokio::test]
    async fn test_age_bound_eviction() {
        let queue = queue(QueueConfig {
            max_completed_age: Duration::from_millis(20),
            ..Default::default()
        });
        queue.enqueue(TestJob::new("old", false));
        queue.process_batch(1).await;

        tokio::time::sleep(Duration::from_millis(40)).await;
        queue.enqueue(TestJob::new("new", false));
        queue.process_batch(1).await;

        assert_eq!(queue.force_cleanup(), 1);
        assert!(queue.get_by_id("old").is_none());
        assert!(queue.get_by_id("new").is_some());
    }

    #[tokio::test]
    async fn test_batch_runs_cleanup_once_due() {
        let queue = queue(QueueConfig {
            max_completed: 1,
            cleanup_interval: Duration::ZERO,
            ..Default::default()
        });
        for id in ["a", "b"] {
            queue.enqueue(TestJob::new(id, false));
        }

        queue.process_batch(2).await;
        assert_eq!(queue.completed_count(), 1);
    }
}
