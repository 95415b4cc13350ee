//! Interval scheduler: named tasks that each tick on their own tokio task.
//!
//! Scheduling is fixed-delay: the next run is `interval` after the previous
//! run finished, so a slow run pushes later runs back instead of piling up.

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{BazaarError, Result};
use crate::telemetry::SchedulerMetrics;

/// Body of a scheduled task. Called once per tick.
pub type TaskFn = Arc<dyn Fn() -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// Wrap an async closure as a [`TaskFn`].
pub fn task_fn<F, Fut>(f: F) -> TaskFn
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    Arc::new(move || Box::pin(f()))
}

struct ScheduledTask {
    name: String,
    description: String,
    interval: Duration,
    last_run: Option<DateTime<Utc>>,
    next_run: DateTime<Utc>,
    running: bool,
    run_count: u64,
    cancel: CancellationToken,
}

impl ScheduledTask {
    fn info(&self, id: &str) -> ScheduledTaskInfo {
        ScheduledTaskInfo {
            id: id.to_string(),
            name: self.name.clone(),
            description: self.description.clone(),
            interval: self.interval,
            last_run: self.last_run,
            next_run: self.next_run,
            running: self.running,
            run_count: self.run_count,
        }
    }
}

/// Snapshot of a scheduled task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledTaskInfo {
    pub id: String,
    pub name: String,
    pub description: String,
    #[serde(with = "humantime_serde")]
    pub interval: Duration,
    pub last_run: Option<DateTime<Utc>>,
    pub next_run: DateTime<Utc>,
    pub running: bool,
    pub run_count: u64,
}

type Registry = Arc<RwLock<HashMap<String, ScheduledTask>>>;

/// Set of independently ticking tasks.
///
/// Must be used from within a tokio runtime; `add_job` spawns.
#[derive(Default)]
pub struct IntervalScheduler {
    tasks: Registry,
}

impl IntervalScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a task and start ticking it. The first run happens one
    /// `interval` from now.
    pub fn add_job(
        &self,
        id: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
        task: TaskFn,
        interval: Duration,
    ) -> Result<()> {
        let id = id.into();
        let cancel = CancellationToken::new();

        let count = {
            let mut tasks = self.tasks.write();
            if tasks.contains_key(&id) {
                return Err(BazaarError::duplicate_task(id));
            }

            tasks.insert(
                id.clone(),
                ScheduledTask {
                    name: name.into(),
                    description: description.into(),
                    interval,
                    last_run: None,
                    next_run: next_after(Utc::now(), interval),
                    running: false,
                    run_count: 0,
                    cancel: cancel.clone(),
                },
            );
            tasks.len()
        };

        SchedulerMetrics::set_task_count(count);
        info!(task_id = %id, interval = ?interval, "Scheduled task registered");

        tokio::spawn(run_task(self.tasks.clone(), id, task, interval, cancel));
        Ok(())
    }

    /// Cancel and unregister a task. An in-flight run is not interrupted.
    pub fn remove_job(&self, id: &str) -> Result<()> {
        let count = {
            let mut tasks = self.tasks.write();
            let task = tasks
                .remove(id)
                .ok_or_else(|| BazaarError::task_not_found(id))?;
            // Cancelled before the lock is released, so a runner that sees an
            // entry under this ID with its own token still live owns it.
            task.cancel.cancel();
            tasks.len()
        };

        SchedulerMetrics::set_task_count(count);
        info!(task_id = %id, "Scheduled task removed");
        Ok(())
    }

    pub fn get_job(&self, id: &str) -> Result<ScheduledTaskInfo> {
        self.tasks
            .read()
            .get(id)
            .map(|task| task.info(id))
            .ok_or_else(|| BazaarError::task_not_found(id))
    }

    /// Snapshots of every task, sorted by ID.
    pub fn get_jobs(&self) -> Vec<ScheduledTaskInfo> {
        let mut jobs: Vec<_> = self
            .tasks
            .read()
            .iter()
            .map(|(id, task)| task.info(id))
            .collect();
        jobs.sort_by(|a, b| a.id.cmp(&b.id));
        jobs
    }

    pub fn job_count(&self) -> usize {
        self.tasks.read().len()
    }

    /// Cancel every task. Returns immediately; in-flight runs finish on
    /// their own.
    pub fn shutdown(&self) {
        let cancelled = {
            let mut tasks = self.tasks.write();
            let count = tasks.len();
            for (id, task) in tasks.drain() {
                task.cancel.cancel();
                debug!(task_id = %id, "Scheduled task cancelled");
            }
            count
        };
        SchedulerMetrics::set_task_count(0);
        info!(tasks = cancelled, "Scheduler shut down");
    }
}

impl Drop for IntervalScheduler {
    fn drop(&mut self) {
        for task in self.tasks.read().values() {
            task.cancel.cancel();
        }
    }
}

fn next_after(from: DateTime<Utc>, interval: Duration) -> DateTime<Utc> {
    from + chrono::Duration::from_std(interval).unwrap_or_else(|_| chrono::Duration::days(365))
}

async fn run_task(
    tasks: Registry,
    id: String,
    task: TaskFn,
    interval: Duration,
    cancel: CancellationToken,
) {
    loop {
        let wait = {
            let tasks = tasks.read();
            match tasks.get(&id) {
                Some(entry) if !cancel.is_cancelled() => (entry.next_run - Utc::now())
                    .to_std()
                    .unwrap_or(Duration::ZERO),
                _ => return,
            }
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(task_id = %id, "Scheduled task runner stopped");
                return;
            }
            _ = tokio::time::sleep(wait) => {}
        }

        // The ID may have been removed and re-added while sleeping; checked
        // under the write lock since removal cancels under it
        match tasks.write().get_mut(&id) {
            Some(entry) if !cancel.is_cancelled() => entry.running = true,
            _ => return,
        }

        let result = task().await;
        let success = result.is_ok();
        if let Err(e) = result {
            warn!(task_id = %id, error = %e, "Scheduled task failed");
        }
        SchedulerMetrics::record_run(&id, success);

        let now = Utc::now();
        match tasks.write().get_mut(&id) {
            Some(entry) if !cancel.is_cancelled() => {
                entry.running = false;
                entry.run_count += 1;
                entry.last_run = Some(now);
                entry.next_run = next_after(now, interval);
            }
            _ => return,
        }
    }
}
