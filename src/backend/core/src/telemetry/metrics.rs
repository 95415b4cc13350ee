//! Prometheus metrics for the job queues and the interval scheduler.
//!
//! - Processed/failed/retried counters per queue
//! - Pending depth gauge per queue
//! - Scheduler run counters per task
//! - Batch duration histogram
//!
//! # Example
//!
//! ```rust,no_run
//! use bazaar_core::telemetry::metrics::QueueMetrics;
//!
//! QueueMetrics::record_processed("image");
//! QueueMetrics::set_depths("image", 4, 0);
//! ```

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Instant;

/// Metrics configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    /// Whether metrics collection is enabled
    #[serde(default = "default_metrics_enabled")]
    pub enabled: bool,

    /// Histogram buckets for batch durations (in seconds)
    #[serde(default = "default_duration_buckets")]
    pub duration_buckets: Vec<f64>,

    /// Global labels to add to all metrics
    #[serde(default)]
    pub global_labels: HashMap<String, String>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_metrics_enabled(),
            duration_buckets: default_duration_buckets(),
            global_labels: HashMap::new(),
        }
    }
}

fn default_metrics_enabled() -> bool {
    true
}

fn default_duration_buckets() -> Vec<f64> {
    vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]
}

/// Handle to the installed Prometheus recorder.
///
/// Rendering a disabled registry yields an empty string.
#[derive(Clone, Default)]
pub struct MetricsRegistry {
    prometheus_handle: Option<PrometheusHandle>,
}

impl std::fmt::Debug for MetricsRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsRegistry")
            .field("prometheus_handle", &self.prometheus_handle.is_some())
            .finish()
    }
}

impl MetricsRegistry {
    /// A registry with no recorder attached.
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Whether a recorder is installed.
    pub fn is_enabled(&self) -> bool {
        self.prometheus_handle.is_some()
    }

    /// Render all metrics in Prometheus text format.
    pub fn render(&self) -> String {
        self.prometheus_handle
            .as_ref()
            .map(|h| h.render())
            .unwrap_or_default()
    }
}

/// Initialize the metrics subsystem.
///
/// Installs the global Prometheus recorder. Can only succeed once per
/// process.
pub fn init_metrics(config: &MetricsConfig, service_name: &str) -> anyhow::Result<MetricsRegistry> {
    if !config.enabled {
        return Ok(MetricsRegistry::disabled());
    }

    let mut builder = PrometheusBuilder::new();

    for (key, value) in &config.global_labels {
        builder = builder.add_global_label(key, value);
    }

    builder = builder.set_buckets(&config.duration_buckets)?;

    let handle = builder.install_recorder()?;

    register_metric_descriptions();

    tracing::info!(service_name = %service_name, "Metrics initialized");

    Ok(MetricsRegistry {
        prometheus_handle: Some(handle),
    })
}

fn register_metric_descriptions() {
    // Queue metrics
    describe_counter!(
        "bazaar_jobs_processed_total",
        "Jobs that reached their terminal success state"
    );
    describe_counter!(
        "bazaar_jobs_failed_total",
        "Jobs that exhausted their retries"
    );
    describe_counter!(
        "bazaar_jobs_retried_total",
        "Job failures that were re-enqueued for retry"
    );
    describe_counter!(
        "bazaar_jobs_evicted_total",
        "Completed jobs evicted by cleanup"
    );
    describe_gauge!("bazaar_queue_pending", "Jobs waiting in the pending queue");
    describe_gauge!(
        "bazaar_queue_completed",
        "Jobs held in the completed partition"
    );
    describe_histogram!(
        "bazaar_batch_duration_seconds",
        "Time spent processing one batch"
    );

    // Scheduler metrics
    describe_counter!(
        "bazaar_scheduler_runs_total",
        "Scheduled task executions"
    );
    describe_gauge!("bazaar_scheduler_tasks", "Registered scheduled tasks");

    // Errors
    describe_counter!("bazaar_errors_total", "Errors by code and category");
}

/// Metrics emitted by the work queues.
pub struct QueueMetrics;

impl QueueMetrics {
    /// A job reached processed/sent.
    pub fn record_processed(queue: &str) {
        counter!("bazaar_jobs_processed_total", "queue" => queue.to_string()).increment(1);
    }

    /// A job exhausted its retries.
    pub fn record_failed(queue: &str) {
        counter!("bazaar_jobs_failed_total", "queue" => queue.to_string()).increment(1);
    }

    /// A job failed and went back to pending.
    pub fn record_retried(queue: &str) {
        counter!("bazaar_jobs_retried_total", "queue" => queue.to_string()).increment(1);
    }

    /// Completed jobs dropped by cleanup.
    pub fn record_evicted(queue: &str, count: usize) {
        counter!("bazaar_jobs_evicted_total", "queue" => queue.to_string())
            .increment(count as u64);
    }

    /// Update depth gauges after a queue mutation.
    pub fn set_depths(queue: &str, pending: usize, completed: usize) {
        gauge!("bazaar_queue_pending", "queue" => queue.to_string()).set(pending as f64);
        gauge!("bazaar_queue_completed", "queue" => queue.to_string()).set(completed as f64);
    }

    /// Start timing a batch.
    pub fn start_batch(queue: &str) -> BatchTimer {
        BatchTimer {
            start: Instant::now(),
            queue: queue.to_string(),
        }
    }
}

/// Records batch duration when finished.
pub struct BatchTimer {
    start: Instant,
    queue: String,
}

impl BatchTimer {
    /// Finish timing and record the duration.
    pub fn finish(self) -> f64 {
        let elapsed = self.start.elapsed().as_secs_f64();
        histogram!("bazaar_batch_duration_seconds", "queue" => self.queue).record(elapsed);
        elapsed
    }
}

/// Metrics emitted by the interval scheduler.
pub struct SchedulerMetrics;

impl SchedulerMetrics {
    /// One run of a scheduled task finished.
    pub fn record_run(task_id: &str, success: bool) {
        counter!(
            "bazaar_scheduler_runs_total",
            "task" => task_id.to_string(),
            "success" => success.to_string(),
        )
        .increment(1);
    }

    /// Number of registered tasks.
    pub fn set_task_count(count: usize) {
        gauge!("bazaar_scheduler_tasks").set(count as f64);
    }
}
