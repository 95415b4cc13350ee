//! The job system context: both queues plus the scheduler that drains them.
//!
//! Built once in `main` before the server accepts traffic and shared through
//! `Arc`. A queue whose provider is not configured is simply absent, and its
//! accessor reports `QueueNotInitialized`.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};

use super::email::EmailQueue;
use super::image::ImageQueue;
use super::queue::{QueueConfig, QueueStats};
use super::scheduler::{task_fn, IntervalScheduler, ScheduledTaskInfo};
use crate::config::{Config, JobsConfig};
use crate::error::{BazaarError, Result};
use crate::providers::{BlobStorage, EmailService, SupabaseAuthEmailService, SupabaseStorage};

/// Scheduler ID of the email drain.
pub const EMAIL_DRAIN_TASK: &str = "drain-email";
/// Scheduler ID of the image drain.
pub const IMAGE_DRAIN_TASK: &str = "drain-images";

/// Counts for both queues and the scheduled tasks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSystemStatus {
    /// `None` when the image pipeline is disabled
    pub image: Option<QueueStats>,
    /// `None` when the email pipeline is disabled
    pub email: Option<QueueStats>,
    pub scheduler: Vec<ScheduledTaskInfo>,
}

pub struct JobSystem {
    config: JobsConfig,
    image_queue: Option<Arc<ImageQueue>>,
    email_queue: Option<Arc<EmailQueue>>,
    scheduler: Arc<IntervalScheduler>,
}

impl JobSystem {
    /// Build the queues for the providers that are present.
    pub fn new(
        config: &Config,
        storage: Option<Arc<dyn BlobStorage>>,
        email: Option<Arc<dyn EmailService>>,
    ) -> Self {
        let queue_config = QueueConfig::from(&config.jobs);

        let image_queue = storage.map(|storage| {
            Arc::new(ImageQueue::new(
                queue_config.clone(),
                storage,
                config.storage.bucket.clone(),
                config.storage.resolved_public_base(),
            ))
        });
        let email_queue = email.map(|service| Arc::new(EmailQueue::new(queue_config, service)));

        Self {
            config: config.jobs.clone(),
            image_queue,
            email_queue,
            scheduler: Arc::new(IntervalScheduler::new()),
        }
    }

    /// Build with the Supabase clients for every provider section that is
    /// configured.
    pub fn from_config(config: &Config) -> Result<Self> {
        let storage: Option<Arc<dyn BlobStorage>> = if config.storage.is_configured() {
            Some(Arc::new(SupabaseStorage::from_config(&config.storage)?))
        } else {
            warn!("Storage provider not configured, image pipeline disabled");
            None
        };

        let email: Option<Arc<dyn EmailService>> = if config.email.is_configured() {
            Some(Arc::new(SupabaseAuthEmailService::from_config(&config.email)?))
        } else {
            warn!("Auth provider not configured, email pipeline disabled");
            None
        };

        Ok(Self::new(config, storage, email))
    }

    pub fn image_queue(&self) -> Result<&Arc<ImageQueue>> {
        self.image_queue
            .as_ref()
            .ok_or_else(|| BazaarError::queue_not_initialized("image"))
    }

    pub fn email_queue(&self) -> Result<&Arc<EmailQueue>> {
        self.email_queue
            .as_ref()
            .ok_or_else(|| BazaarError::queue_not_initialized("email"))
    }

    pub fn scheduler(&self) -> &Arc<IntervalScheduler> {
        &self.scheduler
    }

    pub fn status(&self) -> JobSystemStatus {
        JobSystemStatus {
            image: self.image_queue.as_ref().map(|q| q.stats()),
            email: self.email_queue.as_ref().map(|q| q.stats()),
            scheduler: self.scheduler.get_jobs(),
        }
    }

    /// Restore the image snapshot and register the drain tasks.
    ///
    /// Snapshot failures are logged; only scheduler registration errors are
    /// returned.
    pub async fn start(&self) -> Result<()> {
        if let Some(queue) = &self.email_queue {
            let queue = queue.clone();
            let batch_size = self.config.email_batch_size;
            self.scheduler.add_job(
                EMAIL_DRAIN_TASK,
                "Email delivery",
                "Sends pending emails through the auth provider",
                task_fn(move || {
                    let queue = queue.clone();
                    async move {
                        if queue.has_pending() {
                            queue.process_batch(batch_size).await;
                        }
                        Ok(())
                    }
                }),
                self.config.email_interval,
            )?;
        }

        if let Some(queue) = &self.image_queue {
            match queue.restore_from_disk(&self.config.snapshot_path).await {
                Ok(0) => {}
                Ok(restored) => info!(restored, "Image queue restored from snapshot"),
                Err(e) => error!(
                    path = %self.config.snapshot_path.display(),
                    error = %e,
                    "Failed to restore image queue snapshot"
                ),
            }

            let queue = queue.clone();
            let batch_size = self.config.image_batch_size;
            self.scheduler.add_job(
                IMAGE_DRAIN_TASK,
                "Image uploads",
                "Uploads pending listing images to blob storage",
                task_fn(move || {
                    let queue = queue.clone();
                    async move {
                        if queue.has_pending() {
                            queue.process_batch(batch_size).await;
                        }
                        Ok(())
                    }
                }),
                self.config.image_interval,
            )?;
        }

        info!(
            image = self.image_queue.is_some(),
            email = self.email_queue.is_some(),
            tasks = self.scheduler.job_count(),
            "Job system started"
        );
        Ok(())
    }

    /// Stop the drains and persist pending image jobs.
    pub async fn shutdown(&self) {
        self.scheduler.shutdown();

        if let Some(queue) = &self.image_queue {
            match queue.persist_to_disk(&self.config.snapshot_path).await {
                Ok(0) => {}
                Ok(written) => info!(written, "Image queue snapshot written"),
                Err(e) => error!(
                    path = %self.config.snapshot_path.display(),
                    error = %e,
                    "Failed to persist image queue snapshot"
                ),
            }
        }

        info!("Job system shut down");
    }
}
