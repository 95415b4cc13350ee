//! Background job system for Bazaar.
//!
//! - **Work queue**: generic in-memory mailbox with retries and bounded cleanup
//! - **Image pipeline**: uploads listing images to blob storage
//! - **Email pipeline**: sends transactional email through the auth provider
//! - **Scheduler**: independently ticking interval tasks that drain the queues
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                              JobSystem                               │
//! ├──────────────────────────────────────────────────────────────────────┤
//! │  caller ──enqueue──▶ ┌────────────┐    ┌──────────────────────────┐  │
//! │                      │ ImageQueue │◀───│                          │  │
//! │                      └────────────┘    │   IntervalScheduler      │  │
//! │  caller ──enqueue──▶ ┌────────────┐    │   drain-images (10s)     │  │
//! │                      │ EmailQueue │◀───│   drain-email  (30s)     │  │
//! │                      └────────────┘    └──────────────────────────┘  │
//! │            │ process_batch                                           │
//! │            ▼                                                         │
//! │   BlobStorage / EmailService ──▶ completed ──▶ cleanup (evict)       │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! let system = Arc::new(JobSystem::from_config(&config)?);
//! system.start().await?;
//!
//! let queued = system.image_queue()?.enqueue_image("u1/cat.webp", bytes, None);
//! // hand queued.public_url back to the client right away
//!
//! system.shutdown().await;
//! ```

pub mod email;
pub mod image;
pub mod job;
pub mod queue;
pub mod scheduler;
pub mod system;

pub use email::{EmailJob, EmailJobView, EmailQueue, EmailType};
pub use image::{content_type_for, EnqueuedImage, ImageJob, ImageJobView, ImageQueue};
pub use job::{Job, JobHandler, JobState, JobStatus};
pub use queue::{QueueConfig, QueueStats, WorkQueue};
pub use scheduler::{task_fn, IntervalScheduler, ScheduledTaskInfo, TaskFn};
pub use system::{JobSystem, JobSystemStatus, EMAIL_DRAIN_TASK, IMAGE_DRAIN_TASK};
