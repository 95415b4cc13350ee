#![allow(clippy::result_large_err)]
//! # Bazaar Core
//!
//! Background job system of the Bazaar marketplace backend.
//!
//! ## Architecture
//!
//! - **Jobs**: generic work queue, image upload and email delivery pipelines,
//!   and the interval scheduler that drains them
//! - **Providers**: blob storage and transactional email clients
//! - **API**: HTTP status endpoints for operators
//! - **Telemetry**: structured logging and Prometheus metrics

pub mod api;
pub mod config;
pub mod error;
pub mod jobs;
pub mod providers;
pub mod telemetry;

pub use error::{BazaarError, ErrorCode, ErrorDetails, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::error::{BazaarError, ErrorCode, Result};
    pub use crate::jobs::{
        EmailJob, EmailQueue, EmailType, ImageJob, ImageQueue, IntervalScheduler, JobStatus,
        JobSystem, QueueStats, WorkQueue,
    };
    pub use crate::providers::{BlobStorage, EmailService};
}
