//! V1 API routes.

use axum::{
    routing::{get, post},
    Router,
};

use crate::api::{handlers, AppState};

/// V1 API prefix.
pub const V1_PREFIX: &str = "/api/v1";

/// Build the V1 API router.
///
/// All routes are mounted under `/api/v1/`.
///
/// # Endpoints
///
/// ## Jobs
/// - `GET /api/v1/jobs/status` - Counts for both queues and the scheduled tasks
/// - `GET /api/v1/jobs/images/:id` - Image job by ID
/// - `GET /api/v1/jobs/emails/:id` - Email job by ID
/// - `POST /api/v1/jobs/images/cleanup` - Evict completed image jobs now
/// - `POST /api/v1/jobs/emails/cleanup` - Evict completed email jobs now
///
/// ## Scheduler
/// - `GET /api/v1/scheduler/tasks` - List scheduled tasks
/// - `GET /api/v1/scheduler/tasks/:id` - Scheduled task by ID
pub fn v1_router() -> Router<AppState> {
    Router::new()
        // Job endpoints
        .route("/jobs/status", get(handlers::jobs_status))
        .route("/jobs/images/cleanup", post(handlers::cleanup_images))
        .route("/jobs/images/:id", get(handlers::get_image_job))
        .route("/jobs/emails/cleanup", post(handlers::cleanup_emails))
        .route("/jobs/emails/:id", get(handlers::get_email_job))
        // Scheduler endpoints
        .route("/scheduler/tasks", get(handlers::list_scheduled_tasks))
        .route("/scheduler/tasks/:id", get(handlers::get_scheduled_task))
}
