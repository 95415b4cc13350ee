//! API request handlers.
//!
//! Handlers return `Result<impl IntoResponse, BazaarError>` so lookups that
//! miss and disabled pipelines map to 404 and 503 through the error type.

use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};

use super::{ApiResponse, AppState};
use crate::error::BazaarError;
use crate::jobs::{EmailJobView, ImageJobView};

// ═══════════════════════════════════════════════════════════════════════════════
// Health Check
// ═══════════════════════════════════════════════════════════════════════════════

pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "pipelines": {
            "image": state.jobs.image_queue().is_ok(),
            "email": state.jobs.email_queue().is_ok(),
        },
        "scheduled_tasks": state.jobs.scheduler().job_count(),
    }))
}

pub async fn prometheus_metrics(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(axum::http::header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        state.metrics.render(),
    )
}

// ═══════════════════════════════════════════════════════════════════════════════
// Job Handlers
// ═══════════════════════════════════════════════════════════════════════════════

pub async fn jobs_status(State(state): State<AppState>) -> impl IntoResponse {
    Json(ApiResponse::success(state.jobs.status()))
}

pub async fn get_image_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, BazaarError> {
    let job = state
        .jobs
        .image_queue()?
        .get_by_id(&id)
        .ok_or_else(|| BazaarError::job_not_found("image", &id))?;

    Ok(Json(ApiResponse::success(ImageJobView::from(&job))))
}

pub async fn get_email_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, BazaarError> {
    let job = state
        .jobs
        .email_queue()?
        .get_by_id(&id)
        .ok_or_else(|| BazaarError::job_not_found("email", &id))?;

    Ok(Json(ApiResponse::success(EmailJobView::from(&job))))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CleanupResponse {
    pub queue: String,
    /// Completed entries left after eviction
    pub completed: usize,
}

pub async fn cleanup_images(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, BazaarError> {
    let completed = state.jobs.image_queue()?.force_cleanup();
    tracing::info!(queue = "image", completed, "Forced cleanup");

    Ok(Json(ApiResponse::success(CleanupResponse {
        queue: "image".to_string(),
        completed,
    })))
}

pub async fn cleanup_emails(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, BazaarError> {
    let completed = state.jobs.email_queue()?.force_cleanup();
    tracing::info!(queue = "email", completed, "Forced cleanup");

    Ok(Json(ApiResponse::success(CleanupResponse {
        queue: "email".to_string(),
        completed,
    })))
}

// ═══════════════════════════════════════════════════════════════════════════════
// Scheduler Handlers
// ═══════════════════════════════════════════════════════════════════════════════

pub async fn list_scheduled_tasks(State(state): State<AppState>) -> impl IntoResponse {
    Json(ApiResponse::success(state.jobs.scheduler().get_jobs()))
}

pub async fn get_scheduled_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, BazaarError> {
    let task = state.jobs.scheduler().get_job(&id)?;
    Ok(Json(ApiResponse::success(task)))
}
