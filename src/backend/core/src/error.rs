//! Error type shared by the job system, the provider clients and the API.
//!
//! Every error carries an [`ErrorCode`] that fixes its HTTP status, numeric
//! code and category. The message shown to API callers is kept apart from
//! the internal message that only reaches the logs.
//!
//! Per-job failures never surface here as `Err` to the caller: the queue
//! stores `error.to_string()` on the job and moves on.
//!
//! ```rust,ignore
//! let queue = jobs.image_queue()?; // QueueNotInitialized -> 503
//! let job = queue
//!     .get_by_id(&id)
//!     .ok_or_else(|| BazaarError::job_not_found("image", &id))?; // 404
//! ```

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use metrics::counter;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;
use tracing::{debug, error, warn};

// ═══════════════════════════════════════════════════════════════════════════════
// Result Type Alias
// ═══════════════════════════════════════════════════════════════════════════════

/// A specialized Result type for Bazaar operations.
pub type Result<T> = std::result::Result<T, BazaarError>;

// ═══════════════════════════════════════════════════════════════════════════════
// Error Codes
// ═══════════════════════════════════════════════════════════════════════════════

/// Machine-readable error codes, serialized as `SCREAMING_SNAKE_CASE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Queue Errors (1000-1099)
    JobNotFound,
    QueueNotInitialized,

    // Scheduler Errors (1100-1199)
    TaskNotFound,
    DuplicateTask,

    // Persistence Errors (2000-2099)
    PersistenceError,
    SnapshotNotFound,

    // Serialization Errors (2200-2299)
    SerializationError,
    DeserializationError,

    // External Service Errors (3000-3099)
    StorageUploadFailed,
    EmailSendFailed,
    ProviderRateLimited,
    ProviderTimeout,
    ProviderUnavailable,
    ExternalServiceError,
    NetworkError,

    // Configuration Errors (5000-5099)
    ConfigurationError,
    MissingConfiguration,
    InvalidConfiguration,

    // Internal Errors (9000-9099)
    InternalError,
    NotImplemented,
}

impl ErrorCode {
    /// Stable numeric code; the thousands digit groups the category.
    pub const fn numeric_code(&self) -> u32 {
        match self {
            Self::JobNotFound => 1000,
            Self::QueueNotInitialized => 1001,

            Self::TaskNotFound => 1100,
            Self::DuplicateTask => 1101,

            Self::PersistenceError => 2000,
            Self::SnapshotNotFound => 2001,

            Self::SerializationError => 2200,
            Self::DeserializationError => 2201,

            Self::StorageUploadFailed => 3000,
            Self::EmailSendFailed => 3001,
            Self::ProviderRateLimited => 3002,
            Self::ProviderTimeout => 3003,
            Self::ProviderUnavailable => 3004,
            Self::ExternalServiceError => 3005,
            Self::NetworkError => 3006,

            Self::ConfigurationError => 5000,
            Self::MissingConfiguration => 5001,
            Self::InvalidConfiguration => 5002,

            Self::InternalError => 9000,
            Self::NotImplemented => 9001,
        }
    }

    pub const fn http_status(&self) -> StatusCode {
        match self {
            // Not Found (404)
            Self::JobNotFound | Self::TaskNotFound | Self::SnapshotNotFound => {
                StatusCode::NOT_FOUND
            }

            // Conflict (409)
            Self::DuplicateTask => StatusCode::CONFLICT,

            // Too Many Requests (429)
            Self::ProviderRateLimited => StatusCode::TOO_MANY_REQUESTS,

            // Timeout (504)
            Self::ProviderTimeout => StatusCode::GATEWAY_TIMEOUT,

            // Service Unavailable (503)
            Self::QueueNotInitialized
            | Self::ProviderUnavailable
            | Self::ExternalServiceError => StatusCode::SERVICE_UNAVAILABLE,

            // Bad Gateway (502)
            Self::StorageUploadFailed | Self::EmailSendFailed | Self::NetworkError => {
                StatusCode::BAD_GATEWAY
            }

            // Not Implemented (501)
            Self::NotImplemented => StatusCode::NOT_IMPLEMENTED,

            // Internal Server Error (500)
            Self::PersistenceError
            | Self::SerializationError
            | Self::DeserializationError
            | Self::ConfigurationError
            | Self::MissingConfiguration
            | Self::InvalidConfiguration
            | Self::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Provider failures that a later attempt may get past.
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::StorageUploadFailed
                | Self::EmailSendFailed
                | Self::ProviderRateLimited
                | Self::ProviderTimeout
                | Self::ProviderUnavailable
                | Self::ExternalServiceError
                | Self::NetworkError
        )
    }

    /// Label used for the `bazaar_errors_total` metric and log levels.
    pub const fn category(&self) -> &'static str {
        match self.numeric_code() {
            1000..=1099 => "queue",
            1100..=1199 => "scheduler",
            2000..=2099 => "persistence",
            2200..=2299 => "serialization",
            3000..=3099 => "external_service",
            5000..=5099 => "configuration",
            9000..=9099 => "internal",
            _ => "unknown",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Error Details
// ═══════════════════════════════════════════════════════════════════════════════

/// Structured details attached to an error and echoed in the response body.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorDetails {
    /// Kind of the entity involved (job, task, queue, file)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_type: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,

    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub context: HashMap<String, serde_json::Value>,
}

impl ErrorDetails {
    pub fn entity(entity_type: impl Into<String>, entity_id: impl Into<String>) -> Self {
        Self {
            entity_type: Some(entity_type.into()),
            entity_id: Some(entity_id.into()),
            context: HashMap::new(),
        }
    }

    fn is_empty(&self) -> bool {
        self.entity_id.is_none() && self.context.is_empty()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Main Error Type
// ═══════════════════════════════════════════════════════════════════════════════

/// The main error type for Bazaar Core.
///
/// Per-job failures inside a batch are converted to strings and stored on the
/// job record; this type only crosses API boundaries for setup-time errors,
/// lookups and provider calls.
#[derive(Error, Debug)]
pub struct BazaarError {
    code: ErrorCode,

    /// Shown to API callers
    user_message: Cow<'static, str>,

    /// Logged, never returned
    internal_message: Option<String>,

    details: ErrorDetails,

    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl fmt::Display for BazaarError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.user_message)?;
        if let Some(ref internal) = self.internal_message {
            write!(f, " (internal: {})", internal)?;
        }
        Ok(())
    }
}

impl BazaarError {
    // ─────────────────────────────────────────────────────────────────────────
    // Constructors
    // ─────────────────────────────────────────────────────────────────────────

    pub fn new(code: ErrorCode, user_message: impl Into<Cow<'static, str>>) -> Self {
        let error = Self {
            code,
            user_message: user_message.into(),
            internal_message: None,
            details: ErrorDetails::default(),
            source: None,
        };
        error.record_metrics();
        error
    }

    pub fn with_internal(
        code: ErrorCode,
        user_message: impl Into<Cow<'static, str>>,
        internal_message: impl Into<String>,
    ) -> Self {
        let mut error = Self::new(code, user_message);
        error.internal_message = Some(internal_message.into());
        error
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::with_internal(
            ErrorCode::InternalError,
            "An internal error occurred",
            message,
        )
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Builder Methods
    // ─────────────────────────────────────────────────────────────────────────

    /// Add a source error.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source = Some(Box::new(source));
        self
    }

    /// Add error details.
    pub fn with_details(mut self, details: ErrorDetails) -> Self {
        self.details = details;
        self
    }

    /// Attach a serializable value under `details.context[key]`.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.details.context.insert(key.into(), v);
        }
        self
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Accessors
    // ─────────────────────────────────────────────────────────────────────────

    pub fn code(&self) -> ErrorCode {
        self.code
    }

    pub fn user_message(&self) -> &str {
        &self.user_message
    }

    pub fn internal_message(&self) -> Option<&str> {
        self.internal_message.as_deref()
    }

    pub fn details(&self) -> &ErrorDetails {
        &self.details
    }

    pub fn http_status(&self) -> StatusCode {
        self.code.http_status()
    }

    pub fn is_retryable(&self) -> bool {
        self.code.is_retryable()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Logging
    // ─────────────────────────────────────────────────────────────────────────

    /// Log at a level picked from the category: our own faults are errors,
    /// provider trouble is a warning, and caller mistakes are debug noise.
    pub fn log(&self) {
        let code = self.code.to_string();
        let status = self.http_status().as_u16();

        match self.code.category() {
            "internal" | "configuration" | "persistence" | "serialization" => error!(
                error_code = %code,
                http_status = status,
                message = %self.user_message,
                internal = ?self.internal_message,
                source = ?self.source,
                "Request failed"
            ),
            "external_service" => warn!(
                error_code = %code,
                http_status = status,
                message = %self.user_message,
                internal = ?self.internal_message,
                "Provider error"
            ),
            _ => debug!(
                error_code = %code,
                http_status = status,
                message = %self.user_message,
                "Request rejected"
            ),
        }
    }

    fn record_metrics(&self) {
        counter!(
            "bazaar_errors_total",
            "code" => self.code.to_string(),
            "category" => self.code.category().to_string(),
            "retryable" => self.is_retryable().to_string(),
        )
        .increment(1);
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// API Response
// ═══════════════════════════════════════════════════════════════════════════════

/// Error body returned by the status endpoints.
///
/// Shares the `success`/`error`/`error_code` fields with
/// [`crate::api::ApiResponse`] so clients can parse both with one type.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Always false for errors
    pub success: bool,

    /// User-facing message
    pub error: String,

    /// Machine-readable code
    pub error_code: ErrorCode,

    /// Numeric code
    pub numeric_code: u32,

    /// Additional details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<ErrorDetails>,

    /// Timestamp
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl From<&BazaarError> for ErrorResponse {
    fn from(error: &BazaarError) -> Self {
        Self {
            success: false,
            error: error.user_message.to_string(),
            error_code: error.code,
            numeric_code: error.code.numeric_code(),
            details: (!error.details.is_empty()).then(|| error.details.clone()),
            timestamp: chrono::Utc::now(),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Axum Integration
// ═══════════════════════════════════════════════════════════════════════════════

impl IntoResponse for BazaarError {
    fn into_response(self) -> Response {
        self.log();

        let status = self.http_status();
        let response = ErrorResponse::from(&self);

        (status, Json(response)).into_response()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// From Implementations
// ═══════════════════════════════════════════════════════════════════════════════

impl From<serde_json::Error> for BazaarError {
    fn from(error: serde_json::Error) -> Self {
        let code = if error.is_data() || error.is_syntax() || error.is_eof() {
            ErrorCode::DeserializationError
        } else {
            ErrorCode::SerializationError
        };

        Self::with_internal(code, "Failed to process JSON data", error.to_string())
            .with_source(error)
    }
}

impl From<reqwest::Error> for BazaarError {
    fn from(error: reqwest::Error) -> Self {
        let (code, user_msg) = if error.is_timeout() {
            (
                ErrorCode::ProviderTimeout,
                "External service request timed out",
            )
        } else if error.is_connect() {
            (
                ErrorCode::NetworkError,
                "Failed to connect to external service",
            )
        } else if error.is_status() {
            match error.status().map(|s| s.as_u16()) {
                Some(429) => (
                    ErrorCode::ProviderRateLimited,
                    "Rate limited by external service",
                ),
                Some(500..=599) => (
                    ErrorCode::ProviderUnavailable,
                    "External service is temporarily unavailable",
                ),
                _ => (
                    ErrorCode::ExternalServiceError,
                    "External service returned an error",
                ),
            }
        } else {
            (ErrorCode::NetworkError, "Network error occurred")
        };

        Self::with_internal(code, user_msg, error.to_string()).with_source(error)
    }
}

impl From<std::io::Error> for BazaarError {
    fn from(error: std::io::Error) -> Self {
        use std::io::ErrorKind;

        let (code, user_msg) = match error.kind() {
            ErrorKind::NotFound => (ErrorCode::SnapshotNotFound, "File not found"),
            _ => (ErrorCode::PersistenceError, "An I/O error occurred"),
        };

        Self::with_internal(code, user_msg, error.to_string()).with_source(error)
    }
}

impl From<anyhow::Error> for BazaarError {
    fn from(error: anyhow::Error) -> Self {
        match error.downcast::<BazaarError>() {
            Ok(bazaar_error) => bazaar_error,
            Err(error) => Self::with_internal(
                ErrorCode::InternalError,
                "An internal error occurred",
                error.to_string(),
            ),
        }
    }
}

impl From<config::ConfigError> for BazaarError {
    fn from(error: config::ConfigError) -> Self {
        let (code, user_msg) = match &error {
            config::ConfigError::NotFound(_) => (
                ErrorCode::MissingConfiguration,
                "Required configuration is missing",
            ),
            config::ConfigError::PathParse(_) | config::ConfigError::FileParse { .. } => (
                ErrorCode::InvalidConfiguration,
                "Configuration file is invalid",
            ),
            _ => (
                ErrorCode::ConfigurationError,
                "Configuration error occurred",
            ),
        };

        Self::with_internal(code, user_msg, error.to_string())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Convenience Constructors for Domain Errors
// ═══════════════════════════════════════════════════════════════════════════════

impl BazaarError {
    /// A job lookup by ID found nothing in pending or completed.
    pub fn job_not_found(queue: &str, job_id: impl Into<String>) -> Self {
        let job_id = job_id.into();
        Self::new(
            ErrorCode::JobNotFound,
            format!("Job not found in {} queue: {}", queue, job_id),
        )
        .with_details(ErrorDetails::entity("job", job_id))
    }

    /// The queue was never constructed (its provider is not configured).
    pub fn queue_not_initialized(queue: &str) -> Self {
        Self::new(
            ErrorCode::QueueNotInitialized,
            format!("{} queue is not initialized", queue),
        )
        .with_details(ErrorDetails::entity("queue", queue))
    }

    /// Scheduler lookup or removal of an unknown task ID.
    pub fn task_not_found(task_id: impl Into<String>) -> Self {
        let task_id = task_id.into();
        Self::new(
            ErrorCode::TaskNotFound,
            format!("Scheduled task not found: {}", task_id),
        )
        .with_details(ErrorDetails::entity("task", task_id))
    }

    /// Scheduler registration with an ID that is already taken.
    pub fn duplicate_task(task_id: impl Into<String>) -> Self {
        let task_id = task_id.into();
        Self::new(
            ErrorCode::DuplicateTask,
            format!("Scheduled task already exists: {}", task_id),
        )
        .with_details(ErrorDetails::entity("task", task_id))
    }

    /// The storage provider rejected an upload.
    pub fn upload_failed(filename: impl Into<String>, reason: impl Into<String>) -> Self {
        let filename = filename.into();
        Self::new(
            ErrorCode::StorageUploadFailed,
            format!("Upload failed for {}: {}", filename, reason.into()),
        )
        .with_details(ErrorDetails::entity("file", filename))
    }

    /// The email provider rejected a send.
    pub fn email_failed(recipient: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::EmailSendFailed,
            format!("Email delivery failed: {}", reason.into()),
        )
        .with_context("recipient", crate::telemetry::mask_recipient(&recipient.into()))
    }

    /// The provider does not support this operation.
    pub fn not_implemented(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotImplemented, message.into())
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ConfigurationError, message.into())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_http_status() {
        assert_eq!(ErrorCode::JobNotFound.http_status(), StatusCode::NOT_FOUND);
        assert_eq!(ErrorCode::DuplicateTask.http_status(), StatusCode::CONFLICT);
        assert_eq!(
            ErrorCode::QueueNotInitialized.http_status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ErrorCode::ProviderRateLimited.http_status(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            ErrorCode::InternalError.http_status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_error_code_is_retryable() {
        assert!(ErrorCode::StorageUploadFailed.is_retryable());
        assert!(ErrorCode::NetworkError.is_retryable());
        assert!(!ErrorCode::TaskNotFound.is_retryable());
        assert!(!ErrorCode::QueueNotInitialized.is_retryable());
    }

    #[test]
    fn test_error_categories() {
        assert_eq!(ErrorCode::JobNotFound.category(), "queue");
        assert_eq!(ErrorCode::DuplicateTask.category(), "scheduler");
        assert_eq!(ErrorCode::EmailSendFailed.category(), "external_service");
        assert_eq!(ErrorCode::PersistenceError.category(), "persistence");
    }

    #[test]
    fn test_domain_constructors() {
        let error = BazaarError::task_not_found("cleanup");
        assert_eq!(error.code(), ErrorCode::TaskNotFound);
        assert_eq!(error.details().entity_id.as_deref(), Some("cleanup"));

        let error = BazaarError::duplicate_task("drain-email");
        assert_eq!(error.http_status(), StatusCode::CONFLICT);

        let error = BazaarError::queue_not_initialized("image");
        assert_eq!(error.details().entity_type.as_deref(), Some("queue"));
        assert!(!error.is_retryable());
    }

    #[test]
    fn test_error_response_serialization() {
        let error = BazaarError::job_not_found("email", "abc-123");
        let response = ErrorResponse::from(&error);

        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("JOB_NOT_FOUND"));
        assert!(json.contains("abc-123"));
        assert!(json.contains("\"success\":false"));
    }

    #[test]
    fn test_io_not_found_maps_to_snapshot_not_found() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let error = BazaarError::from(io);
        assert_eq!(error.code(), ErrorCode::SnapshotNotFound);
    }

    #[test]
    fn test_error_display() {
        let error = BazaarError::with_internal(
            ErrorCode::StorageUploadFailed,
            "Upload failed",
            "status 500 from storage",
        );

        let display = format!("{}", error);
        assert!(display.contains("StorageUploadFailed"));
        assert!(display.contains("Upload failed"));
        assert!(display.contains("status 500"));
    }

    #[test]
    fn test_empty_details_are_omitted() {
        let response = ErrorResponse::from(&BazaarError::not_implemented("welcome"));
        assert!(response.details.is_none());

        let response = ErrorResponse::from(&BazaarError::email_failed("a@b.c", "rejected"));
        assert!(response.details.is_some());
    }
}
