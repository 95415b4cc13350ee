//! Email delivery pipeline.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use super::job::{Job, JobHandler, JobState, JobStatus};
use super::queue::{QueueConfig, WorkQueue};
use crate::error::Result;
use crate::providers::EmailService;

/// Category of an email; selects the provider flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmailType {
    Confirmation,
    PasswordReset,
    Notification,
    Welcome,
    Marketing,
}

impl fmt::Display for EmailType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Confirmation => write!(f, "confirmation"),
            Self::PasswordReset => write!(f, "password_reset"),
            Self::Notification => write!(f, "notification"),
            Self::Welcome => write!(f, "welcome"),
            Self::Marketing => write!(f, "marketing"),
        }
    }
}

/// One email to deliver.
///
/// `template` and `variables` are passed to the provider untouched; nothing
/// is rendered in process. They are cleared once the job is terminal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailJob {
    #[serde(flatten)]
    pub state: JobState,
    pub to: String,
    pub subject: String,
    pub email_type: EmailType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
    #[serde(default)]
    pub variables: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sent_at: Option<DateTime<Utc>>,
}

impl EmailJob {
    pub fn new(to: impl Into<String>, subject: impl Into<String>, email_type: EmailType) -> Self {
        Self {
            state: JobState::default(),
            to: to.into(),
            subject: subject.into(),
            email_type,
            template: None,
            variables: HashMap::new(),
            sent_at: None,
        }
    }

    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.template = Some(template.into());
        self
    }

    pub fn with_variable(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.variables.insert(key.into(), value.into());
        self
    }

    pub fn with_variables(mut self, variables: HashMap<String, String>) -> Self {
        self.variables.extend(variables);
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.state.max_retries = max_retries;
        self
    }
}

impl Job for EmailJob {
    type Output = ();

    fn state(&self) -> &JobState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut JobState {
        &mut self.state
    }

    fn complete(&mut self, _output: ()) {
        self.state.status = JobStatus::Sent;
        self.sent_at = Some(Utc::now());
        self.release_payload();
    }

    fn release_payload(&mut self) {
        self.template = None;
        self.variables = HashMap::new();
    }

    fn succeeded_at(&self) -> Option<DateTime<Utc>> {
        self.sent_at
    }
}

/// Hands each job to the configured [`EmailService`].
struct EmailDispatcher {
    service: Arc<dyn EmailService>,
}

#[async_trait]
impl JobHandler<EmailJob> for EmailDispatcher {
    async fn handle(&self, job: &EmailJob) -> Result<()> {
        self.service.send(job).await
    }
}

/// Work queue of emails.
///
/// Dereferences to the underlying [`WorkQueue`] for counts, lookups and
/// batch processing.
#[derive(Debug)]
pub struct EmailQueue {
    queue: WorkQueue<EmailJob>,
}

impl EmailQueue {
    pub fn new(config: QueueConfig, service: Arc<dyn EmailService>) -> Self {
        Self {
            queue: WorkQueue::new("email", config, Arc::new(EmailDispatcher { service })),
        }
    }

    /// Queue an email and return its job ID.
    pub fn enqueue_email(
        &self,
        to: impl Into<String>,
        subject: impl Into<String>,
        email_type: EmailType,
        template: Option<String>,
        variables: HashMap<String, String>,
    ) -> String {
        let mut job = EmailJob::new(to, subject, email_type).with_variables(variables);
        job.template = template;
        self.queue.enqueue(job)
    }

    /// Queue a signup confirmation email.
    pub fn queue_confirmation(&self, to: impl Into<String>) -> String {
        self.enqueue_email(
            to,
            "Confirm your Bazaar account",
            EmailType::Confirmation,
            Some("confirmation".to_string()),
            HashMap::new(),
        )
    }

    /// Queue a password reset email. `redirect_to` is forwarded to the
    /// provider when given.
    pub fn queue_password_reset(&self, to: impl Into<String>, redirect_to: Option<String>) -> String {
        let mut variables = HashMap::new();
        if let Some(redirect) = redirect_to {
            variables.insert(
                crate::providers::auth_email::REDIRECT_VARIABLE.to_string(),
                redirect,
            );
        }
        self.enqueue_email(
            to,
            "Reset your Bazaar password",
            EmailType::PasswordReset,
            Some("password_reset".to_string()),
            variables,
        )
    }
}

impl Deref for EmailQueue {
    type Target = WorkQueue<EmailJob>;

    fn deref(&self) -> &Self::Target {
        &self.queue
    }
}

/// Email job as exposed by the status endpoints. Variables are omitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailJobView {
    pub id: String,
    pub status: JobStatus,
    pub email_type: EmailType,
    pub to: String,
    pub subject: String,
    pub retries: u32,
    pub max_retries: u32,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sent_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&EmailJob> for EmailJobView {
    fn from(job: &EmailJob) -> Self {
        Self {
            id: job.state.id.clone(),
            status: job.state.status,
            email_type: job.email_type,
            to: job.to.clone(),
            subject: job.subject.clone(),
            retries: job.state.retries,
            max_retries: job.state.max_retries,
            created_at: job.state.created_at,
            sent_at: job.sent_at,
            failed_at: job.state.failed_at,
            error: job.state.error.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BazaarError;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct RecordingService {
        sent: Mutex<Vec<(String, EmailType)>>,
    }

    #[async_trait]
    impl EmailService for RecordingService {
        async fn send(&self, email: &EmailJob) -> Result<()> {
            if email.email_type == EmailType::Marketing {
                return Err(BazaarError::not_implemented("marketing"));
            }
            self.sent.lock().push((email.to.clone(), email.email_type));
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_helpers_enqueue_typed_jobs() {
        let service = Arc::new(RecordingService::default());
        let queue = EmailQueue::new(QueueConfig::default(), service.clone());

        let confirm = queue.queue_confirmation("a@example.com");
        let reset = queue.queue_password_reset("b@example.com", Some("https://x/reset".into()));

        let job = queue.get_by_id(&reset).unwrap();
        assert_eq!(job.email_type, EmailType::PasswordReset);
        assert_eq!(job.variables.get("redirect_to").map(String::as_str), Some("https://x/reset"));

        let sent = queue.process_batch(25).await;
        assert_eq!(sent.len(), 2);
        assert!(sent.iter().all(|j| j.status() == JobStatus::Sent && j.sent_at.is_some()));
        assert!(sent.iter().all(|j| j.variables.is_empty()));

        let job = queue.get_by_id(&confirm).unwrap();
        assert_eq!(job.status(), JobStatus::Sent);
        assert_eq!(service.sent.lock().len(), 2);
    }

    #[tokio::test]
    async fn test_unsupported_type_follows_retry_path() {
        let queue = EmailQueue::new(QueueConfig::default(), Arc::new(RecordingService::default()));
        let id = queue.enqueue_email(
            "c@example.com",
            "Deals",
            EmailType::Marketing,
            None,
            HashMap::new(),
        );

        queue.process_batch(1).await;
        let job = queue.get_by_id(&id).unwrap();
        assert_eq!(job.status(), JobStatus::Retry);
        assert_eq!(job.state.retries, 1);
    }

    #[test]
    fn test_view_omits_variables() {
        let job = EmailJob::new("a@example.com", "Hi", EmailType::Welcome)
            .with_variable("name", "Ann");
        let json = serde_json::to_value(EmailJobView::from(&job)).unwrap();
        assert!(json.get("variables").is_none());
        assert_eq!(json["email_type"], "welcome");
    }
}
