//! Transactional email capability and the Supabase Auth client.
//!
//! Supabase Auth only sends the emails tied to its own flows, so the client
//! covers signup confirmation and password recovery. Other email types need
//! a different [`EmailService`].

use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::EmailConfig;
use crate::error::{BazaarError, Result};
use crate::jobs::email::{EmailJob, EmailType};
use crate::telemetry::mask_recipient;

/// Variable that, when present, is forwarded as the auth redirect target.
pub const REDIRECT_VARIABLE: &str = "redirect_to";

/// Sends one email.
#[async_trait]
pub trait EmailService: Send + Sync {
    async fn send(&self, email: &EmailJob) -> Result<()>;
}

/// Email service backed by the Supabase Auth REST endpoints.
pub struct SupabaseAuthEmailService {
    client: reqwest::Client,
    auth_url: String,
    api_key: String,
}

impl std::fmt::Debug for SupabaseAuthEmailService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SupabaseAuthEmailService")
            .field("auth_url", &self.auth_url)
            .finish()
    }
}

impl SupabaseAuthEmailService {
    pub fn new(
        auth_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            auth_url: auth_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }

    /// Build from configuration. Fails when the email section is incomplete.
    pub fn from_config(config: &EmailConfig) -> Result<Self> {
        match (&config.auth_url, &config.api_key) {
            (Some(url), Some(key)) if config.is_configured() => {
                Self::new(url.clone(), key.clone(), config.request_timeout)
            }
            _ => Err(BazaarError::configuration(
                "email.auth_url and email.api_key are required",
            )),
        }
    }

    async fn post(&self, endpoint: &str, email: &EmailJob, body: serde_json::Value) -> Result<()> {
        let url = format!("{}/auth/v1/{}", self.auth_url, endpoint);

        let mut request = self
            .client
            .post(&url)
            .header("apikey", &self.api_key)
            .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
            .json(&body);

        if let Some(redirect) = email.variables.get(REDIRECT_VARIABLE) {
            request = request.query(&[(REDIRECT_VARIABLE, redirect)]);
        }

        let response = request.send().await?;
        let status = response.status();

        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            warn!(
                endpoint,
                recipient = %mask_recipient(&email.to),
                status = status.as_u16(),
                "Auth provider rejected email"
            );
            return Err(BazaarError::email_failed(
                email.to.clone(),
                format!("auth provider returned {}: {}", status, text),
            ));
        }

        debug!(endpoint, recipient = %mask_recipient(&email.to), "Email accepted by auth provider");
        Ok(())
    }
}

#[async_trait]
impl EmailService for SupabaseAuthEmailService {
    async fn send(&self, email: &EmailJob) -> Result<()> {
        match email.email_type {
            EmailType::Confirmation => {
                self.post("resend", email, json!({ "type": "signup", "email": email.to }))
                    .await
            }
            EmailType::PasswordReset => {
                self.post("recover", email, json!({ "email": email.to })).await
            }
            other => Err(BazaarError::not_implemented(format!(
                "{} emails are not supported by the auth provider",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn service(server: &MockServer) -> SupabaseAuthEmailService {
        SupabaseAuthEmailService::new(server.uri(), "anon-key", Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_confirmation_uses_resend_signup() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/v1/resend"))
            .and(header("apikey", "anon-key"))
            .and(body_json(json!({ "type": "signup", "email": "jane@example.com" })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let job = EmailJob::new("jane@example.com", "Confirm", EmailType::Confirmation);
        service(&server).send(&job).await.unwrap();
    }

    #[tokio::test]
    async fn test_password_reset_forwards_redirect() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/v1/recover"))
            .and(query_param("redirect_to", "https://bazaar.example/reset"))
            .and(body_json(json!({ "email": "jane@example.com" })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let job = EmailJob::new("jane@example.com", "Reset", EmailType::PasswordReset)
            .with_variable(REDIRECT_VARIABLE, "https://bazaar.example/reset");
        service(&server).send(&job).await.unwrap();
    }

    #[tokio::test]
    async fn test_rejection_is_email_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
            .mount(&server)
            .await;

        let job = EmailJob::new("jane@example.com", "Confirm", EmailType::Confirmation);
        let error = service(&server).send(&job).await.unwrap_err();
        assert_eq!(error.code(), ErrorCode::EmailSendFailed);
    }

    #[tokio::test]
    async fn test_marketing_is_not_implemented() {
        let server = MockServer::start().await;
        let job = EmailJob::new("jane@example.com", "Deals", EmailType::Marketing);
        let error = service(&server).send(&job).await.unwrap_err();
        assert_eq!(error.code(), ErrorCode::NotImplemented);
    }
}
