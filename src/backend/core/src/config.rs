//! Configuration management.
//!
//! Sources, lowest precedence first: built-in defaults, an optional
//! `bazaar.toml`, then `BAZAAR__*` environment variables (`.env` is loaded
//! into the environment first).

use crate::error::{BazaarError, Result};
use crate::telemetry::TelemetryConfig;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Main application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Blob storage provider (image pipeline)
    #[serde(default)]
    pub storage: StorageConfig,

    /// Auth/email provider (email pipeline)
    #[serde(default)]
    pub email: EmailConfig,

    /// Queue and scheduler tuning
    #[serde(default)]
    pub jobs: JobsConfig,

    /// Logging and metrics
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// HTTP server host
    #[serde(default = "default_host")]
    pub host: String,

    /// HTTP server port
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Blob storage settings. The image queue is only built when both `url`
/// and `service_key` are set.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Base URL of the storage service
    pub url: Option<String>,

    /// Service role key sent as bearer token
    pub service_key: Option<String>,

    /// Bucket that listing images are written to
    #[serde(default = "default_bucket")]
    pub bucket: String,

    /// Base for public URLs; defaults to `{url}/storage/v1/object/public`
    pub public_base: Option<String>,

    /// Per-request timeout
    #[serde(with = "humantime_serde", default = "default_request_timeout")]
    pub request_timeout: Duration,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            url: None,
            service_key: None,
            bucket: default_bucket(),
            public_base: None,
            request_timeout: default_request_timeout(),
        }
    }
}

impl StorageConfig {
    pub fn is_configured(&self) -> bool {
        self.url.as_deref().is_some_and(|u| !u.is_empty())
            && self.service_key.as_deref().is_some_and(|k| !k.is_empty())
    }

    /// Base that public URLs are built from.
    pub fn resolved_public_base(&self) -> String {
        match (&self.public_base, &self.url) {
            (Some(base), _) => base.trim_end_matches('/').to_string(),
            (None, Some(url)) => format!("{}/storage/v1/object/public", url.trim_end_matches('/')),
            (None, None) => String::new(),
        }
    }
}

/// Auth provider settings. The email queue is only built when both
/// `auth_url` and `api_key` are set.
#[derive(Debug, Clone, Deserialize)]
pub struct EmailConfig {
    /// Base URL of the auth service
    pub auth_url: Option<String>,

    /// API key sent as `apikey` header and bearer token
    pub api_key: Option<String>,

    /// Per-request timeout
    #[serde(with = "humantime_serde", default = "default_request_timeout")]
    pub request_timeout: Duration,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            auth_url: None,
            api_key: None,
            request_timeout: default_request_timeout(),
        }
    }
}

impl EmailConfig {
    pub fn is_configured(&self) -> bool {
        self.auth_url.as_deref().is_some_and(|u| !u.is_empty())
            && self.api_key.as_deref().is_some_and(|k| !k.is_empty())
    }
}

/// Queue, cleanup and drain settings.
#[derive(Debug, Clone, Deserialize)]
pub struct JobsConfig {
    /// Jobs taken per image drain tick
    #[serde(default = "default_image_batch_size")]
    pub image_batch_size: usize,

    /// Delay between image drain ticks
    #[serde(with = "humantime_serde", default = "default_image_interval")]
    pub image_interval: Duration,

    /// Jobs taken per email drain tick
    #[serde(default = "default_email_batch_size")]
    pub email_batch_size: usize,

    /// Delay between email drain ticks
    #[serde(with = "humantime_serde", default = "default_email_interval")]
    pub email_interval: Duration,

    /// Retry limit applied to jobs enqueued without one
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Completed jobs kept after a cleanup pass
    #[serde(default = "default_max_completed")]
    pub max_completed: usize,

    /// Minimum time between cleanup passes
    #[serde(with = "humantime_serde", default = "default_cleanup_interval")]
    pub cleanup_interval: Duration,

    /// Completed jobs older than this are evicted
    #[serde(with = "humantime_serde", default = "default_max_completed_age")]
    pub max_completed_age: Duration,

    /// Where pending image jobs are written at shutdown
    #[serde(default = "default_snapshot_path")]
    pub snapshot_path: PathBuf,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            image_batch_size: default_image_batch_size(),
            image_interval: default_image_interval(),
            email_batch_size: default_email_batch_size(),
            email_interval: default_email_interval(),
            max_retries: default_max_retries(),
            max_completed: default_max_completed(),
            cleanup_interval: default_cleanup_interval(),
            max_completed_age: default_max_completed_age(),
            snapshot_path: default_snapshot_path(),
        }
    }
}

// Default value functions
fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8080 }
fn default_bucket() -> String { "listing-images".to_string() }
fn default_request_timeout() -> Duration { Duration::from_secs(30) }
fn default_image_batch_size() -> usize { 10 }
fn default_image_interval() -> Duration { Duration::from_secs(10) }
fn default_email_batch_size() -> usize { 25 }
fn default_email_interval() -> Duration { Duration::from_secs(30) }
fn default_max_retries() -> u32 { 3 }
fn default_max_completed() -> usize { 100 }
fn default_cleanup_interval() -> Duration { Duration::from_secs(5 * 60) }
fn default_max_completed_age() -> Duration { Duration::from_secs(24 * 60 * 60) }
fn default_snapshot_path() -> PathBuf { PathBuf::from("data/image_queue.json") }

impl Config {
    /// Load configuration from `.env`, an optional `bazaar.toml` and the
    /// environment.
    pub fn load() -> Result<Self> {
        let _ = dotenvy::dotenv();

        let config = config::Config::builder()
            .add_source(config::File::with_name("bazaar").required(false))
            .add_source(
                config::Environment::with_prefix("BAZAAR")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let cfg: Config = config.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load from a specific file path, still overlaid by the environment.
    pub fn from_file(path: &str) -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(
                config::Environment::with_prefix("BAZAAR")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let cfg: Config = config.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Reject values the queues and scheduler cannot run with.
    pub fn validate(&self) -> Result<()> {
        let jobs = &self.jobs;
        if jobs.image_batch_size == 0 || jobs.email_batch_size == 0 {
            return Err(BazaarError::configuration("batch sizes must be greater than zero"));
        }
        if jobs.image_interval.is_zero() || jobs.email_interval.is_zero() {
            return Err(BazaarError::configuration("drain intervals must be greater than zero"));
        }
        if jobs.max_retries == 0 {
            return Err(BazaarError::configuration("max_retries must be at least 1"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.jobs.email_batch_size, 25);
        assert_eq!(config.jobs.email_interval, Duration::from_secs(30));
        assert_eq!(config.jobs.image_batch_size, 10);
        assert_eq!(config.jobs.image_interval, Duration::from_secs(10));
        assert_eq!(config.jobs.max_completed, 100);
        assert_eq!(config.jobs.cleanup_interval, Duration::from_secs(300));
        assert!(!config.storage.is_configured());
        assert!(!config.email.is_configured());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_public_base_resolution() {
        let mut storage = StorageConfig {
            url: Some("https://project.supabase.co/".to_string()),
            service_key: Some("key".to_string()),
            ..Default::default()
        };
        assert!(storage.is_configured());
        assert_eq!(
            storage.resolved_public_base(),
            "https://project.supabase.co/storage/v1/object/public"
        );

        storage.public_base = Some("https://cdn.example.com/".to_string());
        assert_eq!(storage.resolved_public_base(), "https://cdn.example.com");
    }

    #[test]
    fn test_from_file_with_humantime_durations() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[jobs]
email_interval = "45s"
image_batch_size = 4
max_completed_age = "2h"

[storage]
url = "http://localhost:54321"
service_key = "service"
bucket = "photos"
"#
        )
        .unwrap();

        let config = Config::from_file(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.jobs.email_interval, Duration::from_secs(45));
        assert_eq!(config.jobs.image_batch_size, 4);
        assert_eq!(config.jobs.max_completed_age, Duration::from_secs(7200));
        assert_eq!(config.storage.bucket, "photos");
        assert!(config.storage.is_configured());
    }

    #[test]
    fn test_validate_rejects_zero_batch() {
        let mut config = Config::default();
        config.jobs.email_batch_size = 0;
        assert!(config.validate().is_err());
    }
}
