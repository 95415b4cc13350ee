//! Blob storage capability and the Supabase Storage client.

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::StorageConfig;
use crate::error::{BazaarError, Result};

// ═══════════════════════════════════════════════════════════════════════════════
// Capability
// ═══════════════════════════════════════════════════════════════════════════════

/// Uploads an object and returns its public URL.
///
/// Implementations must be idempotent for the same `bucket`/`path`, since a
/// retried job uploads again.
#[async_trait]
pub trait BlobStorage: Send + Sync {
    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        data: &[u8],
        content_type: &str,
    ) -> Result<String>;
}

/// `{bucket}/{path}` with every segment percent-encoded.
///
/// `/` in `path` stays a separator, so `u1/photo#2.png` becomes
/// `u1/photo%232.png`. Upload and public URLs both go through here.
pub fn object_key(bucket: &str, path: &str) -> String {
    std::iter::once(bucket)
        .chain(path.split('/'))
        .map(urlencoding::encode)
        .collect::<Vec<_>>()
        .join("/")
}

// ═══════════════════════════════════════════════════════════════════════════════
// Supabase Storage
// ═══════════════════════════════════════════════════════════════════════════════

/// Storage client speaking the Supabase Storage object API.
pub struct SupabaseStorage {
    client: reqwest::Client,
    base_url: String,
    service_key: String,
    public_base: String,
}

impl std::fmt::Debug for SupabaseStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SupabaseStorage")
            .field("base_url", &self.base_url)
            .field("public_base", &self.public_base)
            .finish()
    }
}

impl SupabaseStorage {
    /// Create a client.
    ///
    /// `public_base` is the prefix public object URLs are built from
    /// (`{public_base}/{bucket}/{path}`).
    pub fn new(
        base_url: impl Into<String>,
        service_key: impl Into<String>,
        public_base: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            service_key: service_key.into(),
            public_base: public_base.into().trim_end_matches('/').to_string(),
        })
    }

    /// Build from configuration. Fails when the storage section is incomplete.
    pub fn from_config(config: &StorageConfig) -> Result<Self> {
        match (&config.url, &config.service_key) {
            (Some(url), Some(key)) if config.is_configured() => Self::new(
                url.clone(),
                key.clone(),
                config.resolved_public_base(),
                config.request_timeout,
            ),
            _ => Err(BazaarError::configuration(
                "storage.url and storage.service_key are required",
            )),
        }
    }

    /// Set custom HTTP client.
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    pub fn public_url(&self, bucket: &str, path: &str) -> String {
        format!("{}/{}", self.public_base, object_key(bucket, path))
    }
}

#[async_trait]
impl BlobStorage for SupabaseStorage {
    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        data: &[u8],
        content_type: &str,
    ) -> Result<String> {
        let url = format!(
            "{}/storage/v1/object/{}",
            self.base_url,
            object_key(bucket, path)
        );

        let response = self
            .client
            .post(&url)
            .header(AUTHORIZATION, format!("Bearer {}", self.service_key))
            .header(CONTENT_TYPE, content_type)
            .header("x-upsert", "true")
            .body(data.to_vec())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(bucket, path, status = status.as_u16(), "Storage upload rejected");
            return Err(BazaarError::upload_failed(
                path,
                format!("storage returned {}: {}", status, body),
            ));
        }

        debug!(bucket, path, bytes = data.len(), "Object uploaded");
        Ok(self.public_url(bucket, path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn storage(server: &MockServer) -> SupabaseStorage {
        SupabaseStorage::new(
            server.uri(),
            "service-key",
            format!("{}/storage/v1/object/public", server.uri()),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_upload_sends_upsert_and_returns_public_url() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/storage/v1/object/listings/cat.webp"))
            .and(header("authorization", "Bearer service-key"))
            .and(header("x-upsert", "true"))
            .and(header("content-type", "image/webp"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let url = storage(&server)
            .upload("listings", "cat.webp", b"bytes", "image/webp")
            .await
            .unwrap();

        assert_eq!(
            url,
            format!("{}/storage/v1/object/public/listings/cat.webp", server.uri())
        );
    }

    #[tokio::test]
    async fn test_upload_non_2xx_is_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("bucket missing"))
            .mount(&server)
            .await;

        let error = storage(&server)
            .upload("listings", "cat.png", b"bytes", "image/png")
            .await
            .unwrap_err();

        assert_eq!(error.code(), ErrorCode::StorageUploadFailed);
        assert!(error.user_message().contains("bucket missing"));
    }

    #[test]
    fn test_object_key_encodes_each_segment() {
        assert_eq!(object_key("listings", "u1/cat.webp"), "listings/u1/cat.webp");
        assert_eq!(
            object_key("listings", "u1/photo#2 (1).png"),
            "listings/u1/photo%232%20%281%29.png"
        );
        assert_eq!(object_key("listings", "a?b.png"), "listings/a%3Fb.png");
    }

    #[tokio::test]
    async fn test_upload_path_keeps_reserved_characters_in_the_key() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/storage/v1/object/listings/u1/photo%232.png"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let url = storage(&server)
            .upload("listings", "u1/photo#2.png", b"bytes", "image/png")
            .await
            .unwrap();

        assert_eq!(
            url,
            format!(
                "{}/storage/v1/object/public/listings/u1/photo%232.png",
                server.uri()
            )
        );
    }

    #[test]
    fn test_from_config_requires_credentials() {
        let config = StorageConfig::default();
        assert!(SupabaseStorage::from_config(&config).is_err());
    }
}
