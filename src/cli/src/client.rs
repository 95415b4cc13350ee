//! HTTP client for the Bazaar status API.

use anyhow::{Context, Result};
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;

/// Success envelope returned by the server.
#[derive(Debug, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

/// Error body returned by the server for non-2xx responses.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
    error_code: String,
}

pub struct ApiClient {
    client: Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// GET `path` and unwrap the `data` field of the response envelope.
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.url(path);
        let resp = send(self.client.get(&url), "GET", &url).await?;
        unwrap_envelope(resp, &url).await
    }

    /// POST an empty body to `path` and unwrap the response envelope.
    pub async fn post<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.url(path);
        let resp = send(self.client.post(&url), "POST", &url).await?;
        unwrap_envelope(resp, &url).await
    }

    /// GET `path` and return the body as plain JSON (for `/health`).
    pub async fn get_raw(&self, path: &str) -> Result<serde_json::Value> {
        let url = self.url(path);
        let resp = send(self.client.get(&url), "GET", &url).await?;
        resp.json()
            .await
            .with_context(|| format!("Failed to parse response from {}", url))
    }
}

async fn send(request: RequestBuilder, verb: &str, url: &str) -> Result<Response> {
    let resp = request
        .send()
        .await
        .with_context(|| format!("{} {} failed", verb, url))?;

    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let body = resp.text().await.unwrap_or_default();
    match serde_json::from_str::<ErrorBody>(&body) {
        Ok(error) => anyhow::bail!("{} ({}): {}", error.error_code, status, error.error),
        Err(_) => anyhow::bail!("API error ({}): {}", status, body),
    }
}

async fn unwrap_envelope<T: DeserializeOwned>(resp: Response, url: &str) -> Result<T> {
    let api_resp: ApiResponse<T> = resp
        .json()
        .await
        .with_context(|| format!("Failed to parse response from {}", url))?;

    if api_resp.success {
        api_resp
            .data
            .ok_or_else(|| anyhow::anyhow!("API returned success but no data"))
    } else {
        Err(anyhow::anyhow!(
            "API error: {}",
            api_resp.error.unwrap_or_else(|| "Unknown error".into())
        ))
    }
}
