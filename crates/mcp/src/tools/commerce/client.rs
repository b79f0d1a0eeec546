// HTTP client for the commerce backend admin API

use anyhow::{anyhow, bail, Context, Result};
use reqwest::{header, Client, Method};
use serde_json::Value;
use std::time::Duration;
use url::Url;

#[derive(Debug, Clone)]
pub struct BackendConfig {
    pub base_url: Url,
    /// Sent as a bearer token when present
    pub api_key: Option<String>,
    pub timeout: Duration,
}

impl BackendConfig {
    pub fn new(base_url: &str) -> Result<Self> {
        Ok(Self {
            base_url: Url::parse(base_url)
                .with_context(|| format!("Invalid backend base URL: {}", base_url))?,
            api_key: None,
            timeout: Duration::from_secs(30),
        })
    }

    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key.filter(|k| !k.trim().is_empty());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Shared by every commerce tool; cheap to clone.
#[derive(Debug, Clone)]
pub struct BackendClient {
    http: Client,
    base_url: Url,
    api_key: Option<String>,
}

impl BackendClient {
    pub fn new(config: BackendConfig) -> Result<Self> {
        let http = Client::builder()
            .user_agent(concat!("supercommerce-mcp/", env!("CARGO_PKG_VERSION")))
            .timeout(config.timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            http,
            base_url: config.base_url,
            api_key: config.api_key,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Build an endpoint URL from path segments; each segment is percent-encoded.
    pub fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| anyhow!("Backend base URL cannot carry a path: {}", self.base_url))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Send a request and decode the JSON reply.
    ///
    /// Non-success statuses become errors carrying the backend's error body.
    pub async fn send(
        &self,
        method: Method,
        segments: &[&str],
        query: &[(&str, String)],
        body: Option<&Value>,
    ) -> Result<Value> {
        let url = self.endpoint(segments)?;
        tracing::debug!(%method, %url, "Calling commerce backend");

        let mut request = self
            .http
            .request(method.clone(), url.clone())
            .header(header::ACCEPT, "application/json");
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(token) = &self.api_key {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .with_context(|| format!("{} {} failed", method, url.path()))?;

        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .with_context(|| format!("Failed to read response from {} {}", method, url.path()))?;

        if !status.is_success() {
            let detail = match serde_json::from_slice::<Value>(&bytes) {
                Ok(json) => json.to_string(),
                Err(_) => String::from_utf8_lossy(&bytes).into_owned(),
            };
            bail!("backend returned {} for {} {}: {}", status, method, url.path(), detail);
        }

        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Value::Null);
        }

        serde_json::from_slice(&bytes)
            .with_context(|| format!("Backend returned non-JSON body for {} {}", method, url.path()))
    }
}
