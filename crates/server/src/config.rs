use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use supercommerce_mcp::tools::{BackendConfig, CommerceToolSource};
use supercommerce_mcp::{InstanceManager, TransportConfig};

/// Overrides `backend.base_url` when set
pub const BASE_URL_ENV: &str = "SUPERCOMMERCE_BASE_URL";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub mcp: McpConfig,

    #[serde(default)]
    pub backend: BackendSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpConfig {
    #[serde(default = "default_endpoint_path")]
    pub endpoint_path: String,

    #[serde(default = "default_stream_path")]
    pub stream_path: String,

    /// Absolute unary URL announced to stream clients; `endpoint_path` otherwise
    #[serde(default)]
    pub public_url: Option<String>,

    #[serde(default = "default_heartbeat_secs")]
    pub heartbeat_secs: u64,

    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

fn default_endpoint_path() -> String {
    "/api/mcp".to_string()
}

fn default_stream_path() -> String {
    "/api/mcp/sse".to_string()
}

fn default_heartbeat_secs() -> u64 {
    30
}

fn default_max_body_bytes() -> usize {
    1024 * 1024
}

impl Default for McpConfig {
    fn default() -> Self {
        Self {
            endpoint_path: default_endpoint_path(),
            stream_path: default_stream_path(),
            public_url: None,
            heartbeat_secs: default_heartbeat_secs(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendSettings {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Name of the environment variable holding the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_base_url() -> String {
    "https://storeapi.el-dokan.com".to_string()
}

fn default_api_key_env() -> String {
    "SUPERCOMMERCE_API_API_KEY".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key_env: default_api_key_env(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl ServerConfig {
    pub fn load(config_path: &Path) -> Result<Self> {
        // Load config file if it exists, otherwise use defaults
        let mut config: Self = if config_path.exists() {
            let content = std::fs::read_to_string(config_path)
                .context("Failed to read configuration file")?;
            Self::parse(&content)?
        } else {
            tracing::info!("Configuration file not found, using defaults");
            Self::default()
        };

        if let Ok(base_url) = std::env::var(BASE_URL_ENV) {
            config.override_base_url(base_url);
        }

        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse configuration file")
    }

    pub fn override_base_url(&mut self, base_url: String) {
        if !base_url.trim().is_empty() {
            tracing::info!("Backend base URL overridden from {}", BASE_URL_ENV);
            self.backend.base_url = base_url;
        }
    }

    /// URL the stream announces for unary calls
    pub fn announced_endpoint(&self) -> String {
        self.mcp
            .public_url
            .clone()
            .unwrap_or_else(|| self.mcp.endpoint_path.clone())
    }

    pub fn transport_config(&self) -> TransportConfig {
        TransportConfig {
            endpoint_url: self.announced_endpoint(),
            heartbeat_interval: Duration::from_secs(self.mcp.heartbeat_secs.max(1)),
            max_body_bytes: self.mcp.max_body_bytes,
            ..TransportConfig::default()
        }
    }

    pub fn backend_config(&self) -> Result<BackendConfig> {
        let api_key = std::env::var(&self.backend.api_key_env).ok();
        if api_key.is_none() {
            tracing::warn!(
                "{} is not set; backend calls will be sent without a bearer token",
                self.backend.api_key_env
            );
        }

        Ok(BackendConfig::new(&self.backend.base_url)?
            .with_api_key(api_key)
            .with_timeout(Duration::from_secs(self.backend.timeout_secs)))
    }
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub instances: Arc<InstanceManager>,
}

impl AppState {
    pub fn new(config: &ServerConfig) -> Result<Self> {
        let source = CommerceToolSource::from_config(config.backend_config()?)
            .context("Failed to create commerce backend client")?;

        Ok(Self::with_manager(InstanceManager::new(
            Arc::new(source),
            config.transport_config(),
        )))
    }

    pub fn with_manager(instances: InstanceManager) -> Self {
        Self {
            instances: Arc::new(instances),
        }
    }
}
