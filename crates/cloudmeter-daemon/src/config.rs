//! Configuration loading and validation

use anyhow::{bail, Context, Result};
use cloudmeter_core::NameTemplate;
use cloudmeter_sync::PollerConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub cloud: CloudConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub cache: CacheConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloudConfig {
    /// Cloud server host, as shown in the app ("Server: https://..." is accepted)
    #[serde(default)]
    pub server: String,
    /// Cloud authorization key
    #[serde(default)]
    pub auth_key: String,
    /// Seconds between metadata refreshes
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    /// Minimum seconds between two requests
    #[serde(default = "default_request_spacing")]
    pub request_spacing_secs: u64,
    /// Per-request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    /// Extra attempts after a non-success response
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Display name template ({id}, {name}, {room})
    #[serde(default = "default_name_template")]
    pub name_template: String,
}

impl Default for CloudConfig {
    fn default() -> Self {
        Self {
            server: String::new(),
            auth_key: String::new(),
            poll_interval_secs: default_poll_interval(),
            request_spacing_secs: default_request_spacing(),
            request_timeout_secs: default_request_timeout(),
            max_retries: default_max_retries(),
            name_template: default_name_template(),
        }
    }
}

fn default_poll_interval() -> u64 {
    60
}

fn default_request_spacing() -> u64 {
    2
}

fn default_request_timeout() -> u64 {
    15
}

fn default_max_retries() -> u32 {
    cloudmeter_sync::DEFAULT_MAX_RETRIES
}

fn default_name_template() -> String {
    "{name}".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Address the exposition listener binds to
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Exposition port
    #[serde(default = "default_port")]
    pub port: u16,
    /// Prefix for exported metric names
    #[serde(default = "default_namespace")]
    pub namespace: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
            namespace: default_namespace(),
        }
    }
}

fn default_bind() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    9924
}

fn default_namespace() -> String {
    "shelly".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Directory for the persisted metadata snapshot
    #[serde(default = "default_cache_dir")]
    pub dir: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: default_cache_dir(),
        }
    }
}

fn default_cache_dir() -> String {
    "./cache".to_string()
}

impl Config {
    /// Apply `SHELLY_HOST`, `SHELLY_AUTH_KEY` and `SHELLY_PROMETHEUS_PORT`
    ///
    /// `lookup` is `std::env::var` in production.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("SHELLY_HOST") {
            self.cloud.server = host;
        }
        if let Some(key) = lookup("SHELLY_AUTH_KEY") {
            self.cloud.auth_key = key;
        }
        if let Some(port) = lookup("SHELLY_PROMETHEUS_PORT") {
            self.metrics.port = port
                .trim()
                .parse()
                .with_context(|| format!("Invalid SHELLY_PROMETHEUS_PORT: {:?}", port))?;
        }
        Ok(())
    }

    /// Reject configurations the daemon can't run with
    pub fn validate(&self) -> Result<()> {
        if self.cloud.server.trim().is_empty() {
            bail!("No cloud server configured (cloud.server or SHELLY_HOST)");
        }
        if self.cloud.auth_key.trim().is_empty() {
            bail!("No cloud auth key configured (cloud.auth_key or SHELLY_AUTH_KEY)");
        }
        if self.cloud.poll_interval_secs == 0 {
            bail!("cloud.poll_interval_secs must be at least 1");
        }
        Ok(())
    }

    /// Address for the exposition listener
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.metrics.bind, self.metrics.port)
    }

    pub fn request_spacing(&self) -> Duration {
        Duration::from_secs(self.cloud.request_spacing_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.cloud.request_timeout_secs)
    }

    /// Convert to the scheduler settings
    pub fn to_poller_config(&self) -> PollerConfig {
        PollerConfig {
            interval: Duration::from_secs(self.cloud.poll_interval_secs),
            name_template: NameTemplate::new(self.cloud.name_template.clone()),
            ..PollerConfig::default()
        }
    }
}

/// Load configuration from file
pub fn load_config(path: &Path) -> Result<Config> {
    if path.exists() {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    } else {
        info!(
            path = %path.display(),
            "Configuration file not found, using defaults"
        );
        Ok(Config::default())
    }
}
