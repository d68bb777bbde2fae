//! Configuration loading

use anyhow::{Context, Result};
use axum::http::Method;
use routegate_api::ApiConfig;
use routegate_auth::HashingConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub api: ApiSection,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
        }
    }
}

/// Route builder settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiSection {
    #[serde(default = "default_title")]
    pub title: String,
    #[serde(default = "default_methods_automatic")]
    pub methods_automatic: bool,
    #[serde(default = "default_methods")]
    pub methods_default: Vec<String>,
}

impl Default for ApiSection {
    fn default() -> Self {
        Self {
            title: default_title(),
            methods_automatic: default_methods_automatic(),
            methods_default: default_methods(),
        }
    }
}

impl ApiSection {
    /// Convert to the builder's settings, parsing method names
    pub fn to_api_config(&self) -> Result<ApiConfig> {
        let methods_default = self
            .methods_default
            .iter()
            .map(|m| {
                m.to_ascii_uppercase()
                    .parse::<Method>()
                    .with_context(|| format!("Invalid HTTP method in api.methods_default: {}", m))
            })
            .collect::<Result<Vec<_>>>()?;

        if methods_default.is_empty() {
            anyhow::bail!("api.methods_default must list at least one method");
        }

        Ok(ApiConfig {
            title: self.title.clone(),
            methods_automatic: self.methods_automatic,
            methods_default,
        })
    }
}

/// A user ensured to exist at startup
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedUser {
    pub username: String,
    pub password: String,
}

/// Authentication configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default = "default_credentials_path")]
    pub credentials_path: String,
    #[serde(default)]
    pub hashing: HashingConfig,
    #[serde(default)]
    pub seed_users: Vec<SeedUser>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            credentials_path: default_credentials_path(),
            hashing: HashingConfig::default(),
            seed_users: Vec::new(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// "pretty" or "json"
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

/// Prometheus metrics configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default)]
    pub enabled: bool,
}

// Default value functions
fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8001
}

fn default_title() -> String {
    "Routegate API".to_string()
}

fn default_methods_automatic() -> bool {
    true
}

fn default_methods() -> Vec<String> {
    vec!["GET".to_string()]
}

fn default_credentials_path() -> String {
    "user_credentials.json".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &str) -> Result<Self> {
        let config_path = Path::new(path);

        if !config_path.exists() {
            info!("Config file not found at {}, using defaults", path);
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file: {}", path))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path))?;

        info!("Loaded configuration from {}", path);
        Ok(config)
    }
}
