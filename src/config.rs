use anyhow::{Context, Result};
use dirs::config_dir;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::repository::{Hosts, Selector, DEFAULT_API_HOST, DEFAULT_RAW_HOST};
use crate::transport::{Transport, MAX_ATTEMPTS};

/// Main configuration structure for orgaudit
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Config {
    /// GitHub hosts, credentials and which repositories to list
    #[serde(default)]
    pub github: GitHubConfig,

    /// HTTP timeouts and retry behavior
    #[serde(default)]
    pub http: HttpConfig,

    /// Repository exclusion settings
    #[serde(default)]
    pub audit: AuditConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// GitHub configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct GitHubConfig {
    /// REST API origin
    #[serde(default = "default_api_host")]
    pub api_host: String,

    /// Raw content origin for public repositories
    #[serde(default = "default_raw_host")]
    pub raw_host: String,

    /// Access token; `${VAR}` references are expanded on load
    #[serde(default)]
    pub token: Option<String>,

    /// Audit this organization
    #[serde(default)]
    pub organization: Option<String>,

    /// Audit this user (ignored when an organization is set)
    #[serde(default)]
    pub user: Option<String>,

    /// Stop listing after this many pages
    #[serde(default)]
    pub max_pages: Option<u32>,
}

/// HTTP configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct HttpConfig {
    /// Per-request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Attempts per request for rate limits and timeouts
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Seconds to wait beyond the rate-limit reset
    #[serde(default = "default_rate_limit_margin")]
    pub rate_limit_margin: u64,

    /// Repositories audited concurrently
    #[serde(default = "default_max_parallel")]
    pub max_parallel: usize,
}

/// Repository exclusion configuration
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct AuditConfig {
    /// Repository names, URLs or `/regex/` patterns to skip
    #[serde(default)]
    pub ignore: Vec<String>,

    /// Skip public repositories
    #[serde(default)]
    pub ignore_public: bool,
}

/// Logging configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String, // "info"
}

// Default value functions
fn default_api_host() -> String {
    DEFAULT_API_HOST.to_string()
}
fn default_raw_host() -> String {
    DEFAULT_RAW_HOST.to_string()
}
fn default_timeout() -> u64 {
    30
}
fn default_max_attempts() -> u32 {
    MAX_ATTEMPTS
}
fn default_rate_limit_margin() -> u64 {
    60
}
fn default_max_parallel() -> usize {
    4
}
fn default_log_level() -> String {
    "info".to_string()
}

// Default implementations
impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            api_host: default_api_host(),
            raw_host: default_raw_host(),
            token: None,
            organization: None,
            user: None,
            max_pages: None,
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: default_timeout(),
            max_attempts: default_max_attempts(),
            rate_limit_margin: default_rate_limit_margin(),
            max_parallel: default_max_parallel(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from the default location, or defaults if there is none
    pub fn load_or_default() -> Result<Self> {
        let config_path = Self::default_config_path()?;

        if config_path.exists() {
            Self::load(&config_path)
        } else {
            tracing::debug!("No configuration at {:?}, using defaults", config_path);
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let mut config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        config.expand_env()?;

        Ok(config)
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_yaml::to_string(self).context("Failed to serialize configuration")?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {:?}", path))?;

        Ok(())
    }

    /// Get the default configuration file path (XDG compliant)
    pub fn default_config_path() -> Result<PathBuf> {
        let config_dir = config_dir().context("Failed to get user config directory")?;

        Ok(config_dir.join("orgaudit").join("config.yml"))
    }

    /// Expand environment variables in the token
    pub fn expand_env(&mut self) -> Result<()> {
        if let Some(token) = &self.github.token {
            let expanded = shellexpand::env(token)
                .context("Failed to expand github.token")?
                .into_owned();
            self.github.token = Some(expanded).filter(|t| !t.trim().is_empty());
        }

        Ok(())
    }

    pub fn hosts(&self) -> Hosts {
        Hosts::new(&self.github.api_host, &self.github.raw_host)
    }

    pub fn selector(&self) -> Selector {
        Selector::from_options(
            self.github.organization.as_deref(),
            self.github.user.as_deref(),
        )
    }

    /// Build a transport with the configured timeout and retry budget
    pub fn transport(&self) -> Result<Transport> {
        let transport = Transport::new(Duration::from_secs(self.http.timeout))
            .context("Failed to create HTTP client")?
            .with_max_attempts(self.http.max_attempts)
            .with_rate_limit_margin(Duration::from_secs(self.http.rate_limit_margin));
        Ok(transport)
    }
}
