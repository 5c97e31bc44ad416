//! Rally configuration system.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{RallyError, Result};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RallyConfig {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub push: PushConfig,
    #[serde(default)]
    pub runner: RunnerConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
}

impl RallyConfig {
    /// Load config from the default path (~/.rally/config.toml).
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| RallyError::Config(format!("failed to read config: {e}")))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| RallyError::Config(format!("failed to parse config: {e}")))?;
        Ok(config)
    }

    /// Save config to the default path.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::default_path())
    }

    /// Save config to a specific path.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| RallyError::Config(format!("failed to serialize config: {e}")))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Get the rally home directory (~/.rally).
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".rally")
    }
}

/// Document store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// SQLite database path.
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> String {
    RallyConfig::home_dir()
        .join("rally.db")
        .to_string_lossy()
        .into_owned()
}

/// Messaging gateway client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushConfig {
    /// Multicast endpoint of the messaging gateway.
    #[serde(default = "default_push_endpoint")]
    pub endpoint: String,
    /// Bearer token for the gateway. Empty means "read RALLY_PUSH_API_KEY".
    #[serde(default)]
    pub api_key: String,
    /// Client-side timeout per multicast call. Bounds the runner's
    /// per-batch scan duration.
    #[serde(default = "default_push_timeout")]
    pub timeout_secs: u64,
}

impl PushConfig {
    /// Configured key, falling back to the RALLY_PUSH_API_KEY env var.
    pub fn resolve_api_key(&self) -> String {
        if !self.api_key.is_empty() {
            return self.api_key.clone();
        }
        std::env::var("RALLY_PUSH_API_KEY").unwrap_or_default()
    }
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            endpoint: default_push_endpoint(),
            api_key: String::new(),
            timeout_secs: default_push_timeout(),
        }
    }
}

fn default_push_endpoint() -> String {
    "http://127.0.0.1:8500/v1/send".into()
}

fn default_push_timeout() -> u64 {
    10
}

/// Due-reminder runner configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Seconds between due-reminder scans.
    #[serde(default = "default_runner_interval")]
    pub interval_secs: u64,
    /// Max reminders processed per scan.
    #[serde(default = "default_batch_limit")]
    pub batch_limit: usize,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_runner_interval(),
            batch_limit: default_batch_limit(),
        }
    }
}

fn default_runner_interval() -> u64 {
    60
}

fn default_batch_limit() -> usize {
    50
}

/// HTTP gateway configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".into()
}

fn default_port() -> u16 {
    3001
}
