use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::types::DEFAULT_NAMESPACE;

pub const CONFIG_ENV: &str = "ARK_CONFIG";
pub const DEFAULT_SERVER: &str = "http://127.0.0.1:8001";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file '{path}': {source}")]
    ParseError {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Config validation failed: {message}")]
    ValidationError { message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Namespace the Ark server watches for restores.
    pub namespace: String,
    /// Base URL of the Kubernetes API server (or `kubectl proxy`).
    pub server: String,
    pub token: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            server: DEFAULT_SERVER.to_string(),
            token: None,
        }
    }
}

impl Config {
    /// `$ARK_CONFIG` if set, otherwise `ark/config.toml` under the platform
    /// config directory.
    pub fn config_path() -> PathBuf {
        if let Some(path) = std::env::var_os(CONFIG_ENV) {
            return PathBuf::from(path);
        }
        let config_dir = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
        config_dir.join("ark").join("config.toml")
    }

    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_path())
    }

    /// A missing file yields the defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Config::default());
        }

        let content = fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.namespace.trim().is_empty() {
            return Err(ConfigError::ValidationError {
                message: "namespace must not be empty".to_string(),
            });
        }
        if self.server.trim().is_empty() {
            return Err(ConfigError::ValidationError {
                message: "server must not be empty".to_string(),
            });
        }
        Ok(())
    }
}
