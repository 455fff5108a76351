use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::ConfigError;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub scan: ScanConfig,
    pub classifier: ClassifierConfig,
    pub store: StoreConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Minimum spacing between scan cycles, enforced by both guards.
    pub interval_ms: u64,
    pub target_hosts: Vec<String>,
    pub reload_delay_ms: u64,
    pub liveness_check_secs: u64,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            interval_ms: 5000,
            target_hosts: vec!["x.com".to_string(), "twitter.com".to_string()],
            reload_delay_ms: 1000,
            liveness_check_secs: 60,
        }
    }
}

impl ScanConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn reload_delay(&self) -> Duration {
        Duration::from_millis(self.reload_delay_ms)
    }

    pub fn liveness_check_interval(&self) -> Duration {
        Duration::from_secs(self.liveness_check_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    pub endpoint: String,
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u32,
    pub top_p: f64,
    pub max_attempts: u32,
    pub retry_base_delay_ms: u64,
    pub request_timeout_secs: u64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.groq.com/openai/v1/chat/completions".to_string(),
            model: "llama-3.1-8b-instant".to_string(),
            temperature: 1.0,
            max_tokens: 1024,
            top_p: 1.0,
            max_attempts: 3,
            retry_base_delay_ms: 250,
            request_timeout_secs: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub database_url: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite://feedguard.db".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
        }
    }
}

impl AppConfig {
    /// Reads `path` if it exists; a missing file yields the defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::debug!("No config file at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
            path: path.display().to_string(),
        })?;
        Self::from_toml_str(&raw)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.scan.target_hosts.is_empty() {
            return Err(ConfigError::ValidationFailed {
                reason: "scan.target_hosts must name at least one host".to_string(),
            });
        }
        if self.classifier.max_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                field: "classifier.max_attempts".to_string(),
                value: "0".to_string(),
            });
        }
        if self.classifier.endpoint.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "classifier.endpoint".to_string(),
                value: String::new(),
            });
        }
        if self.classifier.model.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "classifier.model".to_string(),
                value: String::new(),
            });
        }
        Ok(())
    }
}
