//! HHR Queue Configuration
//!
//! Loads the queue configuration from a TOML or JSON file. The JSON form
//! accepts the legacy field names (`mongouri`, `appSri`, `retry`).

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Unsupported config format: {0}")]
    UnsupportedFormat(String),
    #[error("Invalid configuration: {}", .0.join("; "))]
    Invalid(Vec<String>),
}

impl From<ConfigError> for hq_common::QueueError {
    fn from(e: ConfigError) -> Self {
        hq_common::QueueError::Config(e.to_string())
    }
}

/// Queue service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QueueConfig {
    /// MongoDB connection string
    #[serde(alias = "mongouri")]
    pub store_uri: String,
    /// Database name inside the store
    #[serde(default = "default_database")]
    pub database: String,
    /// SServer (aggregation service) base URL
    pub server: String,
    /// Admin key for start/stop/reset and publisher management
    pub key: String,
    /// Application scope identifier sent to the gateway directory
    #[serde(alias = "appSri")]
    pub app_scope_id: String,
    /// Age in minutes after which untransferred received messages are retried
    #[serde(alias = "retry", default = "default_retry_minutes")]
    pub retry_minutes: u64,
    /// Delay between two deliveries of a drain pass
    #[serde(default = "default_pacing_ms")]
    pub pacing_ms: u64,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Accept self-signed certificates on HHR-Pro servers
    #[serde(default)]
    pub accept_invalid_certs: bool,
}

fn default_database() -> String { "hhr_queue".to_string() }
fn default_retry_minutes() -> u64 { 3 }
fn default_pacing_ms() -> u64 { 100 }
fn default_connect_timeout_secs() -> u64 { 10 }
fn default_request_timeout_secs() -> u64 { 30 }

impl QueueConfig {
    /// Minimal configuration, other fields take their defaults
    pub fn new(
        store_uri: impl Into<String>,
        server: impl Into<String>,
        key: impl Into<String>,
        app_scope_id: impl Into<String>,
    ) -> Self {
        Self {
            store_uri: store_uri.into(),
            database: default_database(),
            server: server.into(),
            key: key.into(),
            app_scope_id: app_scope_id.into(),
            retry_minutes: default_retry_minutes(),
            pacing_ms: default_pacing_ms(),
            connect_timeout_secs: default_connect_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            accept_invalid_certs: false,
        }
    }

    /// Load from a file, picking the parser from the extension
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let config = match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => Self::from_toml_str(&content)?,
            Some("json") => Self::from_json_str(&content)?,
            other => {
                return Err(ConfigError::UnsupportedFormat(
                    other.unwrap_or("<none>").to_string(),
                ))
            }
        };
        debug!(path = %path.display(), "Configuration loaded");
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn from_json_str(content: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(content)?)
    }

    /// Check every field and report all problems at once
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut problems = Vec::new();

        if self.store_uri.trim().is_empty() {
            problems.push("store_uri is required".to_string());
        }
        if !(self.server.starts_with("http://") || self.server.starts_with("https://")) {
            problems.push(format!("server must be an http(s) URL, got '{}'", self.server));
        }
        if self.key.is_empty() {
            problems.push("key is required".to_string());
        }
        if self.app_scope_id.is_empty() {
            problems.push("app_scope_id is required".to_string());
        }
        if self.retry_minutes == 0 {
            problems.push("retry_minutes must be at least 1".to_string());
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(problems))
        }
    }

    pub fn pacing(&self) -> Duration {
        Duration::from_millis(self.pacing_ms)
    }

    pub fn retry_window(&self) -> Duration {
        Duration::from_secs(self.retry_minutes * 60)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// SServer URL without a trailing slash
    pub fn server_base(&self) -> &str {
        self.server.trim_end_matches('/')
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_legacy_json_names() {
        let json = r#"{
            "mongouri": "mongodb://127.0.0.1/physioDOM_queue",
            "server": "http://127.0.0.1:8443",
            "key": "D9C7F19C-7588-4C39-91BB-FBFEFE1BE90A",
            "appSri": "app-1"
        }"#;
        let config = QueueConfig::from_json_str(json).unwrap();
        assert_eq!(config.store_uri, "mongodb://127.0.0.1/physioDOM_queue");
        assert_eq!(config.app_scope_id, "app-1");
        assert_eq!(config.retry_minutes, 3);
        assert_eq!(config.pacing(), Duration::from_millis(100));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_toml_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
store_uri = "mongodb://localhost:27017"
server = "https://sserver.example.com/"
key = "admin"
app_scope_id = "app-1"
retry_minutes = 5
pacing_ms = 250
"#
        )
        .unwrap();

        let config = QueueConfig::load(file.path()).unwrap();
        assert_eq!(config.retry_window(), Duration::from_secs(300));
        assert_eq!(config.pacing(), Duration::from_millis(250));
        assert_eq!(config.server_base(), "https://sserver.example.com");
        assert_eq!(config.database, "hhr_queue");
    }

    #[test]
    fn test_unknown_fields_rejected() {
        let json = r#"{"mongouri": "m", "server": "http://s", "key": "k", "appSri": "a", "port": 1}"#;
        assert!(QueueConfig::from_json_str(json).is_err());
    }

    #[test]
    fn test_validate_reports_every_problem() {
        let mut config = QueueConfig::new("", "ftp://sserver", "", "app");
        config.retry_minutes = 0;

        match config.validate() {
            Err(ConfigError::Invalid(problems)) => assert_eq!(problems.len(), 4),
            other => panic!("expected invalid config, got {:?}", other),
        }
    }

    #[test]
    fn test_unsupported_extension() {
        let file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        assert!(matches!(
            QueueConfig::load(file.path()),
            Err(ConfigError::UnsupportedFormat(_))
        ));
    }
}
