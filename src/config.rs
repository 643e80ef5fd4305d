//! Bridge configuration
//!
//! Loaded from an optional TOML file, then overridden by command-line flags
//! and environment variables in `main.rs`.

use crate::error::{BridgeError, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BridgeConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub database: DatabaseConfig,

    /// Search backend; absent means every search uses the store fallback
    #[serde(default)]
    pub search: Option<SearchConfig>,
}

/// HTTP server and stream transport settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address
    pub addr: SocketAddr,

    /// Idle interval before a keep-alive comment is written to a stream
    #[serde(rename = "keepalive_secs", with = "serde_secs")]
    pub keepalive: Duration,

    /// Delay between a stream closing and its session being removed
    #[serde(rename = "cleanup_grace_ms", with = "serde_millis")]
    pub cleanup_grace: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: ([127, 0, 0, 1], 8765).into(),
            keepalive: Duration::from_secs(30),
            cleanup_grace: Duration::from_millis(1000),
        }
    }
}

/// Durable store settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// Search backend settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Base URL of the search service
    pub url: String,

    /// Bearer token, if the service requires one
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(
        rename = "timeout_secs",
        default = "default_search_timeout",
        with = "serde_secs"
    )]
    pub timeout: Duration,
}

impl SearchConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            api_key: None,
            timeout: default_search_timeout(),
        }
    }
}

fn default_search_timeout() -> Duration {
    Duration::from_secs(10)
}

/// Default database path under the platform data directory
pub fn default_db_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("memory-bridge")
        .join("memory-bridge.db")
}

// Durations are written as plain integers in TOML
mod serde_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

mod serde_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

impl BridgeConfig {
    /// Load configuration from TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            BridgeError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml(&contents)
    }

    /// Load configuration from TOML string
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: BridgeConfig = toml::from_str(toml_str)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.server.keepalive.is_zero() {
            return Err(BridgeError::Config(
                "server.keepalive_secs must be at least 1".to_string(),
            ));
        }

        if let Some(search) = &self.search {
            if search.url.trim().is_empty() {
                return Err(BridgeError::Config("search.url must not be empty".to_string()));
            }
            if search.timeout.is_zero() {
                return Err(BridgeError::Config(
                    "search.timeout_secs must be at least 1".to_string(),
                ));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = BridgeConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.server.keepalive, Duration::from_secs(30));
        assert_eq!(config.server.cleanup_grace, Duration::from_millis(1000));
        assert!(config.search.is_none());
    }

    #[test]
    fn test_from_toml() {
        let config = BridgeConfig::from_toml(
            r#"
            [server]
            addr = "0.0.0.0:9000"
            keepalive_secs = 15
            cleanup_grace_ms = 250

            [database]
            path = "/tmp/bridge.db"

            [search]
            url = "http://localhost:8000"
            "#,
        )
        .unwrap();

        assert_eq!(config.server.addr.port(), 9000);
        assert_eq!(config.server.keepalive, Duration::from_secs(15));
        assert_eq!(config.server.cleanup_grace, Duration::from_millis(250));
        assert_eq!(config.database.path, PathBuf::from("/tmp/bridge.db"));

        let search = config.search.unwrap();
        assert_eq!(search.url, "http://localhost:8000");
        assert_eq!(search.timeout, Duration::from_secs(10));
        assert!(search.api_key.is_none());
    }

    #[test]
    fn test_validate_zero_keepalive() {
        let result = BridgeConfig::from_toml(
            r#"
            [server]
            addr = "127.0.0.1:8765"
            keepalive_secs = 0
            cleanup_grace_ms = 1000
            "#,
        );

        assert!(result
            .unwrap_err()
            .to_string()
            .contains("keepalive_secs must be at least 1"));
    }

    #[test]
    fn test_invalid_toml() {
        let result = BridgeConfig::from_toml("[server\naddr = ");
        assert!(matches!(result, Err(BridgeError::Config(_))));
    }
}
