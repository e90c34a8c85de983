use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::defaults;
use crate::error::{ClientError, Result};

/// Client configuration
///
/// Every section falls back to its defaults, so a config file only needs
/// the keys it wants to change.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct ClientConfig {
    pub server: ServerConfig,
    pub reconnect: ReconnectConfig,
    pub console: ConsoleConfig,
    pub logging: LoggingConfig,
}

/// Where the base station listens
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Endpoint path; drivers use `/driver`
    pub path: String,
    /// Use `wss://` instead of `ws://`
    pub secure: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: defaults::DEFAULT_HOST.to_string(),
            port: defaults::DEFAULT_PORT,
            path: defaults::DEFAULT_DRIVER_PATH.to_string(),
            secure: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ReconnectConfig {
    /// Fixed delay between reconnect attempts (milliseconds)
    pub delay_ms: u64,
    /// Maximum consecutive attempts; unset retries forever
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            delay_ms: defaults::DEFAULT_RECONNECT_DELAY_MS,
            max_attempts: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ConsoleConfig {
    /// Lines kept before the oldest are dropped
    pub capacity: usize,
    /// Show `debug` level lines
    pub show_debug: bool,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            capacity: defaults::DEFAULT_CONSOLE_CAPACITY,
            show_debug: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// `tracing` filter used when `RUST_LOG` is unset
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: defaults::DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

impl ClientConfig {
    /// Create a new configuration with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a configuration from TOML text
    pub fn from_toml(text: &str) -> Result<Self> {
        let config: ClientConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration file
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml(&text)
    }

    /// Load the user config file if it exists, defaults otherwise
    pub fn load_or_default() -> Result<Self> {
        match Self::default_path() {
            Some(path) if path.exists() => {
                tracing::debug!("Loading config from {}", path.display());
                Self::load(&path)
            }
            _ => Ok(Self::default()),
        }
    }

    /// `<config dir>/roverlink/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| {
            dir.join(defaults::APP_DIR_NAME)
                .join(defaults::CONFIG_FILE_NAME)
        })
    }

    /// Base station endpoint URL
    pub fn url(&self) -> String {
        let scheme = if self.server.secure { "wss" } else { "ws" };
        let path = if self.server.path.starts_with('/') {
            self.server.path.clone()
        } else {
            format!("/{}", self.server.path)
        };
        format!("{scheme}://{}:{}{path}", self.server.host, self.server.port)
    }

    pub fn validate(&self) -> Result<()> {
        if self.server.host.trim().is_empty() {
            return Err(ClientError::Config("server.host must not be empty".into()));
        }
        if self.server.port == 0 {
            return Err(ClientError::Config("server.port must not be 0".into()));
        }
        if self.reconnect.delay_ms < defaults::MIN_RECONNECT_DELAY_MS {
            return Err(ClientError::Config(format!(
                "reconnect.delay_ms must be at least {}",
                defaults::MIN_RECONNECT_DELAY_MS
            )));
        }
        if self.console.capacity == 0 {
            return Err(ClientError::Config(
                "console.capacity must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Builder method for server configuration
    pub fn with_server(mut self, server: ServerConfig) -> Self {
        self.server = server;
        self
    }

    /// Builder method for reconnect configuration
    pub fn with_reconnect(mut self, reconnect: ReconnectConfig) -> Self {
        self.reconnect = reconnect;
        self
    }

    /// Builder method for console configuration
    pub fn with_console(mut self, console: ConsoleConfig) -> Self {
        self.console = console;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::new();
        assert_eq!(config.server.port, 11571);
        assert_eq!(config.reconnect.delay_ms, 5000);
        assert!(config.reconnect.max_attempts.is_none());
        assert_eq!(config.url(), "ws://localhost:11571/driver");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = ClientConfig::from_toml(
            r#"
            [server]
            host = "rover.example.org"
            secure = true

            [reconnect]
            max_attempts = 12
            "#,
        )
        .unwrap();

        assert_eq!(config.url(), "wss://rover.example.org:11571/driver");
        assert_eq!(config.reconnect.delay_ms, 5000);
        assert_eq!(config.reconnect.max_attempts, Some(12));
        assert_eq!(config.console, ConsoleConfig::default());
    }

    #[test]
    fn test_path_without_leading_slash() {
        let config = ClientConfig::new().with_server(ServerConfig {
            path: "driver".to_string(),
            ..ServerConfig::default()
        });
        assert_eq!(config.url(), "ws://localhost:11571/driver");
    }

    #[test]
    fn test_invalid_config_rejected() {
        let err = ClientConfig::from_toml("[server]\nport = 0\n").unwrap_err();
        assert!(matches!(err, ClientError::Config(_)));

        let err = ClientConfig::from_toml("[server\nport = ").unwrap_err();
        assert!(matches!(err, ClientError::Config(_)));
    }

    #[test]
    fn test_reconnect_delay_floor() {
        let err = ClientConfig::from_toml("[reconnect]\ndelay_ms = 0\n").unwrap_err();
        assert!(matches!(err, ClientError::Config(ref msg) if msg.contains("reconnect.delay_ms")));

        let config = ClientConfig::new().with_reconnect(ReconnectConfig {
            delay_ms: defaults::MIN_RECONNECT_DELAY_MS,
            max_attempts: None,
        });
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[console]\ncapacity = 20\nshow_debug = true").unwrap();

        let config = ClientConfig::load(file.path()).unwrap();
        assert_eq!(config.console.capacity, 20);
        assert!(config.console.show_debug);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = ClientConfig::load(&dir.path().join("nope.toml")).unwrap_err();
        assert!(matches!(err, ClientError::Io(_)));
    }
}
