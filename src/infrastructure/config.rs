//! Configuration management for the harness
//!
//! Loads configuration from config.toml at startup.
//! All values are configurable to avoid hardcoded constants.

use crate::strategy::ConsumptionStrategy;
use crate::worker::WorkerSettings;
use reqwest::Url;
use serde::Deserialize;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Harness Configuration
///
/// Loaded from config.toml at startup. Every table is optional and falls
/// back to its defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Worker loop settings
    #[serde(default)]
    pub harness: HarnessConfig,

    /// Greeting/stats server settings
    #[serde(default)]
    pub server: ServerConfig,

    /// Outgoing HTTP client settings
    #[serde(default)]
    pub client: ClientConfig,

    /// Response buffer pool settings
    #[serde(default)]
    pub buffers: BufferConfig,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Worker loop configuration
#[derive(Debug, Clone, Deserialize)]
pub struct HarnessConfig {
    /// Consumption strategy used by every worker
    #[serde(default)]
    pub method: ConsumptionStrategy,

    /// Number of concurrent workers
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Wait between iterations, in milliseconds
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

/// HTTP client configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    /// Target service; defaults to this process's own server
    #[serde(default)]
    pub base_url: Option<String>,

    /// Per-request timeout in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

/// Buffer pool configuration
#[derive(Debug, Clone, Deserialize)]
pub struct BufferConfig {
    /// Number of pre-allocated buffers
    #[serde(default = "default_pool_capacity")]
    pub pool_capacity: usize,

    /// Initial capacity of each buffer in bytes
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Filter used when RUST_LOG is not set
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Directory for daily JSON log files; console only when unset
    #[serde(default)]
    pub directory: Option<PathBuf>,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            method: ConsumptionStrategy::default(),
            workers: default_workers(),
            delay_ms: default_delay_ms(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            pool_capacity: default_pool_capacity(),
            buffer_size: default_buffer_size(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            directory: None,
        }
    }
}

fn default_workers() -> usize {
    1
}

fn default_delay_ms() -> u64 {
    50
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_timeout_ms() -> u64 {
    5000
}

fn default_pool_capacity() -> usize {
    64
}

fn default_buffer_size() -> usize {
    4096
}

fn default_log_level() -> String {
    "info".to_string()
}

impl HarnessConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    pub fn worker_settings(&self) -> WorkerSettings {
        WorkerSettings {
            strategy: self.method,
            worker_count: self.workers,
            delay: self.delay(),
        }
    }
}

impl ServerConfig {
    /// Address to bind the server to
    ///
    /// # Errors
    /// Returns [`ConfigError::Invalid`] if `host` is not an IP address.
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|_| ConfigError::Invalid(format!("server.host '{}' is not an IP address", self.host)))?;
        Ok(SocketAddr::new(ip, self.port))
    }
}

impl ClientConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Config {
    /// Load configuration from config.toml file
    ///
    /// The path can be overridden with `CONFIG_PATH`. If the file doesn't
    /// exist, returns default configuration.
    /// # Errors
    /// Returns error if file exists but cannot be parsed or is invalid.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path =
            std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config.toml".to_string());
        Self::load_from(config_path)
    }

    /// Load configuration from `path`, falling back to defaults if it doesn't exist
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path.as_ref()) {
            Ok(contents) => Self::from_toml_str(&contents),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // File not found - use defaults
                Ok(Config::default())
            }
            Err(e) => Err(ConfigError::IoError(e)),
        }
    }

    /// Parse and validate a TOML document
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: Config =
            toml::from_str(contents).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the harness cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.client.timeout_ms == 0 {
            return Err(ConfigError::Invalid("client.timeout_ms must be positive".to_string()));
        }
        if let Some(url) = &self.client.base_url {
            let parsed = Url::parse(url)
                .map_err(|e| ConfigError::Invalid(format!("client.base_url '{}': {}", url, e)))?;
            // Request paths are absolute and would replace any prefix
            if parsed.path() != "/" {
                return Err(ConfigError::Invalid(format!(
                    "client.base_url '{}' must not have a path",
                    url
                )));
            }
        }
        self.server.socket_addr()?;
        Ok(())
    }

    /// Base URL the workers target
    pub fn base_url(&self) -> String {
        match &self.client.base_url {
            Some(url) => url.clone(),
            None => format!("http://{}:{}", self.server.host, self.server.port),
        }
    }
}

/// Configuration loading errors
#[derive(Debug)]
pub enum ConfigError {
    /// IO error reading file
    IoError(std::io::Error),
    /// Parse error (invalid TOML)
    ParseError(String),
    /// Well-formed but unusable value
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "Failed to read config file: {}", e),
            ConfigError::ParseError(e) => write!(f, "Failed to parse config: {}", e),
            ConfigError::Invalid(e) => write!(f, "Invalid config: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::IoError(e) => Some(e),
            ConfigError::ParseError(_) | ConfigError::Invalid(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.harness.method, ConsumptionStrategy::Retrieve);
        assert_eq!(config.harness.workers, 1);
        assert_eq!(config.harness.delay(), Duration::from_millis(50));
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.client.timeout(), Duration::from_secs(5));
        assert_eq!(config.base_url(), "http://127.0.0.1:8080");
    }

    #[test]
    fn test_toml_parsing() {
        let toml_str = r#"
            [harness]
            method = "exchange_release"
            workers = 4
            delay_ms = 10

            [server]
            host = "0.0.0.0"
            port = 9000

            [client]
            base_url = "http://localhost:9000"

            [buffers]
            pool_capacity = 8

            [logging]
            level = "debug"
        "#;

        let config = Config::from_toml_str(toml_str).unwrap();
        let settings = config.harness.worker_settings();
        assert_eq!(settings.strategy, ConsumptionStrategy::ExchangeRelease);
        assert_eq!(settings.worker_count, 4);
        assert_eq!(settings.delay, Duration::from_millis(10));
        assert_eq!(config.server.socket_addr().unwrap().port(), 9000);
        assert_eq!(config.base_url(), "http://localhost:9000");
        assert_eq!(config.buffers.pool_capacity, 8);
        assert_eq!(config.buffers.buffer_size, 4096);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_zero_workers_allowed() {
        let config = Config::from_toml_str("[harness]\nworkers = 0\n").unwrap();
        assert_eq!(config.harness.workers, 0);
    }

    #[test]
    fn test_unknown_method_rejected() {
        let result = Config::from_toml_str("[harness]\nmethod = \"stream\"\n");
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_invalid_values_rejected() {
        let zero_timeout = Config::from_toml_str("[client]\ntimeout_ms = 0\n");
        assert!(matches!(zero_timeout, Err(ConfigError::Invalid(_))));

        let bad_url = Config::from_toml_str("[client]\nbase_url = \"::nope\"\n");
        assert!(matches!(bad_url, Err(ConfigError::Invalid(_))));

        let bad_host = Config::from_toml_str("[server]\nhost = \"localhost\"\n");
        assert!(matches!(bad_host, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_base_url_with_path_rejected() {
        let prefixed = Config::from_toml_str("[client]\nbase_url = \"http://host:9000/api\"\n");
        assert!(matches!(prefixed, Err(ConfigError::Invalid(_))));

        let root = Config::from_toml_str("[client]\nbase_url = \"http://host:9000/\"\n");
        assert!(root.is_ok());
    }

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("harness-config-{}-{}", std::process::id(), name))
    }

    #[test]
    fn test_load_missing_file_gives_defaults() {
        let config = Config::load_from(temp_path("missing.toml")).unwrap();
        assert_eq!(config.harness.workers, 1);
        assert_eq!(config.harness.method, ConsumptionStrategy::Retrieve);
    }

    #[test]
    fn test_load_reads_file() {
        let path = temp_path("present.toml");
        std::fs::write(&path, "[harness]\nmethod = \"exchange\"\nworkers = 3\n").unwrap();

        let config = Config::load_from(&path).unwrap();
        let _ = std::fs::remove_file(&path);

        assert_eq!(config.harness.method, ConsumptionStrategy::Exchange);
        assert_eq!(config.harness.workers, 3);
    }

    #[test]
    fn test_load_rejects_bad_file() {
        let path = temp_path("broken.toml");
        std::fs::write(&path, "[harness\nworkers = ").unwrap();

        let result = Config::load_from(&path);
        let _ = std::fs::remove_file(&path);

        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_load_directory_is_io_error() {
        let result = Config::load_from(std::env::temp_dir());
        assert!(matches!(result, Err(ConfigError::IoError(_))));
    }
}
