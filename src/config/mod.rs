//! Configuration management for the numlog server
//!
//! Settings come from built-in defaults, an optional TOML file, and
//! `NUMLOG_*` environment variables. Command-line flags are applied on top
//! by the binary.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default TCP port
pub const DEFAULT_PORT: u16 = 4000;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Listener configuration
    pub server: ServerConfig,

    /// Code log configuration
    pub storage: StorageConfig,

    /// Interval report configuration
    pub report: ReportConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Listener and admission settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to listen on
    pub bind_address: SocketAddr,

    /// Maximum simultaneously served connections
    pub max_connections: usize,

    /// Longest accepted input line in bytes
    pub max_line_length: usize,

    /// Seconds to wait for connections to finish before force-closing them
    pub shutdown_grace_secs: u64,
}

/// Code log settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StorageConfig {
    /// Log file, truncated at startup
    pub log_path: PathBuf,
}

/// Interval report settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ReportConfig {
    /// Seconds between reports
    pub interval_secs: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json)
    pub format: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            max_connections: 5,
            max_line_length: 1024,
            shutdown_grace_secs: 5,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            log_path: PathBuf::from("numbers.log"),
        }
    }
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self { interval_secs: 10 }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: String::from("info"),
            format: String::from("text"),
        }
    }
}

impl Config {
    /// Load configuration from environment variables over the defaults
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env()?;
        Ok(config)
    }

    /// Load configuration from a TOML file; missing keys keep their defaults
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse TOML config file: {}", path.display()))?;

        Ok(config)
    }

    /// Override fields from `NUMLOG_*` environment variables
    pub fn apply_env(&mut self) -> Result<()> {
        if let Ok(addr) = std::env::var("NUMLOG_BIND_ADDRESS") {
            self.server.bind_address = addr
                .parse()
                .with_context(|| format!("Invalid NUMLOG_BIND_ADDRESS: {addr}"))?;
        }

        if let Some(max) = env_parse::<usize>("NUMLOG_MAX_CONNECTIONS")? {
            self.server.max_connections = max;
        }

        if let Some(len) = env_parse::<usize>("NUMLOG_MAX_LINE_LENGTH")? {
            self.server.max_line_length = len;
        }

        if let Some(secs) = env_parse::<u64>("NUMLOG_SHUTDOWN_GRACE_SECS")? {
            self.server.shutdown_grace_secs = secs;
        }

        if let Ok(path) = std::env::var("NUMLOG_LOG_PATH") {
            self.storage.log_path = PathBuf::from(path);
        }

        if let Some(secs) = env_parse::<u64>("NUMLOG_REPORT_INTERVAL_SECS")? {
            self.report.interval_secs = secs;
        }

        if let Ok(level) = std::env::var("NUMLOG_LOG_LEVEL") {
            self.logging.level = level;
        }

        if let Ok(format) = std::env::var("NUMLOG_LOG_FORMAT") {
            self.logging.format = format;
        }

        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.server.max_connections == 0 {
            anyhow::bail!("max_connections must be greater than 0");
        }

        if self.server.max_connections > tokio::sync::Semaphore::MAX_PERMITS {
            anyhow::bail!(
                "max_connections must be at most {}",
                tokio::sync::Semaphore::MAX_PERMITS
            );
        }

        if self.server.max_line_length == 0 {
            anyhow::bail!("max_line_length must be greater than 0");
        }

        if self.report.interval_secs == 0 {
            anyhow::bail!("report interval_secs must be greater than 0");
        }

        if self.storage.log_path.as_os_str().is_empty() {
            anyhow::bail!("log_path must not be empty");
        }

        match self.logging.format.as_str() {
            "text" | "json" => {}
            other => anyhow::bail!("Unknown log format '{other}' (expected text or json)"),
        }

        Ok(())
    }

    /// Report interval as Duration
    #[must_use]
    pub fn report_interval(&self) -> Duration {
        Duration::from_secs(self.report.interval_secs)
    }

    /// Shutdown grace period as Duration
    #[must_use]
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.server.shutdown_grace_secs)
    }
}

fn env_parse<T>(name: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(name) {
        Ok(value) => value
            .parse::<T>()
            .map(Some)
            .with_context(|| format!("Invalid {name}: {value}")),
        Err(_) => Ok(None),
    }
}
