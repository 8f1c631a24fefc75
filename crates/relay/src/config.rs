//! Configuration management for the ChatRelay server and client.
//!
//! This module provides TOML-based configuration file loading and saving.
//! The default configuration path is `~/.config/chatrelay/config.toml`.

use std::fs;
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use protocol::WritePolicy;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Port used when none is configured.
pub const DEFAULT_PORT: u16 = 8888;

/// Upper bound for `reactor.read_chunk_size`.
const MAX_READ_CHUNK_SIZE: usize = 1024 * 1024;

/// Configuration validation errors.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{section}.host must not be empty")]
    EmptyHost { section: &'static str },

    #[error("{section} address {host}:{port} cannot be resolved")]
    UnresolvableAddress {
        section: &'static str,
        host: String,
        port: u16,
    },

    #[error("client.port must be greater than 0")]
    InvalidClientPort,

    #[error("event_capacity must be greater than 0")]
    InvalidEventCapacity,

    #[error("read_chunk_size must be between 1 and 1048576, got {0}")]
    InvalidReadChunkSize(usize),

    #[error("event_channel_capacity must be greater than 0")]
    InvalidEventChannelCapacity,

    #[error("log_level must be one of: trace, debug, info, warn, error; got {0}")]
    InvalidLogLevel(String),
}

/// Valid log level values for tracing configuration.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Main configuration structure shared by both binaries.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    /// Listening endpoint of the relay server.
    pub server: ServerConfig,

    /// Endpoint the console client connects to.
    pub client: ClientConfig,

    /// Reactor tuning.
    pub reactor: ReactorConfig,

    /// Logging settings.
    pub logging: LoggingConfig,
}

/// Listening endpoint of the relay server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// Interface to bind.
    pub host: String,

    /// Port to bind. Zero picks an ephemeral port.
    pub port: u16,
}

/// Endpoint the console client connects to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ClientConfig {
    /// Server host.
    pub host: String,

    /// Server port.
    pub port: u16,
}

/// Reactor tuning knobs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ReactorConfig {
    /// Maximum readiness events collected per wait.
    pub event_capacity: usize,

    /// Bytes requested per read call while draining a session.
    pub read_chunk_size: usize,

    /// Consecutive would-block results a single peer write tolerates.
    pub max_write_stalls: u32,

    /// Pause between would-block retries, in milliseconds.
    pub write_stall_backoff_ms: u64,

    /// Capacity of the reactor event channel.
    pub event_channel_capacity: usize,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Logging level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
        }
    }
}

impl Default for ReactorConfig {
    fn default() -> Self {
        Self {
            event_capacity: 128,
            read_chunk_size: protocol::DEFAULT_READ_CHUNK,
            max_write_stalls: protocol::DEFAULT_MAX_STALLS,
            write_stall_backoff_ms: 1,
            event_channel_capacity: 256,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

impl ReactorConfig {
    /// The write policy applied to every peer during a broadcast.
    pub fn write_policy(&self) -> WritePolicy {
        WritePolicy {
            max_stalls: self.max_write_stalls,
            stall_backoff: Duration::from_millis(self.write_stall_backoff_ms),
        }
    }
}

impl ServerConfig {
    /// Resolve the listening address.
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        resolve("server", &self.host, self.port)
    }
}

impl ClientConfig {
    /// Resolve the server address the client connects to.
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        resolve("client", &self.host, self.port)
    }
}

fn resolve(section: &'static str, host: &str, port: u16) -> Result<SocketAddr, ConfigError> {
    if host.is_empty() {
        return Err(ConfigError::EmptyHost { section });
    }

    (host, port)
        .to_socket_addrs()
        .ok()
        .and_then(|mut addrs| addrs.next())
        .ok_or_else(|| ConfigError::UnresolvableAddress {
            section,
            host: host.to_string(),
            port,
        })
}

/// Returns the default configuration file path.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("chatrelay")
        .join("config.toml")
}

impl Config {
    /// Apply environment variable overrides to the configuration.
    ///
    /// Environment variables take precedence over config file values.
    /// Supported variables:
    /// - CHATRELAY_HOST: Override the server and client host
    /// - CHATRELAY_PORT: Override the server and client port
    /// - CHATRELAY_LOG_LEVEL: Override log level (trace, debug, info, warn, error)
    pub fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("CHATRELAY_HOST") {
            if !host.is_empty() {
                tracing::info!("Overriding host from environment: {}", host);
                self.server.host = host.clone();
                self.client.host = host;
            }
        }

        if let Ok(port) = std::env::var("CHATRELAY_PORT") {
            if !port.is_empty() {
                match port.parse::<u16>() {
                    Ok(port) => {
                        tracing::info!("Overriding port from environment: {}", port);
                        self.server.port = port;
                        self.client.port = port;
                    }
                    Err(e) => {
                        tracing::warn!("Ignoring invalid CHATRELAY_PORT {:?}: {}", port, e);
                    }
                }
            }
        }

        if let Ok(level) = std::env::var("CHATRELAY_LOG_LEVEL") {
            if !level.is_empty() {
                tracing::info!("Overriding log_level from environment: {}", level);
                self.logging.log_level = level;
            }
        }
    }

    /// The tracing filter to start with, before overrides are applied.
    ///
    /// Verbose mode wins, then a non-empty CHATRELAY_LOG_LEVEL, then the
    /// configured level. This lets tracing come up ahead of
    /// [`Config::apply_env_overrides`] so its messages are not lost.
    pub fn log_filter(&self, verbose: bool) -> String {
        if verbose {
            return "debug".to_string();
        }
        match std::env::var("CHATRELAY_LOG_LEVEL") {
            Ok(level) if !level.is_empty() => level.to_lowercase(),
            _ => self.logging.log_level.to_lowercase(),
        }
    }

    /// Validate the configuration values.
    ///
    /// Returns an error if any configuration value is outside the valid range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.host.is_empty() {
            return Err(ConfigError::EmptyHost { section: "server" });
        }
        if self.client.host.is_empty() {
            return Err(ConfigError::EmptyHost { section: "client" });
        }

        // The server may bind port 0, the client cannot connect to it
        if self.client.port == 0 {
            return Err(ConfigError::InvalidClientPort);
        }

        if self.reactor.event_capacity == 0 {
            return Err(ConfigError::InvalidEventCapacity);
        }

        let chunk = self.reactor.read_chunk_size;
        if chunk == 0 || chunk > MAX_READ_CHUNK_SIZE {
            return Err(ConfigError::InvalidReadChunkSize(chunk));
        }

        if self.reactor.event_channel_capacity == 0 {
            return Err(ConfigError::InvalidEventChannelCapacity);
        }

        let level = self.logging.log_level.to_lowercase();
        if !VALID_LOG_LEVELS.contains(&level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(self.logging.log_level.clone()));
        }

        Ok(())
    }

    /// Load configuration from a file.
    ///
    /// If the file does not exist, returns the default configuration.
    /// If the file exists but is invalid TOML, returns an error with
    /// a helpful message.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_toml(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Load configuration from the default path.
    pub fn load_default() -> Result<Self> {
        Self::load(default_config_path())
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str)
            .map_err(|e| anyhow::anyhow!("Invalid TOML configuration: {}", format_toml_error(&e)))
    }

    /// Serialize configuration to a TOML string.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")
    }
}

/// Format a TOML deserialization error for user-friendly display.
fn format_toml_error(error: &toml::de::Error) -> String {
    let mut msg = error.message().to_string();

    if let Some(span) = error.span() {
        msg.push_str(&format!(" (at position {}..{})", span.start, span.end));
    }

    msg
}
