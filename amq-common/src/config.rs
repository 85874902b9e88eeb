//! Configuration loading
//!
//! Settings are resolved in priority order:
//! 1. Command-line arguments (highest priority)
//! 2. Environment variables (`AMQ_HOST`, `AMQ_PORT`, `AMQ_CONFIG`)
//! 3. TOML config file (explicit path, else `<config dir>/amq/config.toml`)
//! 4. Compiled defaults (fallback)
//!
//! A missing default config file is not an error. An explicitly named file that cannot be
//! read or parsed is.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const ENV_HOST: &str = "AMQ_HOST";
pub const ENV_PORT: &str = "AMQ_PORT";
pub const ENV_CONFIG: &str = "AMQ_CONFIG";

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 50051;

/// Configuration file contents
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TomlConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub timeouts: TimeoutConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Where the audio manager server lives
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Use `wss://` and `https://` instead of `ws://` and `http://`
    #[serde(default)]
    pub secure: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            secure: false,
        }
    }
}

/// Client-side deadlines, all in milliseconds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeoutConfig {
    /// Remove lock release deadline
    #[serde(default = "default_remove_ms")]
    pub remove_ms: u64,

    /// Reorder commit lock release deadline
    #[serde(default = "default_move_ms")]
    pub move_ms: u64,

    /// Guard on set-audio-progress after a scrub
    #[serde(default = "default_progress_ms")]
    pub progress_ms: u64,

    /// Delay between scrub release and the progress command
    #[serde(default = "default_scrub_grace_ms")]
    pub scrub_grace_ms: u64,

    /// Max silence on a stream before it is considered dead (0 disables)
    #[serde(default = "default_heartbeat_ms")]
    pub heartbeat_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            remove_ms: default_remove_ms(),
            move_ms: default_move_ms(),
            progress_ms: default_progress_ms(),
            scrub_grace_ms: default_scrub_grace_ms(),
            heartbeat_ms: default_heartbeat_ms(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_host() -> String {
    DEFAULT_HOST.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_remove_ms() -> u64 {
    3000
}

fn default_move_ms() -> u64 {
    500
}

fn default_progress_ms() -> u64 {
    1000
}

fn default_scrub_grace_ms() -> u64 {
    200
}

fn default_heartbeat_ms() -> u64 {
    600
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Command-line configuration overrides
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub config_path: Option<PathBuf>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub secure: Option<bool>,
    pub log_level: Option<String>,
}

impl TomlConfig {
    /// Parse a config file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Failed to parse TOML {:?}: {}", path, e)))
    }

    /// Resolve the effective configuration
    pub fn load(overrides: &ConfigOverrides) -> Result<Self> {
        let mut config = match resolve_config_path(overrides.config_path.as_deref()) {
            ConfigSource::Explicit(path) => {
                let config = Self::from_file(&path)?;
                info!("Loaded configuration from {:?}", path);
                config
            }
            ConfigSource::Default(path) if path.exists() => {
                let config = Self::from_file(&path)?;
                info!("Loaded configuration from {:?}", path);
                config
            }
            ConfigSource::Default(path) => {
                info!("No config file at {:?}, using defaults", path);
                Self::default()
            }
            ConfigSource::None => {
                info!("No config directory on this platform, using defaults");
                Self::default()
            }
        };

        // Environment beats the file
        if let Ok(host) = std::env::var(ENV_HOST) {
            if !host.trim().is_empty() {
                config.server.host = host;
            }
        }
        if let Ok(port) = std::env::var(ENV_PORT) {
            match port.trim().parse::<u16>() {
                Ok(port) => config.server.port = port,
                Err(e) => warn!("Ignoring {}={:?}: {}", ENV_PORT, port, e),
            }
        }

        // Command line beats everything
        if let Some(host) = &overrides.host {
            config.server.host = host.clone();
        }
        if let Some(port) = overrides.port {
            config.server.port = port;
        }
        if let Some(secure) = overrides.secure {
            config.server.secure = secure;
        }
        if let Some(level) = &overrides.log_level {
            config.logging.level = level.clone();
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject values no client could use
    pub fn validate(&self) -> Result<()> {
        if self.server.host.trim().is_empty() {
            return Err(Error::Config("server.host must not be empty".to_string()));
        }
        if self.server.port == 0 {
            return Err(Error::Config("server.port must not be 0".to_string()));
        }
        if self.timeouts.remove_ms == 0 || self.timeouts.move_ms == 0 || self.timeouts.progress_ms == 0 {
            return Err(Error::Config(
                "command timeouts must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

enum ConfigSource {
    Explicit(PathBuf),
    Default(PathBuf),
    None,
}

fn resolve_config_path(cli_arg: Option<&Path>) -> ConfigSource {
    if let Some(path) = cli_arg {
        return ConfigSource::Explicit(path.to_path_buf());
    }

    if let Ok(path) = std::env::var(ENV_CONFIG) {
        if !path.trim().is_empty() {
            return ConfigSource::Explicit(PathBuf::from(path));
        }
    }

    match default_config_path() {
        Some(path) => ConfigSource::Default(path),
        None => ConfigSource::None,
    }
}

/// Platform config file location (`~/.config/amq/config.toml` on Linux)
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("amq").join("config.toml"))
}
