//! Configuration loading and config file resolution
//!
//! Config file resolution follows a fixed priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable (`BEATSYNC_CONFIG`)
//! 3. Per-user config directory (`<config_dir>/beatsync/config.toml`)
//! 4. Built-in defaults (no file)
//!
//! A missing config file is never fatal: a warning is logged and the built-in
//! defaults are used. A file that exists but does not parse is an error.

use crate::media::Granularity;
use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "BEATSYNC_CONFIG";

/// Environment variable carrying the player API access token
pub const ACCESS_TOKEN_ENV_VAR: &str = "BEATSYNC_ACCESS_TOKEN";

/// Gateway configuration loaded from TOML
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    /// HTTP port for the event stream and command endpoints
    pub port: u16,

    /// Player poll cadence (milliseconds)
    pub poll_interval_ms: u64,

    /// Slack added to the poll interval before a position jump counts as a seek
    pub drift_tolerance_ms: u64,

    /// Granularity used until an external command changes it
    pub default_granularity: Granularity,

    /// Event bus buffer size
    pub event_bus_capacity: usize,

    pub player: PlayerConfig,
    pub hardware: HardwareConfig,
    pub logging: LoggingConfig,
}

/// Remote player API settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    pub base_url: String,
    /// Bearer token; `BEATSYNC_ACCESS_TOKEN` takes precedence
    pub access_token: Option<String>,
    pub request_timeout_ms: u64,
}

/// Hardware output settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HardwareConfig {
    pub enabled: bool,
    /// Flash color as `#rrggbb`
    pub color: String,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            port: 5750,
            poll_interval_ms: 2000,
            drift_tolerance_ms: 1000,
            default_granularity: Granularity::Beat,
            event_bus_capacity: 256,
            player: PlayerConfig::default(),
            hardware: HardwareConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.spotify.com/v1".to_string(),
            access_token: None,
            request_timeout_ms: 5000,
        }
    }
}

impl Default for HardwareConfig {
    fn default() -> Self {
        Self {
            // Light hardware is only attached to the ARM boards
            enabled: cfg!(any(target_arch = "arm", target_arch = "aarch64")),
            color: "#ff0000".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl TomlConfig {
    /// Parse configuration from TOML text and validate it
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: TomlConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Resolve the config file and load it, falling back to defaults when absent
    pub fn load_or_default(cli_path: Option<&Path>) -> Result<Self> {
        let mut config = match resolve_config_path(cli_path) {
            Some(path) if path.exists() => {
                info!("Loading configuration from {}", path.display());
                Self::load(&path)?
            }
            Some(path) => {
                warn!("Config file {} not found, using defaults", path.display());
                Self::default()
            }
            None => {
                info!("No config file found, using defaults");
                Self::default()
            }
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) {
        if let Ok(token) = std::env::var(ACCESS_TOKEN_ENV_VAR) {
            if !token.trim().is_empty() {
                self.player.access_token = Some(token.trim().to_string());
            }
        }
    }

    /// Reject values the scheduler cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_ms == 0 {
            return Err(Error::Config("poll_interval_ms must be greater than zero".to_string()));
        }
        if self.event_bus_capacity == 0 {
            return Err(Error::Config("event_bus_capacity must be greater than zero".to_string()));
        }
        if self.player.base_url.trim().is_empty() {
            return Err(Error::Config("player.base_url must not be empty".to_string()));
        }
        parse_hex_color(&self.hardware.color)?;
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn drift_tolerance(&self) -> Duration {
        Duration::from_millis(self.drift_tolerance_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.player.request_timeout_ms)
    }
}

/// Pick the config file path by priority
///
/// Returns `None` when neither an explicit path nor a per-user file exists.
/// An explicit path (CLI or environment) is returned even if it does not exist,
/// so the caller can warn about it.
pub fn resolve_config_path(cli_path: Option<&Path>) -> Option<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_path {
        return Some(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    // Priority 3: per-user config directory
    default_config_path().filter(|path| path.exists())
}

/// `<config_dir>/beatsync/config.toml` for the current platform
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("beatsync").join("config.toml"))
}

/// Parse `#rrggbb` (leading `#` optional) into RGB components
pub fn parse_hex_color(value: &str) -> Result<(u8, u8, u8)> {
    let hex = value.trim().trim_start_matches('#');
    if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(Error::Config(format!("Invalid color {:?}, expected #rrggbb", value)));
    }
    let channel = |range: std::ops::Range<usize>| {
        u8::from_str_radix(&hex[range], 16)
            .map_err(|e| Error::Config(format!("Invalid color {:?}: {}", value, e)))
    };
    Ok((channel(0..2)?, channel(2..4)?, channel(4..6)?))
}
