//! Server configuration.
//!
//! Values come from, lowest precedence first:
//! 1. Built-in defaults
//! 2. A TOML file (explicit path, or `screenhub/screenhubd.toml` under the
//!    user config directory when present)
//! 3. Environment variables (`SCREENHUB_BIND`, `SCREENHUB_PORT`)
//!
//! The host binary layers its command-line flags on top.
//!
//! ```toml
//! bind_address = "127.0.0.1"
//! port = 0
//! wire_format = "placeholder"
//! max_frame_length = 65536
//! tick_interval_ms = 20
//!
//! [[screens]]
//! name = "VICII"
//! ```

use std::env;
use std::fs;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use screenhub_protocol::{WireFormat, DEFAULT_MAX_FRAME_LENGTH, GREETING};

/// File name looked up in the user config directory.
pub const CONFIG_FILE_NAME: &str = "screenhubd.toml";

/// Environment variable overriding the bind address.
pub const ENV_BIND: &str = "SCREENHUB_BIND";

/// Environment variable overriding the port.
pub const ENV_PORT: &str = "SCREENHUB_PORT";

/// Default tick interval (50 ticks per second).
pub const DEFAULT_TICK_INTERVAL_MS: u64 = 20;

/// A screen the host binary registers at startup.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScreenConfig {
    pub name: String,
}

/// Configuration for a [`UiServer`](crate::server::UiServer).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// Loopback address to listen on.
    pub bind_address: Ipv4Addr,

    /// Port to listen on; 0 lets the OS choose.
    pub port: u16,

    pub wire_format: WireFormat,

    /// Largest accepted frame payload (length-prefixed format only).
    pub max_frame_length: usize,

    /// Host loop tick period in milliseconds.
    pub tick_interval_ms: u64,

    pub screens: Vec<ScreenConfig>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: Ipv4Addr::LOCALHOST,
            port: 0,
            wire_format: WireFormat::default(),
            max_frame_length: DEFAULT_MAX_FRAME_LENGTH,
            tick_interval_ms: DEFAULT_TICK_INTERVAL_MS,
            screens: Vec::new(),
        }
    }
}

impl ServerConfig {
    /// Loads configuration from the default sources.
    ///
    /// An explicit `path` must exist; the default config file is optional.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => match Self::default_path().filter(|p| p.exists()) {
                Some(path) => Self::from_file(&path)?,
                None => Self::default(),
            },
        };

        config.apply_overrides(|key| env::var(key).ok())?;
        Ok(config)
    }

    /// Parses a TOML config file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        let config: Self = toml::from_str(&contents).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        debug!(path = %path.display(), "Loaded config file");
        Ok(config)
    }

    /// `$XDG_CONFIG_HOME/screenhub/screenhubd.toml` or the platform equivalent.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("screenhub").join(CONFIG_FILE_NAME))
    }

    /// Applies `SCREENHUB_*` overrides read through `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(ENV_BIND) {
            self.bind_address = value.trim().parse().map_err(|e: std::net::AddrParseError| {
                ConfigError::InvalidEnv {
                    var: ENV_BIND,
                    value: value.clone(),
                    reason: e.to_string(),
                }
            })?;
        }

        if let Some(value) = lookup(ENV_PORT) {
            self.port = value.trim().parse().map_err(|e: std::num::ParseIntError| {
                ConfigError::InvalidEnv {
                    var: ENV_PORT,
                    value: value.clone(),
                    reason: e.to_string(),
                }
            })?;
        }

        Ok(())
    }

    /// Checks values that deserialize fine but cannot work.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.bind_address.is_loopback() {
            return Err(ConfigError::NonLoopback {
                address: self.bind_address,
            });
        }

        if self.max_frame_length < GREETING.len() {
            return Err(ConfigError::InvalidValue {
                field: "max_frame_length",
                reason: format!("must be at least {} bytes", GREETING.len()),
            });
        }

        if self.tick_interval_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "tick_interval_ms",
                reason: "must be greater than zero".to_string(),
            });
        }

        Ok(())
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

/// Errors that can occur while loading configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("Failed to read config {}: {error}", path.display())]
    Io { path: PathBuf, error: String },

    #[error("Invalid config {}: {error}", path.display())]
    Parse { path: PathBuf, error: String },

    #[error("Invalid {var}={value}: {reason}")]
    InvalidEnv {
        var: &'static str,
        value: String,
        reason: String,
    },

    #[error("Bind address {address} is not a loopback address")]
    NonLoopback { address: Ipv4Addr },

    #[error("Invalid {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_address, Ipv4Addr::LOCALHOST);
        assert_eq!(config.port, 0);
        assert_eq!(config.wire_format, WireFormat::Placeholder);
        assert_eq!(config.tick_interval(), Duration::from_millis(20));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
port = 6510
wire_format = "length-prefixed"
max_frame_length = 1024

[[screens]]
name = "VICII"

[[screens]]
name = "VDC"
"#
        )
        .unwrap();

        let config = ServerConfig::from_file(file.path()).unwrap();
        assert_eq!(config.port, 6510);
        assert_eq!(config.wire_format, WireFormat::LengthPrefixed);
        assert_eq!(config.max_frame_length, 1024);
        assert_eq!(config.bind_address, Ipv4Addr::LOCALHOST);
        assert_eq!(config.screens.len(), 2);
        assert_eq!(config.screens[1].name, "VDC");
    }

    #[test]
    fn test_unknown_field_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "listen_port = 1").unwrap();

        let err = ServerConfig::from_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = ServerConfig::load(Some(&dir.path().join("nope.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = ServerConfig::default();
        config
            .apply_overrides(lookup(&[(ENV_PORT, " 7000 "), (ENV_BIND, "127.0.0.2")]))
            .unwrap();
        assert_eq!(config.port, 7000);
        assert_eq!(config.bind_address, Ipv4Addr::new(127, 0, 0, 2));
    }

    #[test]
    fn test_bad_env_port() {
        let mut config = ServerConfig::default();
        let err = config
            .apply_overrides(lookup(&[(ENV_PORT, "seventy")]))
            .unwrap_err();
        assert!(err.to_string().contains(ENV_PORT));
        assert_eq!(config.port, 0);
    }

    #[test]
    fn test_validate_rejects_remote_bind() {
        let config = ServerConfig {
            bind_address: Ipv4Addr::new(0, 0, 0, 0),
            ..ServerConfig::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::NonLoopback {
                address: Ipv4Addr::UNSPECIFIED
            })
        );
    }

    #[test]
    fn test_validate_rejects_tiny_frames_and_zero_tick() {
        let tiny = ServerConfig {
            max_frame_length: 2,
            ..ServerConfig::default()
        };
        assert!(tiny.validate().is_err());

        let zero_tick = ServerConfig {
            tick_interval_ms: 0,
            ..ServerConfig::default()
        };
        assert!(zero_tick.validate().is_err());
    }
}
