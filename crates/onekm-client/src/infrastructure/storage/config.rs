//! TOML configuration for the target host.
//!
//! Stored at `$XDG_CONFIG_HOME/onekm/client.toml` (or
//! `~/.config/onekm/client.toml`).  A missing file means defaults:
//!
//! ```toml
//! [listener]
//! kind = "tcp"
//! addr = "0.0.0.0:24800"
//!
//! [session]
//! burst_limit = 25
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::infrastructure::input_emulation::DEFAULT_INJECTION_DEVICE_NAME;
use crate::infrastructure::network::{
    DEFAULT_BURST_LIMIT, DEFAULT_LISTEN_ADDR, SUPPORTED_BAUD_RATES,
};

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not determine platform config directory")]
    NoPlatformConfigDir,

    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level target host configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ClientConfig {
    #[serde(default)]
    pub listener: ListenerConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub injection: InjectionConfig,
}

/// Where records come from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ListenerConfig {
    Tcp {
        #[serde(default = "default_listen_addr")]
        addr: String,
    },
    Serial {
        path: PathBuf,
        #[serde(default = "default_baud")]
        baud: u32,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionConfig {
    /// Records applied before yielding.
    #[serde(default = "default_burst_limit")]
    pub burst_limit: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InjectionConfig {
    /// uinput device name (Linux only).
    #[serde(default = "default_device_name")]
    pub device_name: String,
}

fn default_listen_addr() -> String {
    DEFAULT_LISTEN_ADDR.to_string()
}
fn default_baud() -> u32 {
    230_400
}
fn default_burst_limit() -> usize {
    DEFAULT_BURST_LIMIT
}
fn default_device_name() -> String {
    DEFAULT_INJECTION_DEVICE_NAME.to_string()
}

impl Default for ListenerConfig {
    fn default() -> Self {
        ListenerConfig::Tcp {
            addr: default_listen_addr(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            burst_limit: default_burst_limit(),
        }
    }
}

impl Default for InjectionConfig {
    fn default() -> Self {
        Self {
            device_name: default_device_name(),
        }
    }
}

impl ClientConfig {
    /// Rejects values the listener cannot run with.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.session.burst_limit == 0 {
            return Err(ConfigError::Invalid(
                "session.burst_limit must be non-zero".to_string(),
            ));
        }
        match &self.listener {
            ListenerConfig::Tcp { addr } if addr.trim().is_empty() => Err(ConfigError::Invalid(
                "listener.addr must not be empty".to_string(),
            )),
            ListenerConfig::Serial { baud, .. } if !SUPPORTED_BAUD_RATES.contains(baud) => {
                Err(ConfigError::Invalid(format!(
                    "listener.baud {baud} is not one of {SUPPORTED_BAUD_RATES:?}"
                )))
            }
            _ => Ok(()),
        }
    }
}

// ── Config repository ─────────────────────────────────────────────────────────

/// Resolves the default config file path.
///
/// # Errors
///
/// [`ConfigError::NoPlatformConfigDir`] when neither `XDG_CONFIG_HOME` nor
/// `HOME` is set.
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    let base = std::env::var_os("XDG_CONFIG_HOME")
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))
        .ok_or(ConfigError::NoPlatformConfigDir)?;
    Ok(base.join("onekm").join("client.toml"))
}

/// Loads a `ClientConfig` from `path`; a missing file yields defaults.
///
/// # Errors
///
/// [`ConfigError::Io`] for read failures other than "not found",
/// [`ConfigError::Parse`] for malformed TOML.
pub fn load_config(path: &Path) -> Result<ClientConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ClientConfig::default()),
        Err(source) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Writes `config` to `path`, creating parent directories as needed.
///
/// # Errors
///
/// [`ConfigError::Io`] or [`ConfigError::Serialize`].
pub fn save_config(path: &Path, config: &ClientConfig) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_listens_on_all_interfaces() {
        let cfg = ClientConfig::default();

        assert_eq!(
            cfg.listener,
            ListenerConfig::Tcp {
                addr: "0.0.0.0:24800".to_string()
            }
        );
        assert_eq!(cfg.session.burst_limit, 25);
        assert_eq!(cfg.injection.device_name, "OneKM Injection Device");
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_serial_listener_parses_with_default_baud() {
        // Arrange
        let toml_str = r#"
[listener]
kind = "serial"
path = "/dev/ttyGS0"
"#;

        // Act
        let cfg: ClientConfig = toml::from_str(toml_str).expect("deserialize serial");

        // Assert
        assert_eq!(
            cfg.listener,
            ListenerConfig::Serial {
                path: PathBuf::from("/dev/ttyGS0"),
                baud: 230_400
            }
        );
        assert_eq!(cfg.session, SessionConfig::default());
    }

    #[test]
    fn test_tcp_listener_without_addr_uses_default() {
        let cfg: ClientConfig =
            toml::from_str("[listener]\nkind = \"tcp\"\n").expect("deserialize tcp");
        assert_eq!(cfg.listener, ListenerConfig::default());
    }

    #[test]
    fn test_validate_rejects_zero_burst_limit() {
        let mut cfg = ClientConfig::default();
        cfg.session.burst_limit = 0;
        assert!(matches!(cfg.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_validate_rejects_unsupported_baud() {
        let cfg = ClientConfig {
            listener: ListenerConfig::Serial {
                path: PathBuf::from("/dev/ttyGS0"),
                baud: 57_600,
            },
            ..ClientConfig::default()
        };
        assert!(cfg.validate().unwrap_err().to_string().contains("57600"));
    }

    #[test]
    fn test_save_and_load_round_trip() {
        // Arrange
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("onekm").join("client.toml");
        let mut cfg = ClientConfig::default();
        cfg.session.burst_limit = 10;
        cfg.listener = ListenerConfig::Serial {
            path: PathBuf::from("/dev/ttyGS1"),
            baud: 921_600,
        };

        // Act
        save_config(&path, &cfg).unwrap();
        let loaded = load_config(&path).unwrap();

        // Assert
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = load_config(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(cfg, ClientConfig::default());
    }

    #[test]
    fn test_config_file_path_ends_with_client_toml() {
        if let Ok(path) = config_file_path() {
            assert!(path.ends_with("onekm/client.toml"), "got {path:?}");
        }
    }
}
