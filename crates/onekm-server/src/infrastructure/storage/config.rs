//! TOML configuration for the capture host.
//!
//! The file lives at `$XDG_CONFIG_HOME/onekm/server.toml` (falling back to
//! `~/.config/onekm/server.toml`).  Every field is optional; a missing file or
//! section yields the documented defaults.  Example:
//!
//! ```toml
//! [control]
//! hotkey = 119          # evdev KEY_PAUSE
//!
//! [dispatch]
//! key_forwarding = "report"
//!
//! [transport]
//! kind = "serial"
//! path = "/dev/ttyACM0"
//! baud = 230400
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use onekm_core::domain::control::{DEFAULT_CHORD_PRESSES, DEFAULT_CHORD_WINDOW};
use onekm_core::domain::motion::{
    DEFAULT_HEARTBEAT_BURST, DEFAULT_HEARTBEAT_INTERVAL, DEFAULT_MIN_FLUSH_INTERVAL,
};
use onekm_core::keymap::evdev::{KEY_DOMAIN, KEY_PAUSE};
use onekm_core::{ChordDetector, Heartbeat, MotionCoalescer};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::application::dispatch::{EngineConfig, KeyForwarding};
use crate::infrastructure::transport::{
    DEFAULT_BAUD_RATE, DEFAULT_SERIAL_PATH, SUPPORTED_BAUD_RATES,
};
use crate::infrastructure::virtual_keyboard::DEFAULT_KEY_SYNC_DEVICE_NAME;

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The platform config directory could not be determined.
    #[error("could not determine platform config directory")]
    NoPlatformConfigDir,

    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// The config could not be serialized to TOML.
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// A value is out of range.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level capture host configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    #[serde(default)]
    pub control: ControlConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub motion: MotionConfig,
    #[serde(default)]
    pub heartbeat: HeartbeatConfig,
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub key_sync: KeySyncConfig,
    #[serde(default)]
    pub transport: TransportConfig,
}

/// Hotkey and chord settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ControlConfig {
    /// evdev key code of the switch hotkey.
    #[serde(default = "default_hotkey")]
    pub hotkey: u16,
    /// Window within which `chord_presses` hotkey presses request shutdown.
    #[serde(default = "default_chord_window_ms")]
    pub chord_window_ms: u64,
    #[serde(default = "default_chord_presses")]
    pub chord_presses: usize,
}

/// Dispatch loop pacing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DispatchConfig {
    /// Maximum events handled per tick while forwarding.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Maximum events scanned for the hotkey per tick while local.
    #[serde(default = "default_local_drain_limit")]
    pub local_drain_limit: usize,
    #[serde(default = "default_local_poll_timeout_ms")]
    pub local_poll_timeout_ms: u64,
    #[serde(default = "default_local_idle_sleep_ms")]
    pub local_idle_sleep_ms: u64,
    #[serde(default = "default_remote_idle_sleep_ms")]
    pub remote_idle_sleep_ms: u64,
    #[serde(default = "default_heartbeat_sleep_ms")]
    pub heartbeat_sleep_ms: u64,
    #[serde(default)]
    pub key_forwarding: KeyForwarding,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MotionConfig {
    /// Minimum spacing between opportunistic motion flushes, in microseconds.
    #[serde(default = "default_min_flush_interval_us")]
    pub min_flush_interval_us: u64,
}

/// Idle keep-alive sent to the target host while control is local.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HeartbeatConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_heartbeat_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_heartbeat_burst")]
    pub burst_len: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CaptureConfig {
    #[serde(default = "default_max_devices")]
    pub max_devices: usize,
    /// Explicit evdev nodes.  Empty means scan `/dev/input`.
    #[serde(default)]
    pub device_paths: Vec<PathBuf>,
}

/// Local virtual keyboard used to release keys the host still thinks are held.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KeySyncConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_inject_delay_ms")]
    pub inject_delay_ms: u64,
    #[serde(default = "default_key_sync_device_name")]
    pub device_name: String,
}

/// Link to the target host.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum TransportConfig {
    Serial {
        #[serde(default = "default_serial_path")]
        path: PathBuf,
        #[serde(default = "default_baud")]
        baud: u32,
    },
    Tcp {
        /// `host:port` of the target host's listener.
        addr: String,
    },
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_hotkey() -> u16 {
    KEY_PAUSE
}
fn default_chord_window_ms() -> u64 {
    DEFAULT_CHORD_WINDOW.as_millis() as u64
}
fn default_chord_presses() -> usize {
    DEFAULT_CHORD_PRESSES
}
fn default_batch_size() -> usize {
    20
}
fn default_local_drain_limit() -> usize {
    64
}
fn default_local_poll_timeout_ms() -> u64 {
    1
}
fn default_local_idle_sleep_ms() -> u64 {
    50
}
fn default_remote_idle_sleep_ms() -> u64 {
    1
}
fn default_heartbeat_sleep_ms() -> u64 {
    5
}
fn default_min_flush_interval_us() -> u64 {
    DEFAULT_MIN_FLUSH_INTERVAL.as_micros() as u64
}
fn default_true() -> bool {
    true
}
fn default_heartbeat_interval_secs() -> u64 {
    DEFAULT_HEARTBEAT_INTERVAL.as_secs()
}
fn default_heartbeat_burst() -> u32 {
    DEFAULT_HEARTBEAT_BURST
}
fn default_max_devices() -> usize {
    10
}
fn default_inject_delay_ms() -> u64 {
    1
}
fn default_key_sync_device_name() -> String {
    DEFAULT_KEY_SYNC_DEVICE_NAME.to_string()
}
fn default_serial_path() -> PathBuf {
    PathBuf::from(DEFAULT_SERIAL_PATH)
}
fn default_baud() -> u32 {
    DEFAULT_BAUD_RATE
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            hotkey: default_hotkey(),
            chord_window_ms: default_chord_window_ms(),
            chord_presses: default_chord_presses(),
        }
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            local_drain_limit: default_local_drain_limit(),
            local_poll_timeout_ms: default_local_poll_timeout_ms(),
            local_idle_sleep_ms: default_local_idle_sleep_ms(),
            remote_idle_sleep_ms: default_remote_idle_sleep_ms(),
            heartbeat_sleep_ms: default_heartbeat_sleep_ms(),
            key_forwarding: KeyForwarding::default(),
        }
    }
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            min_flush_interval_us: default_min_flush_interval_us(),
        }
    }
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            interval_secs: default_heartbeat_interval_secs(),
            burst_len: default_heartbeat_burst(),
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            max_devices: default_max_devices(),
            device_paths: Vec::new(),
        }
    }
}

impl Default for KeySyncConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            inject_delay_ms: default_inject_delay_ms(),
            device_name: default_key_sync_device_name(),
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        TransportConfig::Serial {
            path: default_serial_path(),
            baud: default_baud(),
        }
    }
}

// ── Validation and conversion ─────────────────────────────────────────────────

impl ServerConfig {
    /// Rejects values the engine cannot run with.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| -> Result<(), ConfigError> { Err(ConfigError::Invalid(msg)) };

        if self.control.hotkey == 0 || self.control.hotkey as usize >= KEY_DOMAIN {
            return invalid(format!(
                "control.hotkey must be in 1..{KEY_DOMAIN}, got {}",
                self.control.hotkey
            ));
        }
        if self.control.chord_presses < 2 {
            return invalid("control.chord_presses must be at least 2".to_string());
        }
        if self.control.chord_window_ms == 0 {
            return invalid("control.chord_window_ms must be non-zero".to_string());
        }
        if self.dispatch.batch_size == 0 {
            return invalid("dispatch.batch_size must be non-zero".to_string());
        }
        if self.dispatch.local_drain_limit == 0 {
            return invalid("dispatch.local_drain_limit must be non-zero".to_string());
        }
        if self.capture.max_devices == 0 {
            return invalid("capture.max_devices must be non-zero".to_string());
        }
        match &self.transport {
            TransportConfig::Serial { baud, .. } if !SUPPORTED_BAUD_RATES.contains(baud) => {
                invalid(format!(
                    "transport.baud {baud} is not one of {SUPPORTED_BAUD_RATES:?}"
                ))
            }
            TransportConfig::Tcp { addr } if addr.trim().is_empty() => {
                invalid("transport.addr must not be empty".to_string())
            }
            _ => Ok(()),
        }
    }

    /// Dispatch loop settings.
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            hotkey: self.control.hotkey,
            batch_size: self.dispatch.batch_size,
            local_drain_limit: self.dispatch.local_drain_limit,
            local_poll_timeout: Duration::from_millis(self.dispatch.local_poll_timeout_ms),
            local_idle_sleep: Duration::from_millis(self.dispatch.local_idle_sleep_ms),
            remote_idle_sleep: Duration::from_millis(self.dispatch.remote_idle_sleep_ms),
            heartbeat_sleep: Duration::from_millis(self.dispatch.heartbeat_sleep_ms),
            key_forwarding: self.dispatch.key_forwarding,
        }
    }

    pub fn chord_detector(&self) -> ChordDetector {
        ChordDetector::new(
            Duration::from_millis(self.control.chord_window_ms),
            self.control.chord_presses,
        )
    }

    pub fn motion_coalescer(&self) -> MotionCoalescer {
        MotionCoalescer::new(Duration::from_micros(self.motion.min_flush_interval_us))
    }

    pub fn heartbeat(&self) -> Heartbeat {
        if self.heartbeat.enabled {
            Heartbeat::new(
                Duration::from_secs(self.heartbeat.interval_secs),
                self.heartbeat.burst_len,
            )
        } else {
            Heartbeat::disabled()
        }
    }
}

// ── Config repository ─────────────────────────────────────────────────────────

/// Determines the platform-appropriate directory for the config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] when neither
/// `XDG_CONFIG_HOME` nor `HOME` is set.
pub fn config_dir() -> Result<PathBuf, ConfigError> {
    platform_config_dir().ok_or(ConfigError::NoPlatformConfigDir)
}

/// Resolves the default config file path.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] if the base directory cannot be
/// determined.
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    Ok(config_dir()?.join("server.toml"))
}

/// Loads a `ServerConfig` from `path`, returning defaults if the file does not
/// exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config(path: &Path) -> Result<ServerConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ServerConfig::default()),
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
/// Returns [`ConfigError::Io`] for file-system failures or
/// [`ConfigError::Serialize`] if serialization fails.
pub fn save_config(path: &Path, config: &ServerConfig) -> Result<(), ConfigError> {
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

fn platform_config_dir() -> Option<PathBuf> {
    let base = std::env::var_os("XDG_CONFIG_HOME")
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
    Some(base.join("onekm"))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
