//! Input capture infrastructure for the capture host.
//!
//! On Linux the devices are evdev nodes under `/dev/input`.  They are opened
//! non-blocking and read in a round-robin so that one busy mouse cannot
//! starve the keyboard.  Devices are only exclusively grabbed while control is
//! remote; in local mode events still reach the host's own input stack and
//! are read here solely to spot the hotkey.
//!
//! # Testability
//!
//! The [`CaptureSource`] trait lets the dispatch engine run against
//! [`mock::MockCaptureSource`] with scripted events and key states.

use std::path::PathBuf;
use std::time::Duration;

use onekm_core::KeyBitmap;

pub mod mock;

#[cfg(target_os = "linux")]
pub mod linux;

/// A raw event read from a capture device.
///
/// Only key and relative-motion classes are surfaced; synchronisation and
/// miscellaneous events are dropped at the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawInputEvent {
    /// `EV_KEY`: `value` is 0 (release), 1 (press) or 2 (autorepeat).
    Key { code: u16, value: i32 },
    /// `EV_REL`: signed delta on `axis`.
    Relative { axis: u16, delta: i32 },
}

/// Outcome of a best-effort grab or ungrab across all devices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GrabReport {
    pub succeeded: usize,
    pub failed: usize,
}

/// Error type for input capture operations.
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("no usable input devices found")]
    NoDevices,
    #[error("failed to open input device {path}: {source}")]
    DeviceOpen {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("key state query failed on {path}: {source}")]
    KeyState {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("platform not supported: {0}")]
    UnsupportedPlatform(String),
}

/// Trait abstracting the capture devices.
pub trait CaptureSource: Send {
    /// Human-readable names of the opened devices, for logging.
    fn device_names(&self) -> Vec<String>;

    /// Returns the next pending event without blocking.
    fn next_event(&mut self) -> Option<RawInputEvent>;

    /// Waits up to `timeout` for any device to become readable.
    ///
    /// Returns `true` if an event is (probably) available.
    fn wait_for_event(&mut self, timeout: Duration) -> bool;

    /// Grabs (`true`) or releases (`false`) every device.  Per-device
    /// failures are logged by the implementation and counted, never fatal.
    fn set_grab(&mut self, grab: bool) -> GrabReport;

    /// Hardware key state of all devices merged with a logical OR.
    fn hardware_key_state(&mut self) -> Result<KeyBitmap, CaptureError>;
}
