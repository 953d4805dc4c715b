//! Platform input emulators.
//!
//! The implementation is selected at compile time via `#[cfg(target_os = ...)]`.

pub mod mock;

/// Name the Linux injection device registers under unless configured.
pub const DEFAULT_INJECTION_DEVICE_NAME: &str = "OneKM Injection Device";

#[cfg(target_os = "windows")]
pub mod windows;

#[cfg(target_os = "linux")]
pub mod linux;
