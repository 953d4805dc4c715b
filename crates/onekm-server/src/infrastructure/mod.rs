//! Infrastructure layer for the capture host.
//!
//! OS-facing adapters: evdev capture, the outbound link, the uinput key-sync
//! keyboard, and the config file.
//!
//! **Dependency rule**: this layer may depend on `application` and
//! `onekm_core`, but the application layer only sees the traits defined here.

pub mod input_capture;
pub mod storage;
pub mod transport;
pub mod virtual_keyboard;
