//! Infrastructure layer for the target host.
//!
//! **Dependency rule**: this layer may depend on `application` and
//! `onekm_core`, but MUST NOT be imported by the `application` layer.
//!
//! - **`input_emulation`**: OS-specific `PlatformInputEmulator`s, selected
//!   with `#[cfg(target_os)]`, plus a recording mock for tests.
//! - **`network`**: the TCP listener and serial reader that feed records to
//!   the use case.
//! - **`storage`**: TOML configuration.

pub mod input_emulation;
pub mod network;
pub mod storage;
