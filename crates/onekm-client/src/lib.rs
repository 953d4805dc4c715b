//! onekm-client library entry point.
//!
//! The *target host* is the machine that receives forwarded input.  It reads
//! fixed-size records from the capture host over TCP or a serial line,
//! decodes them, and injects the keyboard and mouse events locally
//! (`SendInput` on Windows, a uinput device on Linux).
//!
//! The module tree is shared by the binary and the integration tests in
//! `tests/`.

/// Application layer: the message → injection use case.
pub mod application;

/// Infrastructure layer: OS injection backends, the record listener, config.
pub mod infrastructure;
