//! Pure input-forwarding logic shared by the capture and target hosts.
//!
//! Nothing in here touches a device, a socket, or the clock: callers pass
//! `Instant`s in, which keeps every rule testable with synthetic time.

/// Control locus and the hotkey chord detector.
pub mod control;

/// Key press ledger, report builder, and hardware key bitmap.
pub mod keyboard;

/// Motion coalescer and idle heartbeat.
pub mod motion;
