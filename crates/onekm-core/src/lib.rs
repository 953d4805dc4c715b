//! # onekm-core
//!
//! Shared library for OneKM, a two-host keyboard/mouse forwarder: one
//! machine owns the physical input devices (the capture host) and, on a
//! hotkey, forwards everything to a second machine (the target host).
//!
//! - **`protocol`**: the fixed-size wire record and its codec.
//! - **`domain`**: control state, chord detection, the key press ledger and
//!   report builder, motion coalescing, and the idle heartbeat.
//! - **`keymap`**: translation between evdev codes, HID usages, and Windows
//!   virtual keys.
//!
//! The crate has no OS, device, or socket dependencies.

pub mod domain;
pub mod keymap;
pub mod protocol;

pub use domain::control::{ChordDetector, ChordOutcome, ControlState};
pub use domain::keyboard::{KeyBitmap, KeyPressTracker, ReportEmitter};
pub use domain::motion::{Heartbeat, MotionCoalescer};
pub use keymap::hid::HidUsage;
pub use protocol::codec::{decode_message, encode_message, ProtocolError};
pub use protocol::messages::{KeyboardReport, Message, MouseButton};
