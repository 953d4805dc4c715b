//! Key code translation tables.
//!
//! The canonical representation on the wire is the USB HID Usage ID (page
//! 0x07).  The capture host speaks Linux evdev codes; injection sinks speak
//! whatever their OS wants (evdev again on Linux, Virtual Keys on Windows).

pub mod evdev;
pub mod hid;
pub mod windows_vk;

pub use hid::HidUsage;
