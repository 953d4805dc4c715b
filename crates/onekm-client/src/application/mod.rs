//! Application layer use cases for the target host.
//!
//! - **`emulate_input`**: turns decoded messages into calls on a
//!   `PlatformInputEmulator` and remembers what it holds so a dropped link
//!   can be cleaned up.

pub mod emulate_input;
