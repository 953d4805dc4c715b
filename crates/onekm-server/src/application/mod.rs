//! Application layer for the capture host.
//!
//! Everything here depends on the infrastructure traits
//! ([`CaptureSource`](crate::infrastructure::input_capture::CaptureSource),
//! [`Transport`](crate::infrastructure::transport::Transport),
//! [`KeySyncSink`](crate::infrastructure::virtual_keyboard::KeySyncSink)),
//! never on a concrete device, so the whole forwarding path runs against
//! mocks in tests.
//!
//! - **`control`**: LOCAL/REMOTE state, hotkey chord, ordered transition
//!   side effects.
//! - **`key_sync`**: releases keys the capture host still believes are held
//!   after control comes back.
//! - **`dispatch`**: the single-threaded tick loop that ties it together.

pub mod control;
pub mod dispatch;
pub mod key_sync;
