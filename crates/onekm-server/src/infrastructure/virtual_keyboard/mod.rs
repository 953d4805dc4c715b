//! Virtual keyboard used to resynchronise the server's own key state.
//!
//! While the server's devices are grabbed the local OS never sees the key
//! releases the user makes, so it may believe keys are still held once control
//! comes back.  A sink in this module injects the missing releases locally.

use thiserror::Error;

pub mod mock;

#[cfg(target_os = "linux")]
pub mod linux;

/// Name given to the virtual keyboard.  Capture skips devices with this prefix.
pub const DEFAULT_KEY_SYNC_DEVICE_NAME: &str = "OneKM Key Sync Device";

/// Error type for key-sync sinks.
#[derive(Debug, Error)]
pub enum KeySyncError {
    #[error("failed to create virtual keyboard: {0}")]
    Create(#[source] std::io::Error),

    #[error("failed to inject release of key {code}: {source}")]
    Inject {
        code: u16,
        #[source]
        source: std::io::Error,
    },

    #[error("key-sync injection is not supported on this platform")]
    Unsupported,
}

/// Injects key releases into the local input stack.
#[cfg_attr(test, mockall::automock)]
pub trait KeySyncSink: Send {
    /// Emits a release for evdev key `code` followed by a sync report.
    fn inject_release(&mut self, code: u16) -> Result<(), KeySyncError>;
}
