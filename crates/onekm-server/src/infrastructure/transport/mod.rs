//! Outbound link to the target host.
//!
//! The link is a plain byte stream carrying fixed-size records back to back.
//! Sends are fire-and-forget: a failed write costs one message and is never
//! retried, but a closed link is fatal to the dispatch engine.

use std::io;

use onekm_core::Message;
use thiserror::Error;

pub mod mock;
pub mod stream;

#[cfg(target_os = "linux")]
pub mod serial;

pub use stream::StreamTransport;

/// Baud rates a serial line can be configured for.
pub const SUPPORTED_BAUD_RATES: [u32; 4] = [115_200, 230_400, 460_800, 921_600];

pub const DEFAULT_SERIAL_PATH: &str = "/dev/ttyACM0";
pub const DEFAULT_BAUD_RATE: u32 = 230_400;

/// Error type for transport operations.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The peer went away; nothing more can be sent.
    #[error("link closed: {0}")]
    Disconnected(String),

    /// A single write failed; the message was dropped.
    #[error("write failed: {0}")]
    Io(#[source] io::Error),

    /// The link could not be established.
    #[error("failed to open {target}: {source}")]
    Open {
        target: String,
        #[source]
        source: io::Error,
    },

    #[error("unsupported baud rate {0}")]
    UnsupportedBaud(u32),
}

impl TransportError {
    /// Returns `true` if the link cannot be used any more.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, TransportError::Io(_))
    }

    /// Sorts a write error into "link gone" versus "this message lost".
    pub fn from_write(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::BrokenPipe
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::NotConnected
            | io::ErrorKind::UnexpectedEof
            | io::ErrorKind::WriteZero => TransportError::Disconnected(err.to_string()),
            _ => TransportError::Io(err),
        }
    }
}

/// Trait abstracting the physical link.
pub trait Transport: Send {
    /// Sends one message as one record.
    fn send(&mut self, msg: &Message) -> Result<(), TransportError>;

    /// Short description for log lines, e.g. `serial /dev/ttyACM0 @ 230400`.
    fn describe(&self) -> String;
}
