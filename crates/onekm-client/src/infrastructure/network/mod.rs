//! Inbound link from the capture host.
//!
//! Records arrive as a plain stream of fixed-size frames over either a TCP
//! connection or a serial line.  Both paths share [`run_session`], which
//! reads whole records, decodes them and applies them to the
//! [`EmulateInputUseCase`].
//!
//! ```text
//! serve_tcp ──accept──▶ run_session ──EOF──▶ release_all ──▶ accept next
//! serve_serial ───────▶ run_session ──EOF──▶ release_all ──▶ return
//! ```
//!
//! Records are applied in bursts of at most `burst_limit`; a button or key
//! record ends its burst early so it is never queued behind motion, and the
//! task yields between bursts.

use std::future::Future;
use std::io;

use onekm_core::decode_message;
use onekm_core::protocol::messages::RECORD_SIZE;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use crate::application::emulate_input::EmulateInputUseCase;

#[cfg(target_os = "linux")]
pub mod serial;

/// Default TCP listen address.
pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:24800";

/// Default number of records applied per burst.
pub const DEFAULT_BURST_LIMIT: usize = 25;

/// Serial rates the link supports.
pub const SUPPORTED_BAUD_RATES: [u32; 4] = [115_200, 230_400, 460_800, 921_600];

/// Errors that can occur in the client network layer.
#[derive(Debug, Error)]
pub enum NetworkError {
    /// The listener could not be bound.
    #[error("failed to listen on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },
    /// The serial device could not be opened or configured.
    #[error("failed to open {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: io::Error,
    },
    /// An I/O error other than the peer going away.
    #[error("link I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Counters for one session.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SessionStats {
    /// Records decoded and handed to the use case.
    pub applied: u64,
    /// Records discarded because they failed to decode.
    pub malformed: u64,
    /// Records the injection sink failed to apply.
    pub failed: u64,
    /// Bursts completed (each followed by a yield).
    pub bursts: u64,
}

/// Reads and applies records until the peer closes the stream.
///
/// Returns normally when the stream ends, including a reset or a truncated
/// final record.  Held input is *not* released here; callers follow up with
/// [`EmulateInputUseCase::release_all`].
///
/// # Errors
///
/// Returns [`NetworkError::Io`] for read errors other than end-of-stream.
pub async fn run_session<R>(
    reader: &mut R,
    use_case: &mut EmulateInputUseCase,
    burst_limit: usize,
) -> Result<SessionStats, NetworkError>
where
    R: AsyncRead + Unpin,
{
    let mut stats = SessionStats::default();
    let mut record = [0u8; RECORD_SIZE];
    let burst_limit = burst_limit.max(1);

    loop {
        for _ in 0..burst_limit {
            if let Err(e) = reader.read_exact(&mut record).await {
                if is_end_of_stream(&e) {
                    debug!("link closed: {e}");
                    return Ok(stats);
                }
                return Err(NetworkError::Io(e));
            }

            let msg = match decode_message(&record) {
                Ok(msg) => msg,
                Err(e) => {
                    stats.malformed += 1;
                    warn!("discarding malformed record {record:02x?}: {e}");
                    continue;
                }
            };

            stats.applied += 1;
            if let Err(e) = use_case.handle(&msg) {
                stats.failed += 1;
                warn!("failed to apply {msg}: {e}");
            }
            if msg.is_state_changing() {
                break;
            }
        }
        stats.bursts += 1;
        tokio::task::yield_now().await;
    }
}

/// Accepts capture-host connections one at a time until `shutdown` resolves.
///
/// Held input is released after every session and once more on shutdown.
///
/// # Errors
///
/// Only if the listener itself fails irrecoverably; per-connection errors are
/// logged and the next connection is accepted.
pub async fn serve_tcp<F>(
    listener: TcpListener,
    use_case: &mut EmulateInputUseCase,
    burst_limit: usize,
    shutdown: F,
) -> Result<(), NetworkError>
where
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);
    if let Ok(addr) = listener.local_addr() {
        info!("listening for the capture host on {addr}");
    }

    loop {
        let accepted = tokio::select! {
            _ = &mut shutdown => break,
            accepted = listener.accept() => accepted,
        };
        let (mut stream, peer) = match accepted {
            Ok(pair) => pair,
            Err(e) => {
                warn!("accept failed: {e}");
                continue;
            }
        };
        if let Err(e) = stream.set_nodelay(true) {
            warn!("could not set TCP_NODELAY for {peer}: {e}");
        }
        info!("capture host connected from {peer}");

        let outcome = tokio::select! {
            _ = &mut shutdown => None,
            result = run_session(&mut stream, use_case, burst_limit) => Some(result),
        };
        release_held(use_case);

        match outcome {
            Some(Ok(stats)) => info!(
                applied = stats.applied,
                malformed = stats.malformed,
                "capture host {peer} disconnected"
            ),
            Some(Err(e)) => warn!("session with {peer} ended: {e}"),
            None => return Ok(()),
        }
    }

    release_held(use_case);
    Ok(())
}

/// Binds the TCP listener.
///
/// # Errors
///
/// Returns [`NetworkError::Bind`] if the address is invalid or in use.
pub async fn bind(addr: &str) -> Result<TcpListener, NetworkError> {
    TcpListener::bind(addr)
        .await
        .map_err(|source| NetworkError::Bind {
            addr: addr.to_string(),
            source,
        })
}

/// Releases everything the use case holds, logging failures.
pub fn release_held(use_case: &mut EmulateInputUseCase) {
    if let Err(e) = use_case.release_all() {
        warn!("could not release all held input: {e}");
    }
}

fn is_end_of_stream(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::UnexpectedEof
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
    )
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use onekm_core::keymap::evdev::KEY_A;
    use onekm_core::{encode_message, ControlState, HidUsage, Message, MouseButton};

    use super::*;
    use crate::infrastructure::input_emulation::mock::{Injected, MockInputEmulator};

    fn stream_of(msgs: &[Message]) -> Vec<u8> {
        msgs.iter().flat_map(|m| encode_message(m)).collect()
    }

    fn use_case() -> (EmulateInputUseCase, Arc<MockInputEmulator>) {
        let emulator = Arc::new(MockInputEmulator::new());
        (EmulateInputUseCase::new(emulator.clone()), emulator)
    }

    #[tokio::test]
    async fn test_session_applies_records_in_order() {
        // Arrange
        let bytes = stream_of(&[
            Message::Switch(ControlState::Remote),
            Message::MouseMove { dx: 3, dy: -1 },
            Message::KeyEvent { keycode: KEY_A, pressed: true },
        ]);
        let mut reader = tokio_test::io::Builder::new().read(&bytes).build();
        let (mut uc, emu) = use_case();

        // Act
        let stats = run_session(&mut reader, &mut uc, DEFAULT_BURST_LIMIT)
            .await
            .unwrap();

        // Assert
        assert_eq!(stats.applied, 3);
        assert!(uc.remote_active());
        assert_eq!(
            emu.injected(),
            vec![Injected::Move(3, -1), Injected::Key(HidUsage::KEY_A, true)]
        );
    }

    #[tokio::test]
    async fn test_records_split_across_reads_are_reassembled() {
        let bytes = stream_of(&[Message::MouseMove { dx: 1, dy: 2 }]);
        let mut reader = tokio_test::io::Builder::new()
            .read(&bytes[..4])
            .read(&bytes[4..])
            .build();
        let (mut uc, emu) = use_case();

        run_session(&mut reader, &mut uc, DEFAULT_BURST_LIMIT)
            .await
            .unwrap();

        assert_eq!(emu.injected(), vec![Injected::Move(1, 2)]);
    }

    #[tokio::test]
    async fn test_malformed_record_is_skipped_not_fatal() {
        // Arrange: a record with an unknown tag between two good ones.
        let mut bytes = stream_of(&[Message::MouseMove { dx: 1, dy: 0 }]);
        bytes.extend_from_slice(&[1, 0x7F, 0, 0, 0, 0, 0, 0, 0, 0]);
        bytes.extend(stream_of(&[Message::MouseMove { dx: 0, dy: 1 }]));
        let mut reader = tokio_test::io::Builder::new().read(&bytes).build();
        let (mut uc, emu) = use_case();

        // Act
        let stats = run_session(&mut reader, &mut uc, DEFAULT_BURST_LIMIT)
            .await
            .unwrap();

        // Assert
        assert_eq!(stats.malformed, 1);
        assert_eq!(stats.applied, 2);
        assert_eq!(emu.injected().len(), 2);
    }

    #[tokio::test]
    async fn test_button_ends_burst_early() {
        // Arrange
        let bytes = stream_of(&[
            Message::MouseMove { dx: 1, dy: 1 },
            Message::MouseButton { button: MouseButton::Left, pressed: true },
            Message::MouseMove { dx: 1, dy: 1 },
        ]);
        let mut reader = tokio_test::io::Builder::new().read(&bytes).build();
        let (mut uc, _emu) = use_case();

        // Act
        let stats = run_session(&mut reader, &mut uc, DEFAULT_BURST_LIMIT)
            .await
            .unwrap();

        // Assert: the button closed the first burst; the trailing move was
        // read in a second burst that the end of stream cut short.
        assert_eq!(stats.bursts, 1);
        assert_eq!(stats.applied, 3);
    }

    #[tokio::test]
    async fn test_motion_is_applied_in_bounded_bursts() {
        let moves = vec![Message::MouseMove { dx: 1, dy: 0 }; 60];
        let bytes = stream_of(&moves);
        let mut reader = tokio_test::io::Builder::new().read(&bytes).build();
        let (mut uc, _emu) = use_case();

        let stats = run_session(&mut reader, &mut uc, 25).await.unwrap();

        assert_eq!(stats.applied, 60);
        assert_eq!(stats.bursts, 2);
    }

    #[tokio::test]
    async fn test_truncated_final_record_ends_session_cleanly() {
        let bytes = stream_of(&[Message::MouseMove { dx: 5, dy: 5 }]);
        let mut reader = tokio_test::io::Builder::new()
            .read(&bytes)
            .read(&bytes[..3])
            .build();
        let (mut uc, emu) = use_case();

        let stats = run_session(&mut reader, &mut uc, DEFAULT_BURST_LIMIT)
            .await
            .unwrap();

        assert_eq!(stats.applied, 1);
        assert_eq!(emu.injected(), vec![Injected::Move(5, 5)]);
    }

    #[tokio::test]
    async fn test_read_error_is_reported() {
        let mut reader = tokio_test::io::Builder::new()
            .read_error(io::Error::new(io::ErrorKind::PermissionDenied, "denied"))
            .build();
        let (mut uc, _emu) = use_case();

        let result = run_session(&mut reader, &mut uc, DEFAULT_BURST_LIMIT).await;

        assert!(matches!(result, Err(NetworkError::Io(_))));
    }

    #[tokio::test]
    async fn test_bind_rejects_bad_address() {
        let result = bind("not an address").await;
        assert!(matches!(result, Err(NetworkError::Bind { .. })));
    }
}
