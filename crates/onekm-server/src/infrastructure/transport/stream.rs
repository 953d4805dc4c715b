//! Record writer over any `std::io::Write`.

use std::io::Write;
use std::net::TcpStream;
use std::time::Duration;

use onekm_core::{encode_message, Message};
use tracing::{info, trace};

use super::{Transport, TransportError};

/// Upper bound on a single TCP write before the message is dropped.
const TCP_WRITE_TIMEOUT: Duration = Duration::from_millis(250);

/// Writes each message as one whole record to `writer`.
#[derive(Debug)]
pub struct StreamTransport<W: Write + Send> {
    writer: W,
    label: String,
}

impl<W: Write + Send> StreamTransport<W> {
    pub fn new(writer: W, label: impl Into<String>) -> Self {
        Self {
            writer,
            label: label.into(),
        }
    }

    /// Consumes the transport and returns the writer.
    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl StreamTransport<TcpStream> {
    /// Connects to the target host over TCP with Nagle disabled.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Open`] if the connection cannot be made.
    pub fn connect_tcp(addr: &str) -> Result<Self, TransportError> {
        let open_err = |source| TransportError::Open {
            target: addr.to_string(),
            source,
        };
        let stream = TcpStream::connect(addr).map_err(open_err)?;
        stream.set_nodelay(true).map_err(open_err)?;
        stream
            .set_write_timeout(Some(TCP_WRITE_TIMEOUT))
            .map_err(open_err)?;
        info!("connected to target host at {addr}");
        Ok(Self::new(stream, format!("tcp {addr}")))
    }
}

impl<W: Write + Send> Transport for StreamTransport<W> {
    fn send(&mut self, msg: &Message) -> Result<(), TransportError> {
        let record = encode_message(msg);
        self.writer
            .write_all(&record)
            .and_then(|()| self.writer.flush())
            .map_err(TransportError::from_write)?;
        trace!("sent {msg}");
        Ok(())
    }

    fn describe(&self) -> String {
        self.label.clone()
    }
}

#[cfg(test)]
mod tests {
    use std::io;

    use onekm_core::protocol::messages::RECORD_SIZE;
    use onekm_core::{decode_message, ControlState};

    use super::*;

    /// A writer that fails every write with a fixed error kind.
    struct FailingWriter(io::ErrorKind);

    impl Write for FailingWriter {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(self.0, "injected failure"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_send_writes_whole_records_back_to_back() {
        // Arrange
        let mut transport = StreamTransport::new(Vec::new(), "memory");

        // Act
        transport.send(&Message::Switch(ControlState::Remote)).unwrap();
        transport.send(&Message::MouseMove { dx: 5, dy: -5 }).unwrap();

        // Assert
        let bytes = transport.into_inner();
        assert_eq!(bytes.len(), 2 * RECORD_SIZE);
        assert_eq!(
            decode_message(&bytes[RECORD_SIZE..]).unwrap(),
            Message::MouseMove { dx: 5, dy: -5 }
        );
    }

    #[test]
    fn test_broken_pipe_is_reported_as_disconnect() {
        let mut transport = StreamTransport::new(FailingWriter(io::ErrorKind::BrokenPipe), "dead");
        let err = transport.send(&Message::MouseMove { dx: 1, dy: 1 }).unwrap_err();
        assert!(matches!(err, TransportError::Disconnected(_)));
    }

    #[test]
    fn test_timeout_is_reported_as_dropped_write() {
        let mut transport = StreamTransport::new(FailingWriter(io::ErrorKind::TimedOut), "slow");
        let err = transport.send(&Message::MouseMove { dx: 1, dy: 1 }).unwrap_err();
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_describe_returns_label() {
        let transport = StreamTransport::new(Vec::new(), "tcp 10.0.0.2:24800");
        assert_eq!(transport.describe(), "tcp 10.0.0.2:24800");
    }

    #[test]
    fn test_connect_tcp_to_closed_port_fails_with_open_error() {
        // Bind then drop a listener to find a port with nothing behind it.
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let result = StreamTransport::connect_tcp(&format!("127.0.0.1:{port}"));
        assert!(matches!(result, Err(TransportError::Open { .. })));
    }

    #[test]
    fn test_connect_tcp_delivers_records_to_listener() {
        use std::io::Read;

        // Arrange
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        // Act
        let mut transport = StreamTransport::connect_tcp(&addr).unwrap();
        let (mut peer, _) = listener.accept().unwrap();
        transport.send(&Message::Switch(ControlState::Remote)).unwrap();
        let mut record = [0u8; RECORD_SIZE];
        peer.read_exact(&mut record).unwrap();

        // Assert
        assert_eq!(
            decode_message(&record).unwrap(),
            Message::Switch(ControlState::Remote)
        );
    }
}
