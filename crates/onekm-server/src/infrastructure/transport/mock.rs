//! Recording transport for tests.

use std::sync::{Arc, Mutex};

use onekm_core::Message;

use super::{Transport, TransportError};

/// How the mock should fail the next sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockFailure {
    /// Each send fails with a droppable write error.
    Write,
    /// Each send reports the link as closed.
    Disconnect,
}

#[derive(Debug, Default)]
struct MockTransportState {
    sent: Vec<Message>,
    failure: Option<MockFailure>,
    attempts: usize,
}

/// A [`Transport`] that records every message it accepts.
///
/// Clones share state.
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<MockTransportState>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages accepted so far, in send order.
    pub fn sent(&self) -> Vec<Message> {
        self.state.lock().expect("lock poisoned").sent.clone()
    }

    /// Returns and forgets the messages accepted so far.
    pub fn take_sent(&self) -> Vec<Message> {
        std::mem::take(&mut self.state.lock().expect("lock poisoned").sent)
    }

    /// Number of send calls, including failed ones.
    pub fn attempts(&self) -> usize {
        self.state.lock().expect("lock poisoned").attempts
    }

    pub fn set_failure(&self, failure: Option<MockFailure>) {
        self.state.lock().expect("lock poisoned").failure = failure;
    }
}

impl Transport for MockTransport {
    fn send(&mut self, msg: &Message) -> Result<(), TransportError> {
        let mut state = self.state.lock().expect("lock poisoned");
        state.attempts += 1;
        match state.failure {
            Some(MockFailure::Write) => Err(TransportError::Io(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                "injected write failure",
            ))),
            Some(MockFailure::Disconnect) => {
                Err(TransportError::Disconnected("injected disconnect".to_string()))
            }
            None => {
                state.sent.push(*msg);
                Ok(())
            }
        }
    }

    fn describe(&self) -> String {
        "mock".to_string()
    }
}
