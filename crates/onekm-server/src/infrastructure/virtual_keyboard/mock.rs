//! Recording key-sync sink for tests.

use std::sync::{Arc, Mutex};

use super::{KeySyncError, KeySyncSink};

#[derive(Debug, Default)]
struct MockKeySyncState {
    released: Vec<u16>,
    failing: Vec<u16>,
}

/// A [`KeySyncSink`] that records the codes it is asked to release.
///
/// Clones share state.
#[derive(Debug, Clone, Default)]
pub struct MockKeySync {
    state: Arc<Mutex<MockKeySyncState>>,
}

impl MockKeySync {
    pub fn new() -> Self {
        Self::default()
    }

    /// Codes successfully released, in injection order.
    pub fn released(&self) -> Vec<u16> {
        self.state.lock().expect("lock poisoned").released.clone()
    }

    /// Makes injection of `code` fail from now on.
    pub fn fail_on(&self, code: u16) {
        self.state.lock().expect("lock poisoned").failing.push(code);
    }
}

impl KeySyncSink for MockKeySync {
    fn inject_release(&mut self, code: u16) -> Result<(), KeySyncError> {
        let mut state = self.state.lock().expect("lock poisoned");
        if state.failing.contains(&code) {
            return Err(KeySyncError::Inject {
                code,
                source: std::io::Error::other("injected failure"),
            });
        }
        state.released.push(code);
        Ok(())
    }
}
