//! Mock capture source for unit and integration testing.
//!
//! Clones share state, so a test can keep one handle for scripting events
//! and inspecting grab calls while the engine owns another.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use onekm_core::KeyBitmap;

use super::{CaptureError, CaptureSource, GrabReport, RawInputEvent};

#[derive(Debug, Default)]
struct MockCaptureState {
    queue: VecDeque<RawInputEvent>,
    grabbed: bool,
    grab_calls: Vec<bool>,
    fail_grab: bool,
    hardware: KeyBitmap,
    fail_key_state: bool,
    key_state_queries: usize,
    key_state_queries_while_grabbed: usize,
    wait_calls: usize,
}

/// A scripted [`CaptureSource`].
#[derive(Debug, Clone, Default)]
pub struct MockCaptureSource {
    state: Arc<Mutex<MockCaptureState>>,
}

impl MockCaptureSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues an event as if a device produced it.
    pub fn push(&self, event: RawInputEvent) {
        self.state.lock().expect("lock poisoned").queue.push_back(event);
    }

    /// Queues a key event.
    pub fn push_key(&self, code: u16, value: i32) {
        self.push(RawInputEvent::Key { code, value });
    }

    /// Queues an `REL_X` and/or `REL_Y` sample.
    pub fn push_motion(&self, dx: i32, dy: i32) {
        use onekm_core::keymap::evdev::{REL_X, REL_Y};
        if dx != 0 {
            self.push(RawInputEvent::Relative { axis: REL_X, delta: dx });
        }
        if dy != 0 {
            self.push(RawInputEvent::Relative { axis: REL_Y, delta: dy });
        }
    }

    /// Number of events still queued.
    pub fn pending(&self) -> usize {
        self.state.lock().expect("lock poisoned").queue.len()
    }

    /// Sets the hardware key state returned by the next queries.
    pub fn set_hardware_keys(&self, held: &[u16]) {
        self.state.lock().expect("lock poisoned").hardware = held.iter().copied().collect();
    }

    /// Makes every subsequent key-state query fail.
    pub fn fail_key_state(&self, fail: bool) {
        self.state.lock().expect("lock poisoned").fail_key_state = fail;
    }

    /// Makes every subsequent grab or ungrab report a failure.
    pub fn fail_grab(&self, fail: bool) {
        self.state.lock().expect("lock poisoned").fail_grab = fail;
    }

    pub fn is_grabbed(&self) -> bool {
        self.state.lock().expect("lock poisoned").grabbed
    }

    /// Every `set_grab` argument, in call order.
    pub fn grab_calls(&self) -> Vec<bool> {
        self.state.lock().expect("lock poisoned").grab_calls.clone()
    }

    pub fn key_state_queries(&self) -> usize {
        self.state.lock().expect("lock poisoned").key_state_queries
    }

    /// Key-state queries made while the devices were still grabbed.
    pub fn key_state_queries_while_grabbed(&self) -> usize {
        self.state
            .lock()
            .expect("lock poisoned")
            .key_state_queries_while_grabbed
    }

    pub fn wait_calls(&self) -> usize {
        self.state.lock().expect("lock poisoned").wait_calls
    }
}

impl CaptureSource for MockCaptureSource {
    fn device_names(&self) -> Vec<String> {
        vec!["mock keyboard".to_string(), "mock mouse".to_string()]
    }

    fn next_event(&mut self) -> Option<RawInputEvent> {
        self.state.lock().expect("lock poisoned").queue.pop_front()
    }

    fn wait_for_event(&mut self, _timeout: Duration) -> bool {
        let mut state = self.state.lock().expect("lock poisoned");
        state.wait_calls += 1;
        !state.queue.is_empty()
    }

    fn set_grab(&mut self, grab: bool) -> GrabReport {
        let mut state = self.state.lock().expect("lock poisoned");
        state.grab_calls.push(grab);
        if state.fail_grab {
            return GrabReport {
                succeeded: 0,
                failed: 2,
            };
        }
        state.grabbed = grab;
        GrabReport {
            succeeded: 2,
            failed: 0,
        }
    }

    fn hardware_key_state(&mut self) -> Result<KeyBitmap, CaptureError> {
        let mut state = self.state.lock().expect("lock poisoned");
        state.key_state_queries += 1;
        if state.grabbed {
            state.key_state_queries_while_grabbed += 1;
        }
        if state.fail_key_state {
            return Err(CaptureError::KeyState {
                path: "/dev/input/mock".into(),
                source: std::io::Error::new(std::io::ErrorKind::Other, "injected failure"),
            });
        }
        Ok(state.hardware)
    }
}
