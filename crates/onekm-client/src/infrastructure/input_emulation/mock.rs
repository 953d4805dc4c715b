//! Recording input emulator for tests.
//!
//! The real emulators press keys and move the cursor on the machine running
//! the tests.  [`MockInputEmulator`] records every call in order instead, so
//! assertions can check both what was injected and in which sequence.
//!
//! Set `should_fail` (or build with [`MockInputEmulator::failing`]) to make
//! every call return [`EmulationError::Platform`] after recording it.

use std::sync::Mutex;

use onekm_core::{HidUsage, MouseButton};

use crate::application::emulate_input::{EmulationError, PlatformInputEmulator};

/// One recorded injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Injected {
    Key(HidUsage, bool),
    Move(i32, i32),
    Button(MouseButton, bool),
}

/// An emulator that records calls without touching the OS.
#[derive(Default)]
pub struct MockInputEmulator {
    /// Every call, in the order it was made.
    pub log: Mutex<Vec<Injected>>,
    /// When `true`, every call fails after being recorded.
    pub should_fail: bool,
}

impl MockInputEmulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// An emulator whose calls all fail.
    pub fn failing() -> Self {
        Self {
            should_fail: true,
            ..Self::default()
        }
    }

    /// Snapshot of the recorded calls.
    pub fn injected(&self) -> Vec<Injected> {
        self.log.lock().expect("lock poisoned").clone()
    }

    pub fn clear(&self) {
        self.log.lock().expect("lock poisoned").clear();
    }

    fn record(&self, entry: Injected) -> Result<(), EmulationError> {
        self.log.lock().expect("lock poisoned").push(entry);
        if self.should_fail {
            return Err(EmulationError::Platform("mock failure".to_string()));
        }
        Ok(())
    }
}

impl PlatformInputEmulator for MockInputEmulator {
    fn emit_key(&self, key: HidUsage, pressed: bool) -> Result<(), EmulationError> {
        self.record(Injected::Key(key, pressed))
    }

    fn emit_mouse_move(&self, dx: i32, dy: i32) -> Result<(), EmulationError> {
        self.record(Injected::Move(dx, dy))
    }

    fn emit_mouse_button(&self, button: MouseButton, pressed: bool) -> Result<(), EmulationError> {
        self.record(Injected::Button(button, pressed))
    }
}
