//! Control state machine: who currently owns the keyboard and mouse.
//!
//! Every hotkey-down edge comes through [`ControlStateMachine::on_hotkey_down`].
//! The machine consults its [`ChordDetector`] and either flips the control
//! state or requests shutdown.  The side effects of a flip are delegated to a
//! [`ControlEffects`] implementation and always run in this order:
//!
//! ```text
//! LOCAL  -> REMOTE : grab devices, SWITCH(REMOTE), ledger resync
//! REMOTE -> LOCAL  : flush pending motion, release devices, SWITCH(LOCAL),
//!                    key-sync recovery (once)
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use onekm_core::{ChordDetector, ChordOutcome, ControlState};
use tracing::info;

/// Side effects the state machine drives on a transition.
///
/// Implemented by the dispatch engine's I/O half; tests use a recording fake.
pub trait ControlEffects {
    /// Emits any coalesced motion immediately, ignoring the flush interval.
    fn flush_motion(&mut self);

    /// Grabs (`true`) or releases (`false`) the capture devices.  Best effort.
    fn set_grab(&mut self, grab: bool);

    /// Sends `SWITCH(state)` to the target host.
    fn announce(&mut self, state: ControlState);

    /// Runs keyboard sync recovery after control has returned to local.
    fn recover_keys(&mut self);

    /// Forgets keys released while control was local and tells the target
    /// host to release them too.
    fn resync_keys(&mut self);
}

/// Result of a hotkey-down edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HotkeyOutcome {
    /// Control moved to the given state.
    Switched(ControlState),
    /// The edge completed a shutdown chord; the running flag is now cleared.
    ShutdownRequested,
}

/// Owns the control state and the chord history.
#[derive(Debug)]
pub struct ControlStateMachine {
    state: ControlState,
    chord: ChordDetector,
    running: Arc<AtomicBool>,
}

impl ControlStateMachine {
    /// Creates a machine in the `LOCAL` state.
    pub fn new(chord: ChordDetector, running: Arc<AtomicBool>) -> Self {
        Self {
            state: ControlState::Local,
            chord,
            running,
        }
    }

    pub fn state(&self) -> ControlState {
        self.state
    }

    /// `false` once shutdown was requested by a chord or a signal.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Replaces the chord detector, forgetting any partial chord.
    pub fn set_chord(&mut self, chord: ChordDetector) {
        self.chord = chord;
    }

    /// Handles one hotkey-down edge observed at `now`.
    pub fn on_hotkey_down(&mut self, now: Instant, fx: &mut dyn ControlEffects) -> HotkeyOutcome {
        match self.chord.register(now) {
            ChordOutcome::Shutdown => {
                info!("hotkey chord completed, shutting down");
                self.running.store(false, Ordering::Relaxed);
                HotkeyOutcome::ShutdownRequested
            }
            ChordOutcome::Toggle => {
                let target = self.state.toggled();
                self.transition(target, fx);
                HotkeyOutcome::Switched(target)
            }
        }
    }

    /// Returns control to the local host if it is currently remote.
    ///
    /// Used on teardown so devices are never left grabbed.
    pub fn return_to_local(&mut self, fx: &mut dyn ControlEffects) {
        self.transition(ControlState::Local, fx);
    }

    fn transition(&mut self, target: ControlState, fx: &mut dyn ControlEffects) {
        if target == self.state {
            return;
        }
        match target {
            ControlState::Remote => {
                fx.set_grab(true);
                self.state = ControlState::Remote;
                fx.announce(ControlState::Remote);
                fx.resync_keys();
            }
            ControlState::Local => {
                fx.flush_motion();
                fx.set_grab(false);
                self.state = ControlState::Local;
                fx.announce(ControlState::Local);
                fx.recover_keys();
            }
        }
        info!("control is now {}", self.state);
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
