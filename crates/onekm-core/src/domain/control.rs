//! Control locus and hotkey chord detection.

use std::collections::VecDeque;
use std::fmt;
use std::time::{Duration, Instant};

/// Which machine the shared keyboard and mouse currently drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ControlState {
    /// Input stays on the capture host.
    #[default]
    Local,
    /// Input is grabbed and forwarded to the target host.
    Remote,
}

impl ControlState {
    /// Returns the other state.
    pub fn toggled(self) -> Self {
        match self {
            ControlState::Local => ControlState::Remote,
            ControlState::Remote => ControlState::Local,
        }
    }

    /// Wire value carried by a SWITCH record (1 = remote, 0 = local).
    pub fn wire_value(self) -> u16 {
        match self {
            ControlState::Local => 0,
            ControlState::Remote => 1,
        }
    }

    /// Inverse of [`ControlState::wire_value`].
    pub fn from_wire_value(value: u16) -> Option<Self> {
        match value {
            0 => Some(ControlState::Local),
            1 => Some(ControlState::Remote),
            _ => None,
        }
    }
}

impl fmt::Display for ControlState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlState::Local => f.write_str("LOCAL"),
            ControlState::Remote => f.write_str("REMOTE"),
        }
    }
}

/// What a single hotkey-down edge means.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChordOutcome {
    /// Flip the control state.
    Toggle,
    /// The edge completed a shutdown chord.
    Shutdown,
}

/// Default window in which the shutdown chord must complete.
pub const DEFAULT_CHORD_WINDOW: Duration = Duration::from_secs(2);

/// Default number of presses that form the shutdown chord.
pub const DEFAULT_CHORD_PRESSES: usize = 3;

/// Distinguishes a single hotkey press from a rapid shutdown chord.
///
/// Keeps the timestamps of the most recent presses that still fall inside
/// the window.  When `presses` of them are present the chord completes,
/// the history is cleared, and [`ChordOutcome::Shutdown`] is returned.
#[derive(Debug, Clone)]
pub struct ChordDetector {
    window: Duration,
    presses: usize,
    history: VecDeque<Instant>,
}

impl ChordDetector {
    /// Creates a detector requiring `presses` edges within `window`.
    ///
    /// A `presses` value below 2 is raised to 2; a one-press chord would make
    /// toggling impossible.
    pub fn new(window: Duration, presses: usize) -> Self {
        let presses = presses.max(2);
        Self {
            window,
            presses,
            history: VecDeque::with_capacity(presses),
        }
    }

    /// Records a hotkey-down edge observed at `now`.
    pub fn register(&mut self, now: Instant) -> ChordOutcome {
        while let Some(&oldest) = self.history.front() {
            if now.saturating_duration_since(oldest) > self.window {
                self.history.pop_front();
            } else {
                break;
            }
        }

        self.history.push_back(now);
        if self.history.len() >= self.presses {
            self.history.clear();
            ChordOutcome::Shutdown
        } else {
            ChordOutcome::Toggle
        }
    }

    /// Number of presses currently counted toward a chord.
    pub fn pending(&self) -> usize {
        self.history.len()
    }

    /// Forgets any partial chord.
    pub fn reset(&mut self) {
        self.history.clear();
    }
}

impl Default for ChordDetector {
    fn default() -> Self {
        Self::new(DEFAULT_CHORD_WINDOW, DEFAULT_CHORD_PRESSES)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
