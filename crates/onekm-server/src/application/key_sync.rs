//! Keyboard sync recovery.
//!
//! After control returns to the capture host, compares the press ledger with
//! what the capture devices report as physically held.  A key the ledger
//! still holds but the hardware reports released is released through the
//! local key-sync sink and cleared from the ledger.  The opposite mismatch is
//! left alone: a synthetic press is riskier than a missed one.
//!
//! [`resync_ledger`] is the lighter check made when control moves to the
//! target host.  Releases seen while local already reached the local OS, so
//! stale entries are only dropped from the ledger.

use std::thread;
use std::time::Duration;

use onekm_core::KeyPressTracker;
use tracing::{debug, info, warn};

use crate::infrastructure::input_capture::CaptureSource;
use crate::infrastructure::virtual_keyboard::KeySyncSink;

/// Releases keys the capture host believes are held but no longer are.
pub struct KeySyncRecovery {
    sink: Option<Box<dyn KeySyncSink>>,
    inject_delay: Duration,
    warned_disabled: bool,
}

impl KeySyncRecovery {
    /// Creates an enabled recovery pass that waits `inject_delay` between
    /// injected releases.
    pub fn new(sink: Box<dyn KeySyncSink>, inject_delay: Duration) -> Self {
        Self {
            sink: Some(sink),
            inject_delay,
            warned_disabled: false,
        }
    }

    /// A recovery pass that does nothing.  Used when the virtual keyboard
    /// could not be created.
    pub fn disabled() -> Self {
        Self {
            sink: None,
            inject_delay: Duration::ZERO,
            warned_disabled: false,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.sink.is_some()
    }

    /// Runs one recovery pass and returns the codes that were repaired.
    ///
    /// A failed hardware query makes the pass a no-op.  A failed injection is
    /// logged and the ledger entry is cleared anyway; the hardware already
    /// reports the key as up.
    pub fn recover(
        &mut self,
        tracker: &mut KeyPressTracker,
        capture: &mut dyn CaptureSource,
    ) -> Vec<u16> {
        let Some(sink) = self.sink.as_mut() else {
            if !self.warned_disabled {
                warn!("key sync recovery is disabled; held keys will not be repaired");
                self.warned_disabled = true;
            }
            return Vec::new();
        };
        if tracker.is_empty() {
            return Vec::new();
        }

        let hardware = match capture.hardware_key_state() {
            Ok(bitmap) => bitmap,
            Err(e) => {
                warn!("skipping key sync recovery: {e}");
                return Vec::new();
            }
        };

        let stale: Vec<u16> = tracker
            .pressed_keys()
            .iter()
            .copied()
            .filter(|&code| !hardware.is_set(code))
            .collect();

        for (i, &code) in stale.iter().enumerate() {
            if i > 0 && !self.inject_delay.is_zero() {
                thread::sleep(self.inject_delay);
            }
            match sink.inject_release(code) {
                Ok(()) => debug!(code, "released stale key"),
                Err(e) => warn!("{e}"),
            }
            tracker.record(code, false);
        }

        if !stale.is_empty() {
            info!(count = stale.len(), "repaired keys left held across the switch");
        }
        stale
    }
}

/// Drops ledger entries the hardware reports released and returns them.
///
/// Run right after the devices are grabbed, so every later release arrives
/// as an event.  An empty ledger skips the query; a failed query keeps the
/// ledger as it is.
pub fn resync_ledger(tracker: &mut KeyPressTracker, capture: &mut dyn CaptureSource) -> Vec<u16> {
    if tracker.is_empty() {
        return Vec::new();
    }
    let hardware = match capture.hardware_key_state() {
        Ok(bitmap) => bitmap,
        Err(e) => {
            warn!("skipping key ledger resync: {e}");
            return Vec::new();
        }
    };

    let stale: Vec<u16> = tracker
        .pressed_keys()
        .iter()
        .copied()
        .filter(|&code| !hardware.is_set(code))
        .collect();
    for &code in &stale {
        tracker.record(code, false);
    }
    if !stale.is_empty() {
        debug!(?stale, "dropped keys released while local");
    }
    stale
}

// ── Tests ─────────────────────────────────────────────────────────────────────
