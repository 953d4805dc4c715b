//! Keyboard press ledger and boot-style report construction.
//!
//! The [`KeyPressTracker`] records which capture-host keycodes have been
//! forwarded as pressed.  [`KeyPressTracker::build_report`] folds that ledger
//! into a [`KeyboardReport`], and [`ReportEmitter`] remembers the last report
//! sent so unchanged reports are never resent.

use tracing::trace;

use crate::keymap::evdev::{evdev_to_hid, KEY_DOMAIN};
use crate::protocol::messages::{KeyboardReport, REPORT_KEY_SLOTS};

// ── Hardware key-state bitmap ─────────────────────────────────────────────────

/// One bit per keycode in `0..KEY_DOMAIN`, as returned by `EVIOCGKEY`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyBitmap([u8; KEY_DOMAIN / 8]);

impl KeyBitmap {
    /// A bitmap with every key released.
    pub const fn empty() -> Self {
        Self([0; KEY_DOMAIN / 8])
    }

    /// Wraps a raw kernel bitmap (bit `code % 8` of byte `code / 8`).
    pub const fn from_bytes(bytes: [u8; KEY_DOMAIN / 8]) -> Self {
        Self(bytes)
    }

    /// Returns `true` if `code` is held.  Codes outside the domain are never held.
    pub fn is_set(&self, code: u16) -> bool {
        let code = code as usize;
        code < KEY_DOMAIN && self.0[code / 8] & (1 << (code % 8)) != 0
    }

    /// Marks `code` as held or released.  Codes outside the domain are ignored.
    pub fn set(&mut self, code: u16, held: bool) {
        let code = code as usize;
        if code >= KEY_DOMAIN {
            return;
        }
        if held {
            self.0[code / 8] |= 1 << (code % 8);
        } else {
            self.0[code / 8] &= !(1 << (code % 8));
        }
    }

    /// Merges `other` into `self` with a logical OR.
    pub fn merge(&mut self, other: &KeyBitmap) {
        for (mine, theirs) in self.0.iter_mut().zip(other.0.iter()) {
            *mine |= *theirs;
        }
    }

    /// Iterates over every held keycode in ascending order.
    pub fn held(&self) -> impl Iterator<Item = u16> + '_ {
        (0..KEY_DOMAIN as u16).filter(move |code| self.is_set(*code))
    }
}

impl Default for KeyBitmap {
    fn default() -> Self {
        Self::empty()
    }
}

impl FromIterator<u16> for KeyBitmap {
    fn from_iter<I: IntoIterator<Item = u16>>(iter: I) -> Self {
        let mut bitmap = KeyBitmap::empty();
        for code in iter {
            bitmap.set(code, true);
        }
        bitmap
    }
}

// ── Press tracker ─────────────────────────────────────────────────────────────

/// Ledger of keycodes currently forwarded as pressed.
///
/// Press order is kept alongside the flags so that report slots are filled
/// oldest-first.  A key pressed twice without an intervening release is held
/// once.
#[derive(Debug, Clone)]
pub struct KeyPressTracker {
    pressed: [bool; KEY_DOMAIN],
    order: Vec<u16>,
}

impl KeyPressTracker {
    pub fn new() -> Self {
        Self {
            pressed: [false; KEY_DOMAIN],
            order: Vec::with_capacity(16),
        }
    }

    /// Sets the forwarded state of `keycode`.
    ///
    /// Returns `true` if the ledger changed.  Codes outside `0..KEY_DOMAIN`
    /// are ignored.
    pub fn record(&mut self, keycode: u16, pressed: bool) -> bool {
        let Some(slot) = self.pressed.get_mut(keycode as usize) else {
            return false;
        };
        if *slot == pressed {
            return false;
        }
        *slot = pressed;
        if pressed {
            self.order.push(keycode);
        } else {
            self.order.retain(|&k| k != keycode);
        }
        trace!(keycode, pressed, "tracker updated");
        true
    }

    /// Returns `true` if `keycode` is forwarded as pressed.
    pub fn is_pressed(&self, keycode: u16) -> bool {
        self.pressed.get(keycode as usize).copied().unwrap_or(false)
    }

    /// Pressed keycodes in press order.
    pub fn pressed_keys(&self) -> &[u16] {
        &self.order
    }

    /// Number of keys currently held.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Folds the ledger into a boot-style report.
    ///
    /// Modifiers land in their bitmask positions.  Ordinary keys fill the six
    /// slots in press order; once the slots are full, later keys are left out
    /// until an earlier one is released.  Keys without a HID usage are skipped.
    pub fn build_report(&self) -> KeyboardReport {
        let mut report = KeyboardReport::EMPTY;
        let mut slot = 0;

        for &code in &self.order {
            let Some(usage) = evdev_to_hid(code) else {
                continue;
            };
            if usage.is_modifier() {
                report.modifiers.insert_usage(usage);
            } else if slot < REPORT_KEY_SLOTS {
                report.keys[slot] = usage;
                slot += 1;
            }
        }

        report
    }
}

impl Default for KeyPressTracker {
    fn default() -> Self {
        Self::new()
    }
}

// ── Edge-triggered emitter ────────────────────────────────────────────────────

/// Remembers the last report sent and yields a new one only on change.
#[derive(Debug, Clone, Default)]
pub struct ReportEmitter {
    last: KeyboardReport,
}

impl ReportEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a report from `tracker` and returns it if it differs from the
    /// last one returned.  Any difference counts, modifier-only included.
    pub fn maybe_emit(&mut self, tracker: &KeyPressTracker) -> Option<KeyboardReport> {
        let report = tracker.build_report();
        if report == self.last {
            return None;
        }
        self.last = report;
        Some(report)
    }

    /// The most recently emitted report.
    pub fn last(&self) -> &KeyboardReport {
        &self.last
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
