//! USB HID Usage IDs for the Keyboard/Keypad page (0x07).
//!
//! Keyboard reports carry one byte per key, so a usage is modelled as a `u8`
//! newtype rather than an exhaustive enum: unknown usages survive a trip
//! through the wire unchanged and are rejected only where a translation
//! table has no entry for them.
//!
//! Reference: USB HID Usage Tables 1.3, section 10.

/// A single HID keyboard-page usage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct HidUsage(pub u8);

impl HidUsage {
    /// Reserved "no event" usage; marks an empty report slot.
    pub const NONE: HidUsage = HidUsage(0x00);

    pub const KEY_A: HidUsage = HidUsage(0x04);
    pub const KEY_Z: HidUsage = HidUsage(0x1D);
    pub const ENTER: HidUsage = HidUsage(0x28);
    pub const ESCAPE: HidUsage = HidUsage(0x29);
    pub const SPACE: HidUsage = HidUsage(0x2C);
    pub const PAUSE: HidUsage = HidUsage(0x48);

    pub const LEFT_CTRL: HidUsage = HidUsage(0xE0);
    pub const LEFT_SHIFT: HidUsage = HidUsage(0xE1);
    pub const LEFT_ALT: HidUsage = HidUsage(0xE2);
    pub const LEFT_GUI: HidUsage = HidUsage(0xE3);
    pub const RIGHT_CTRL: HidUsage = HidUsage(0xE4);
    pub const RIGHT_SHIFT: HidUsage = HidUsage(0xE5);
    pub const RIGHT_ALT: HidUsage = HidUsage(0xE6);
    pub const RIGHT_GUI: HidUsage = HidUsage(0xE7);

    /// Returns `true` for the eight modifier usages (0xE0–0xE7).
    pub fn is_modifier(self) -> bool {
        (Self::LEFT_CTRL.0..=Self::RIGHT_GUI.0).contains(&self.0)
    }

    /// Returns the boot-report modifier bit for this usage, or `None` for
    /// ordinary keys.
    pub fn modifier_bit(self) -> Option<u8> {
        if self.is_modifier() {
            Some(1 << (self.0 - Self::LEFT_CTRL.0))
        } else {
            None
        }
    }
}
