//! OneKM wire message types.
//!
//! Every message travels as one fixed-size record (see [`RECORD_SIZE`]) so the
//! transport can carry a plain byte stream with no framing.  Key codes inside
//! [`KeyboardReport`] are USB HID Usage IDs (page 0x07); the keycode carried by
//! [`Message::KeyEvent`] is the capture host's own (Linux evdev) code.

use std::fmt;

use crate::domain::control::ControlState;
use crate::keymap::hid::HidUsage;

// ── Protocol constants ────────────────────────────────────────────────────────

/// Current protocol version byte (record offset 0).
pub const PROTOCOL_VERSION: u8 = 0x01;

/// Size in bytes of every encoded record, regardless of variant.
pub const RECORD_SIZE: usize = 10;

/// Number of ordinary-key slots in a boot-style keyboard report.
pub const REPORT_KEY_SLOTS: usize = 6;

// ── Message type codes ────────────────────────────────────────────────────────

/// Type tag stored at record offset 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageType {
    MouseMove = 0x01,
    MouseButton = 0x02,
    KeyEvent = 0x03,
    KeyboardReport = 0x04,
    Switch = 0x05,
}

impl TryFrom<u8> for MessageType {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, ()> {
        match value {
            0x01 => Ok(MessageType::MouseMove),
            0x02 => Ok(MessageType::MouseButton),
            0x03 => Ok(MessageType::KeyEvent),
            0x04 => Ok(MessageType::KeyboardReport),
            0x05 => Ok(MessageType::Switch),
            _ => Err(()),
        }
    }
}

// ── Mouse buttons ─────────────────────────────────────────────────────────────

/// Mouse buttons that can be forwarded.  The discriminant is the wire id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MouseButton {
    Left = 1,
    Right = 2,
    Middle = 3,
}

impl MouseButton {
    /// All forwardable buttons, in wire-id order.
    pub const ALL: [MouseButton; 3] = [MouseButton::Left, MouseButton::Right, MouseButton::Middle];

    /// Returns the wire id (1 = left, 2 = right, 3 = middle).
    pub fn wire_id(self) -> u16 {
        self as u16
    }
}

impl TryFrom<u16> for MouseButton {
    type Error = ();

    fn try_from(value: u16) -> Result<Self, ()> {
        match value {
            1 => Ok(MouseButton::Left),
            2 => Ok(MouseButton::Right),
            3 => Ok(MouseButton::Middle),
            _ => Err(()),
        }
    }
}

// ── Modifier flags ────────────────────────────────────────────────────────────

/// Modifier bitmask in HID boot-report order.
///
/// Bit `n` corresponds to HID usage `0xE0 + n`, so left and right variants of
/// each modifier occupy distinct positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ModifierFlags(pub u8);

impl ModifierFlags {
    pub const LEFT_CTRL: u8 = 1 << 0;
    pub const LEFT_SHIFT: u8 = 1 << 1;
    pub const LEFT_ALT: u8 = 1 << 2;
    pub const LEFT_GUI: u8 = 1 << 3;
    pub const RIGHT_CTRL: u8 = 1 << 4;
    pub const RIGHT_SHIFT: u8 = 1 << 5;
    pub const RIGHT_ALT: u8 = 1 << 6;
    pub const RIGHT_GUI: u8 = 1 << 7;

    /// Returns `true` if no modifier bit is set.
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Returns `true` if every bit in `mask` is set.
    pub fn contains(self, mask: u8) -> bool {
        self.0 & mask == mask
    }

    /// Sets the bit belonging to `usage` if it is a modifier usage.
    pub fn insert_usage(&mut self, usage: HidUsage) {
        if let Some(bit) = usage.modifier_bit() {
            self.0 |= bit;
        }
    }

    /// Iterates over the modifier usages whose bits are set, lowest bit first.
    pub fn usages(self) -> impl Iterator<Item = HidUsage> {
        (0..8u8)
            .filter(move |i| self.0 & (1 << i) != 0)
            .map(|i| HidUsage(HidUsage::LEFT_CTRL.0 + i))
    }
}

// ── Keyboard report ───────────────────────────────────────────────────────────

/// Boot-style keyboard report: modifier bitmask plus six usage slots.
///
/// Occupied slots are packed at the front in press order; `HidUsage::NONE`
/// marks an empty slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct KeyboardReport {
    pub modifiers: ModifierFlags,
    pub keys: [HidUsage; REPORT_KEY_SLOTS],
}

impl KeyboardReport {
    /// A report with nothing held.
    pub const EMPTY: KeyboardReport = KeyboardReport {
        modifiers: ModifierFlags(0),
        keys: [HidUsage::NONE; REPORT_KEY_SLOTS],
    };

    /// Iterates over the occupied key slots in press order.
    pub fn pressed_keys(&self) -> impl Iterator<Item = HidUsage> + '_ {
        self.keys.iter().copied().filter(|k| *k != HidUsage::NONE)
    }

    /// Returns `true` if `usage` is held, either as a modifier bit or a key slot.
    pub fn holds(&self, usage: HidUsage) -> bool {
        match usage.modifier_bit() {
            Some(bit) => self.modifiers.contains(bit),
            None => usage != HidUsage::NONE && self.keys.contains(&usage),
        }
    }

    /// Returns `true` if nothing is held.
    pub fn is_empty(&self) -> bool {
        self.modifiers.is_empty() && self.pressed_keys().next().is_none()
    }
}

// ── Top-level message enum ────────────────────────────────────────────────────

/// Every message that can cross the link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Message {
    /// Relative pointer motion.
    MouseMove { dx: i16, dy: i16 },
    /// Mouse button transition.
    MouseButton { button: MouseButton, pressed: bool },
    /// Single key transition, keyed by the capture host's keycode.
    KeyEvent { keycode: u16, pressed: bool },
    /// Full snapshot of held keys.
    KeyboardReport(KeyboardReport),
    /// Control moved to (`Remote`) or away from (`Local`) the target host.
    Switch(ControlState),
}

impl Message {
    /// Returns the [`MessageType`] tag for this message.
    pub fn message_type(&self) -> MessageType {
        match self {
            Message::MouseMove { .. } => MessageType::MouseMove,
            Message::MouseButton { .. } => MessageType::MouseButton,
            Message::KeyEvent { .. } => MessageType::KeyEvent,
            Message::KeyboardReport(_) => MessageType::KeyboardReport,
            Message::Switch(_) => MessageType::Switch,
        }
    }

    /// Returns `true` for button and key messages, which must never be
    /// reordered behind pending motion.
    pub fn is_state_changing(&self) -> bool {
        matches!(
            self,
            Message::MouseButton { .. } | Message::KeyEvent { .. } | Message::KeyboardReport(_)
        )
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Message::MouseMove { dx, dy } => write!(f, "MOUSE_MOVE({dx}, {dy})"),
            Message::MouseButton { button, pressed } => {
                write!(f, "MOUSE_BUTTON({button:?}, {})", if *pressed { "down" } else { "up" })
            }
            Message::KeyEvent { keycode, pressed } => {
                write!(f, "KEY_EVENT({keycode}, {})", if *pressed { "down" } else { "up" })
            }
            Message::KeyboardReport(r) => {
                write!(f, "KEYBOARD_REPORT(mods=0x{:02X}, keys={:?})", r.modifiers.0, r.keys)
            }
            Message::Switch(state) => write!(f, "SWITCH({state})"),
        }
    }
}
