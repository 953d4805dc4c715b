//! HID usage → Windows Virtual Key (VK) translation for the injection side.
//!
//! Reference: Windows Virtual-Key Codes (winuser.h) and USB HID Usage Tables 1.3.
//!
//! `SendInput` also needs to know which keys live on the extended part of the
//! keyboard (`KEYEVENTF_EXTENDEDKEY`); without the flag, Windows reads the
//! arrow keys as their numpad twins and right Ctrl/Alt as the left ones.

use super::hid::HidUsage;

/// Translates a HID usage to a Windows VK code.
///
/// Returns `None` for usages with no VK equivalent.
pub fn hid_to_vk(usage: HidUsage) -> Option<u8> {
    let vk = HID_TO_VK_TABLE[usage.0 as usize];
    (vk != 0).then_some(vk)
}

/// Returns `true` if the key must be injected with `KEYEVENTF_EXTENDEDKEY`.
pub fn is_extended_key(usage: HidUsage) -> bool {
    matches!(
        usage.0,
        0x46        // PrintScreen
        | 0x49..=0x52 // Insert, Home, PageUp, Delete, End, PageDown, arrows
        | 0x53      // NumLock
        | 0x54      // Keypad divide
        | 0x58      // Keypad Enter
        | 0x65      // Application
        | 0x7F..=0x81 // Volume keys
        | 0xE3      // Left GUI
        | 0xE4      // Right Ctrl
        | 0xE6      // Right Alt
        | 0xE7 // Right GUI
    )
}

/// HID usage → VK, indexed by usage.  Zero means unmapped.
const HID_TO_VK_TABLE: [u8; 256] = {
    let mut t = [0u8; 256];

    // ── Letters (HID 0x04..=0x1D → VK_A..=VK_Z) ──────────────────────────────
    let mut i = 0;
    while i < 26 {
        t[0x04 + i] = 0x41 + i as u8;
        i += 1;
    }

    // ── Digits (HID orders 1..9 then 0) ──────────────────────────────────────
    let mut d = 0;
    while d < 9 {
        t[0x1E + d] = 0x31 + d as u8;
        d += 1;
    }
    t[0x27] = 0x30;

    // ── Editing and punctuation ───────────────────────────────────────────────
    t[0x28] = 0x0D; // VK_RETURN
    t[0x29] = 0x1B; // VK_ESCAPE
    t[0x2A] = 0x08; // VK_BACK
    t[0x2B] = 0x09; // VK_TAB
    t[0x2C] = 0x20; // VK_SPACE
    t[0x2D] = 0xBD; // VK_OEM_MINUS
    t[0x2E] = 0xBB; // VK_OEM_PLUS
    t[0x2F] = 0xDB; // VK_OEM_4 [
    t[0x30] = 0xDD; // VK_OEM_6 ]
    t[0x31] = 0xDC; // VK_OEM_5 \
    t[0x33] = 0xBA; // VK_OEM_1 ;
    t[0x34] = 0xDE; // VK_OEM_7 '
    t[0x35] = 0xC0; // VK_OEM_3 `
    t[0x36] = 0xBC; // VK_OEM_COMMA
    t[0x37] = 0xBE; // VK_OEM_PERIOD
    t[0x38] = 0xBF; // VK_OEM_2 /
    t[0x39] = 0x14; // VK_CAPITAL

    // ── Function keys F1..F24 ─────────────────────────────────────────────────
    let mut f = 0;
    while f < 12 {
        t[0x3A + f] = 0x70 + f as u8;
        t[0x68 + f] = 0x7C + f as u8;
        f += 1;
    }

    // ── Navigation ────────────────────────────────────────────────────────────
    t[0x46] = 0x2C; // VK_SNAPSHOT
    t[0x47] = 0x91; // VK_SCROLL
    t[0x48] = 0x13; // VK_PAUSE
    t[0x49] = 0x2D; // VK_INSERT
    t[0x4A] = 0x24; // VK_HOME
    t[0x4B] = 0x21; // VK_PRIOR
    t[0x4C] = 0x2E; // VK_DELETE
    t[0x4D] = 0x23; // VK_END
    t[0x4E] = 0x22; // VK_NEXT
    t[0x4F] = 0x27; // VK_RIGHT
    t[0x50] = 0x25; // VK_LEFT
    t[0x51] = 0x28; // VK_DOWN
    t[0x52] = 0x26; // VK_UP

    // ── Keypad ────────────────────────────────────────────────────────────────
    t[0x53] = 0x90; // VK_NUMLOCK
    t[0x54] = 0x6F; // VK_DIVIDE
    t[0x55] = 0x6A; // VK_MULTIPLY
    t[0x56] = 0x6D; // VK_SUBTRACT
    t[0x57] = 0x6B; // VK_ADD
    t[0x58] = 0x0D; // VK_RETURN (extended)
    let mut n = 0;
    while n < 9 {
        t[0x59 + n] = 0x61 + n as u8; // VK_NUMPAD1..9
        n += 1;
    }
    t[0x62] = 0x60; // VK_NUMPAD0
    t[0x63] = 0x6E; // VK_DECIMAL

    // ── Misc ──────────────────────────────────────────────────────────────────
    t[0x64] = 0xE2; // VK_OEM_102
    t[0x65] = 0x5D; // VK_APPS
    t[0x7F] = 0xAD; // VK_VOLUME_MUTE
    t[0x80] = 0xAF; // VK_VOLUME_UP
    t[0x81] = 0xAE; // VK_VOLUME_DOWN

    // ── Modifiers (sided VKs so left/right survive injection) ─────────────────
    t[0xE0] = 0xA2; // VK_LCONTROL
    t[0xE1] = 0xA0; // VK_LSHIFT
    t[0xE2] = 0xA4; // VK_LMENU
    t[0xE3] = 0x5B; // VK_LWIN
    t[0xE4] = 0xA3; // VK_RCONTROL
    t[0xE5] = 0xA1; // VK_RSHIFT
    t[0xE6] = 0xA5; // VK_RMENU
    t[0xE7] = 0x5C; // VK_RWIN

    t
};
