//! Linux evdev key codes and their HID usage equivalents.
//!
//! The capture host reads `EV_KEY` codes from `linux/input-event-codes.h`.
//! Only the codes below 256 are keyboard keys the tracker follows; mouse
//! buttons live at `0x110` and up and are classified separately.
//!
//! This crate does not link against the kernel headers, so the handful of
//! codes the rest of the workspace needs by name are restated here.

use super::hid::HidUsage;

/// Size of the tracked keycode domain (codes `0..KEY_DOMAIN`).
pub const KEY_DOMAIN: usize = 256;

// ── Event types and codes used outside the table ─────────────────────────────

pub const EV_KEY: u16 = 0x01;
pub const EV_REL: u16 = 0x02;

pub const REL_X: u16 = 0x00;
pub const REL_Y: u16 = 0x01;

pub const KEY_ESC: u16 = 1;
pub const KEY_A: u16 = 30;
pub const KEY_S: u16 = 31;
pub const KEY_D: u16 = 32;
pub const KEY_F: u16 = 33;
pub const KEY_LEFTCTRL: u16 = 29;
pub const KEY_LEFTSHIFT: u16 = 42;
pub const KEY_RIGHTSHIFT: u16 = 54;
pub const KEY_LEFTALT: u16 = 56;
pub const KEY_RIGHTCTRL: u16 = 97;
pub const KEY_RIGHTALT: u16 = 100;
pub const KEY_PAUSE: u16 = 119;
pub const KEY_LEFTMETA: u16 = 125;
pub const KEY_RIGHTMETA: u16 = 126;

pub const BTN_LEFT: u16 = 0x110;
pub const BTN_RIGHT: u16 = 0x111;
pub const BTN_MIDDLE: u16 = 0x112;

/// Translates an evdev key code to a HID usage.
///
/// Returns `None` for codes outside the keyboard domain or without a HID
/// keyboard-page equivalent.
pub fn evdev_to_hid(code: u16) -> Option<HidUsage> {
    let usage = *EVDEV_TO_HID.get(code as usize)?;
    (usage != 0).then_some(HidUsage(usage))
}

/// Translates a HID usage back to an evdev key code.
///
/// Returns `None` for usages with no evdev equivalent.
pub fn hid_to_evdev(usage: HidUsage) -> Option<u16> {
    if usage == HidUsage::NONE {
        return None;
    }
    EVDEV_TO_HID
        .iter()
        .position(|&mapped| mapped == usage.0)
        .map(|code| code as u16)
}

/// evdev code → HID usage, indexed by evdev code.  Zero means unmapped.
const EVDEV_TO_HID: [u8; KEY_DOMAIN] = {
    let mut t = [0u8; KEY_DOMAIN];

    // ── Top row ───────────────────────────────────────────────────────────────
    t[1] = 0x29; // ESC
    t[2] = 0x1E; // 1
    t[3] = 0x1F;
    t[4] = 0x20;
    t[5] = 0x21;
    t[6] = 0x22;
    t[7] = 0x23;
    t[8] = 0x24;
    t[9] = 0x25;
    t[10] = 0x26; // 9
    t[11] = 0x27; // 0
    t[12] = 0x2D; // MINUS
    t[13] = 0x2E; // EQUAL
    t[14] = 0x2A; // BACKSPACE
    t[15] = 0x2B; // TAB

    // ── Letters (evdev follows the QWERTY scan order) ─────────────────────────
    t[16] = 0x14; // Q
    t[17] = 0x1A; // W
    t[18] = 0x08; // E
    t[19] = 0x15; // R
    t[20] = 0x17; // T
    t[21] = 0x1C; // Y
    t[22] = 0x18; // U
    t[23] = 0x0C; // I
    t[24] = 0x12; // O
    t[25] = 0x13; // P
    t[26] = 0x2F; // LEFTBRACE
    t[27] = 0x30; // RIGHTBRACE
    t[28] = 0x28; // ENTER
    t[30] = 0x04; // A
    t[31] = 0x16; // S
    t[32] = 0x07; // D
    t[33] = 0x09; // F
    t[34] = 0x0A; // G
    t[35] = 0x0B; // H
    t[36] = 0x0D; // J
    t[37] = 0x0E; // K
    t[38] = 0x0F; // L
    t[39] = 0x33; // SEMICOLON
    t[40] = 0x34; // APOSTROPHE
    t[41] = 0x35; // GRAVE
    t[43] = 0x31; // BACKSLASH
    t[44] = 0x1D; // Z
    t[45] = 0x1B; // X
    t[46] = 0x06; // C
    t[47] = 0x19; // V
    t[48] = 0x05; // B
    t[49] = 0x11; // N
    t[50] = 0x10; // M
    t[51] = 0x36; // COMMA
    t[52] = 0x37; // DOT
    t[53] = 0x38; // SLASH
    t[57] = 0x2C; // SPACE
    t[58] = 0x39; // CAPSLOCK

    // ── Modifiers ─────────────────────────────────────────────────────────────
    t[29] = 0xE0; // LEFTCTRL
    t[42] = 0xE1; // LEFTSHIFT
    t[56] = 0xE2; // LEFTALT
    t[125] = 0xE3; // LEFTMETA
    t[97] = 0xE4; // RIGHTCTRL
    t[54] = 0xE5; // RIGHTSHIFT
    t[100] = 0xE6; // RIGHTALT
    t[126] = 0xE7; // RIGHTMETA

    // ── Function keys ─────────────────────────────────────────────────────────
    t[59] = 0x3A; // F1
    t[60] = 0x3B;
    t[61] = 0x3C;
    t[62] = 0x3D;
    t[63] = 0x3E;
    t[64] = 0x3F;
    t[65] = 0x40;
    t[66] = 0x41;
    t[67] = 0x42;
    t[68] = 0x43; // F10
    t[87] = 0x44; // F11
    t[88] = 0x45; // F12
    let mut i = 0;
    while i < 12 {
        t[183 + i] = 0x68 + i as u8; // F13..F24
        i += 1;
    }

    // ── Keypad ────────────────────────────────────────────────────────────────
    t[55] = 0x55; // KPASTERISK
    t[69] = 0x53; // NUMLOCK
    t[71] = 0x5F; // KP7
    t[72] = 0x60; // KP8
    t[73] = 0x61; // KP9
    t[74] = 0x56; // KPMINUS
    t[75] = 0x5C; // KP4
    t[76] = 0x5D; // KP5
    t[77] = 0x5E; // KP6
    t[78] = 0x57; // KPPLUS
    t[79] = 0x59; // KP1
    t[80] = 0x5A; // KP2
    t[81] = 0x5B; // KP3
    t[82] = 0x62; // KP0
    t[83] = 0x63; // KPDOT
    t[96] = 0x58; // KPENTER
    t[98] = 0x54; // KPSLASH
    t[117] = 0x67; // KPEQUAL
    t[121] = 0x85; // KPCOMMA

    // ── Navigation and system ─────────────────────────────────────────────────
    t[70] = 0x47; // SCROLLLOCK
    t[86] = 0x64; // 102ND
    t[99] = 0x46; // SYSRQ / PrintScreen
    t[102] = 0x4A; // HOME
    t[103] = 0x52; // UP
    t[104] = 0x4B; // PAGEUP
    t[105] = 0x50; // LEFT
    t[106] = 0x4F; // RIGHT
    t[107] = 0x4D; // END
    t[108] = 0x51; // DOWN
    t[109] = 0x4E; // PAGEDOWN
    t[110] = 0x49; // INSERT
    t[111] = 0x4C; // DELETE
    t[113] = 0x7F; // MUTE
    t[114] = 0x81; // VOLUMEDOWN
    t[115] = 0x80; // VOLUMEUP
    t[116] = 0x66; // POWER
    t[119] = 0x48; // PAUSE
    t[127] = 0x65; // COMPOSE / Application

    t
};
