//! Windows input emulation via the SendInput API.
//!
//! Keys are translated HID usage → virtual key; keys on the extended part of
//! the keyboard carry `KEYEVENTF_EXTENDEDKEY`.  Motion is injected relative
//! with plain `MOUSEEVENTF_MOVE`, so pointer acceleration applies as it would
//! for a physical mouse.

#![cfg(target_os = "windows")]

use onekm_core::keymap::windows_vk::{hid_to_vk, is_extended_key};
use onekm_core::{HidUsage, MouseButton};
use windows::Win32::UI::Input::KeyboardAndMouse::{
    SendInput, INPUT, INPUT_0, INPUT_KEYBOARD, INPUT_MOUSE, KEYBDINPUT, KEYBD_EVENT_FLAGS,
    KEYEVENTF_EXTENDEDKEY, KEYEVENTF_KEYUP, MOUSEEVENTF_LEFTDOWN, MOUSEEVENTF_LEFTUP,
    MOUSEEVENTF_MIDDLEDOWN, MOUSEEVENTF_MIDDLEUP, MOUSEEVENTF_MOVE, MOUSEEVENTF_RIGHTDOWN,
    MOUSEEVENTF_RIGHTUP, MOUSEINPUT, MOUSE_EVENT_FLAGS, VIRTUAL_KEY,
};

use crate::application::emulate_input::{EmulationError, PlatformInputEmulator};

/// [`PlatformInputEmulator`] backed by `SendInput`.
pub struct WindowsInputEmulator;

impl WindowsInputEmulator {
    pub fn new() -> Self {
        Self
    }
}

impl Default for WindowsInputEmulator {
    fn default() -> Self {
        Self::new()
    }
}

impl PlatformInputEmulator for WindowsInputEmulator {
    fn emit_key(&self, key: HidUsage, pressed: bool) -> Result<(), EmulationError> {
        let vk = hid_to_vk(key).ok_or(EmulationError::UnmappedUsage(key.0))?;
        send(INPUT {
            r#type: INPUT_KEYBOARD,
            Anonymous: INPUT_0 {
                ki: KEYBDINPUT {
                    wVk: VIRTUAL_KEY(u16::from(vk)),
                    wScan: 0,
                    dwFlags: key_flags(key, pressed),
                    time: 0,
                    dwExtraInfo: 0,
                },
            },
        })
    }

    fn emit_mouse_move(&self, dx: i32, dy: i32) -> Result<(), EmulationError> {
        send(mouse_input(dx, dy, MOUSEEVENTF_MOVE))
    }

    fn emit_mouse_button(&self, button: MouseButton, pressed: bool) -> Result<(), EmulationError> {
        let flags = match (button, pressed) {
            (MouseButton::Left, true) => MOUSEEVENTF_LEFTDOWN,
            (MouseButton::Left, false) => MOUSEEVENTF_LEFTUP,
            (MouseButton::Right, true) => MOUSEEVENTF_RIGHTDOWN,
            (MouseButton::Right, false) => MOUSEEVENTF_RIGHTUP,
            (MouseButton::Middle, true) => MOUSEEVENTF_MIDDLEDOWN,
            (MouseButton::Middle, false) => MOUSEEVENTF_MIDDLEUP,
        };
        send(mouse_input(0, 0, flags))
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn key_flags(key: HidUsage, pressed: bool) -> KEYBD_EVENT_FLAGS {
    let mut flags = KEYBD_EVENT_FLAGS(0);
    if !pressed {
        flags |= KEYEVENTF_KEYUP;
    }
    if is_extended_key(key) {
        flags |= KEYEVENTF_EXTENDEDKEY;
    }
    flags
}

fn mouse_input(dx: i32, dy: i32, flags: MOUSE_EVENT_FLAGS) -> INPUT {
    INPUT {
        r#type: INPUT_MOUSE,
        Anonymous: INPUT_0 {
            mi: MOUSEINPUT {
                dx,
                dy,
                mouseData: 0,
                dwFlags: flags,
                time: 0,
                dwExtraInfo: 0,
            },
        },
    }
}

fn send(input: INPUT) -> Result<(), EmulationError> {
    // SAFETY: `input` is a fully initialised INPUT on the stack and the size
    // argument matches its type.
    let inserted = unsafe { SendInput(&[input], std::mem::size_of::<INPUT>() as i32) };
    if inserted == 1 {
        Ok(())
    } else {
        Err(EmulationError::Platform(format!(
            "SendInput inserted {inserted} of 1 events: {}",
            std::io::Error::last_os_error()
        )))
    }
}
