//! Linux input emulation through a uinput virtual keyboard + mouse.
//!
//! The device works under X11, Wayland and the console alike, since events
//! enter the kernel input layer rather than a display server.  HID usages are
//! translated back to evdev key codes before emission.

use std::sync::Mutex;

use evdev::uinput::{VirtualDevice, VirtualDeviceBuilder};
use evdev::{AttributeSet, BusType, EventType, InputEvent, InputId, Key, RelativeAxisType};
use onekm_core::keymap::evdev::{hid_to_evdev, BTN_LEFT, BTN_MIDDLE, BTN_RIGHT, KEY_DOMAIN};
use onekm_core::{HidUsage, MouseButton};
use tracing::info;

use crate::application::emulate_input::{EmulationError, PlatformInputEmulator};

/// [`PlatformInputEmulator`] that writes to a uinput device.
pub struct UinputEmulator {
    device: Mutex<VirtualDevice>,
}

impl UinputEmulator {
    /// Creates the virtual device.
    ///
    /// # Errors
    ///
    /// [`EmulationError::Unavailable`] if `/dev/uinput` cannot be opened,
    /// usually for lack of permission.
    pub fn create(name: &str) -> Result<Self, EmulationError> {
        let unavailable = |e: std::io::Error| EmulationError::Unavailable(e.to_string());

        let mut keys = AttributeSet::<Key>::new();
        for code in 1..KEY_DOMAIN as u16 {
            keys.insert(Key::new(code));
        }
        for code in [BTN_LEFT, BTN_RIGHT, BTN_MIDDLE] {
            keys.insert(Key::new(code));
        }
        let mut axes = AttributeSet::<RelativeAxisType>::new();
        axes.insert(RelativeAxisType::REL_X);
        axes.insert(RelativeAxisType::REL_Y);

        let device = VirtualDeviceBuilder::new()
            .map_err(unavailable)?
            .name(name)
            .input_id(InputId::new(BusType::BUS_USB, 0x1234, 0x5679, 1))
            .with_keys(&keys)
            .map_err(unavailable)?
            .with_relative_axes(&axes)
            .map_err(unavailable)?
            .build()
            .map_err(unavailable)?;

        info!("created injection device \"{name}\"");
        Ok(Self {
            device: Mutex::new(device),
        })
    }

    fn emit(&self, events: &[InputEvent]) -> Result<(), EmulationError> {
        let mut device = self
            .device
            .lock()
            .map_err(|_| EmulationError::Platform("injection device lock poisoned".into()))?;
        device
            .emit(events)
            .map_err(|e| EmulationError::Platform(e.to_string()))
    }
}

impl PlatformInputEmulator for UinputEmulator {
    fn emit_key(&self, key: HidUsage, pressed: bool) -> Result<(), EmulationError> {
        let code = hid_to_evdev(key).ok_or(EmulationError::UnmappedUsage(key.0))?;
        self.emit(&[InputEvent::new(EventType::KEY, code, i32::from(pressed))])
    }

    fn emit_mouse_move(&self, dx: i32, dy: i32) -> Result<(), EmulationError> {
        let mut events = Vec::with_capacity(2);
        if dx != 0 {
            events.push(InputEvent::new(EventType::RELATIVE, RelativeAxisType::REL_X.0, dx));
        }
        if dy != 0 {
            events.push(InputEvent::new(EventType::RELATIVE, RelativeAxisType::REL_Y.0, dy));
        }
        if events.is_empty() {
            return Ok(());
        }
        self.emit(&events)
    }

    fn emit_mouse_button(&self, button: MouseButton, pressed: bool) -> Result<(), EmulationError> {
        self.emit(&[InputEvent::new(
            EventType::KEY,
            button_code(button),
            i32::from(pressed),
        )])
    }
}

fn button_code(button: MouseButton) -> u16 {
    match button {
        MouseButton::Left => BTN_LEFT,
        MouseButton::Right => BTN_RIGHT,
        MouseButton::Middle => BTN_MIDDLE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_button_codes_match_evdev() {
        assert_eq!(button_code(MouseButton::Left), 0x110);
        assert_eq!(button_code(MouseButton::Right), 0x111);
        assert_eq!(button_code(MouseButton::Middle), 0x112);
    }
}
