//! Use case: apply forwarded input on the target host.
//!
//! Each decoded [`Message`] from the capture host is turned into calls on a
//! [`PlatformInputEmulator`]:
//!
//! | Message           | Effect                                             |
//! |-------------------|----------------------------------------------------|
//! | `MOUSE_MOVE`      | relative pointer motion                            |
//! | `MOUSE_BUTTON`    | button down / up                                   |
//! | `KEY_EVENT`       | evdev code → HID usage → key down / up             |
//! | `KEYBOARD_REPORT` | diff against the last report, releases first      |
//! | `SWITCH`          | logged; tracked as [`EmulateInputUseCase::remote_active`] |
//!
//! The use case remembers everything it has pressed so [`release_all`]
//! can leave the target host clean when the link drops.
//!
//! [`release_all`]: EmulateInputUseCase::release_all

use std::sync::Arc;

use onekm_core::keymap::evdev::evdev_to_hid;
use onekm_core::{ControlState, HidUsage, KeyboardReport, Message, MouseButton};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors that can occur during input emulation.
#[derive(Debug, Error)]
pub enum EmulationError {
    /// The OS injection API rejected the event.
    #[error("platform injection error: {0}")]
    Platform(String),
    /// The usage has no equivalent on this platform.
    #[error("HID usage {0:#04x} has no platform key code")]
    UnmappedUsage(u8),
    /// The injection device could not be created.
    #[error("injection device unavailable: {0}")]
    Unavailable(String),
}

/// Synthesizes input on the target host as if it came from real hardware.
///
/// Methods take `&self` so one sink can be shared behind an `Arc`.
#[cfg_attr(test, mockall::automock)]
pub trait PlatformInputEmulator: Send + Sync {
    /// Presses (`true`) or releases (`false`) a key.
    fn emit_key(&self, key: HidUsage, pressed: bool) -> Result<(), EmulationError>;

    /// Moves the pointer by a relative offset.
    fn emit_mouse_move(&self, dx: i32, dy: i32) -> Result<(), EmulationError>;

    /// Presses or releases a mouse button.
    fn emit_mouse_button(&self, button: MouseButton, pressed: bool) -> Result<(), EmulationError>;
}

/// Applies inbound messages to a [`PlatformInputEmulator`].
pub struct EmulateInputUseCase {
    emulator: Arc<dyn PlatformInputEmulator>,
    /// Last `KEYBOARD_REPORT` applied.
    applied_report: KeyboardReport,
    /// Keys pressed through `KEY_EVENT`, in press order.
    event_keys: Vec<HidUsage>,
    buttons: Vec<MouseButton>,
    remote_active: bool,
}

impl EmulateInputUseCase {
    pub fn new(emulator: Arc<dyn PlatformInputEmulator>) -> Self {
        Self {
            emulator,
            applied_report: KeyboardReport::EMPTY,
            event_keys: Vec::new(),
            buttons: Vec::new(),
            remote_active: false,
        }
    }

    /// `true` between `SWITCH(REMOTE)` and `SWITCH(LOCAL)`.
    pub fn remote_active(&self) -> bool {
        self.remote_active
    }

    /// The report state the target host currently reflects.
    pub fn applied_report(&self) -> KeyboardReport {
        self.applied_report
    }

    /// Applies one message.
    ///
    /// A report is applied in full even when one of its transitions fails;
    /// the first failure is returned afterwards.
    pub fn handle(&mut self, msg: &Message) -> Result<(), EmulationError> {
        match *msg {
            Message::MouseMove { dx, dy } => {
                self.emulator.emit_mouse_move(i32::from(dx), i32::from(dy))
            }
            Message::MouseButton { button, pressed } => {
                self.emulator.emit_mouse_button(button, pressed)?;
                self.buttons.retain(|b| *b != button);
                if pressed {
                    self.buttons.push(button);
                }
                Ok(())
            }
            Message::KeyEvent { keycode, pressed } => self.apply_key_event(keycode, pressed),
            Message::KeyboardReport(report) => self.apply_report(report),
            Message::Switch(state) => {
                self.remote_active = state == ControlState::Remote;
                info!("capture host switched control to {state}");
                Ok(())
            }
        }
    }

    /// Releases every key and button this use case pressed.
    ///
    /// Called when the link drops so nothing stays stuck on the target host.
    pub fn release_all(&mut self) -> Result<(), EmulationError> {
        let mut first_err = None;
        let mut keys: Vec<HidUsage> = self.applied_report.pressed_keys().collect();
        keys.extend(self.applied_report.modifiers.usages());
        for key in self.event_keys.drain(..) {
            if !keys.contains(&key) {
                keys.push(key);
            }
        }
        for key in keys {
            record_first(&mut first_err, self.emulator.emit_key(key, false));
        }
        for button in std::mem::take(&mut self.buttons) {
            record_first(&mut first_err, self.emulator.emit_mouse_button(button, false));
        }
        self.applied_report = KeyboardReport::EMPTY;
        if self.remote_active {
            debug!("link dropped while remote was active");
            self.remote_active = false;
        }
        first_err.map_or(Ok(()), Err)
    }

    fn apply_key_event(&mut self, keycode: u16, pressed: bool) -> Result<(), EmulationError> {
        let Some(usage) = evdev_to_hid(keycode) else {
            debug!(keycode, "no HID usage for keycode, skipping");
            return Ok(());
        };
        self.emulator.emit_key(usage, pressed)?;
        self.event_keys.retain(|k| *k != usage);
        if pressed {
            self.event_keys.push(usage);
        }
        Ok(())
    }

    fn apply_report(&mut self, report: KeyboardReport) -> Result<(), EmulationError> {
        let previous = self.applied_report;
        let mut first_err = None;

        let released = previous
            .modifiers
            .usages()
            .chain(previous.pressed_keys())
            .filter(|usage| !report.holds(*usage));
        for usage in released.collect::<Vec<_>>() {
            record_first(&mut first_err, self.emulator.emit_key(usage, false));
        }

        let pressed = report
            .modifiers
            .usages()
            .chain(report.pressed_keys())
            .filter(|usage| !previous.holds(*usage));
        for usage in pressed.collect::<Vec<_>>() {
            record_first(&mut first_err, self.emulator.emit_key(usage, true));
        }

        self.applied_report = report;
        match first_err {
            Some(e) => {
                warn!("keyboard report partially applied: {e}");
                Err(e)
            }
            None => Ok(()),
        }
    }
}

fn record_first(slot: &mut Option<EmulationError>, result: Result<(), EmulationError>) {
    if let Err(e) = result {
        if slot.is_none() {
            *slot = Some(e);
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use mockall::predicate::eq;
    use onekm_core::keymap::evdev::{KEY_A, KEY_LEFTSHIFT};
    use onekm_core::protocol::messages::ModifierFlags;

    use super::*;
    use crate::infrastructure::input_emulation::mock::{Injected, MockInputEmulator};

    fn use_case() -> (EmulateInputUseCase, Arc<MockInputEmulator>) {
        let emulator = Arc::new(MockInputEmulator::new());
        let uc = EmulateInputUseCase::new(emulator.clone());
        (uc, emulator)
    }

    fn report(modifiers: u8, keys: &[u8]) -> KeyboardReport {
        let mut r = KeyboardReport::EMPTY;
        r.modifiers = ModifierFlags(modifiers);
        for (slot, &k) in r.keys.iter_mut().zip(keys) {
            *slot = HidUsage(k);
        }
        r
    }

    #[test]
    fn test_mouse_move_is_forwarded_relative() {
        let (mut uc, emu) = use_case();

        uc.handle(&Message::MouseMove { dx: -7, dy: 300 }).unwrap();

        assert_eq!(emu.injected(), vec![Injected::Move(-7, 300)]);
    }

    #[test]
    fn test_key_event_is_translated_to_hid_usage() {
        // Arrange
        let (mut uc, emu) = use_case();

        // Act
        uc.handle(&Message::KeyEvent { keycode: KEY_A, pressed: true }).unwrap();
        uc.handle(&Message::KeyEvent { keycode: KEY_A, pressed: false }).unwrap();

        // Assert
        assert_eq!(
            emu.injected(),
            vec![
                Injected::Key(HidUsage::KEY_A, true),
                Injected::Key(HidUsage::KEY_A, false),
            ]
        );
    }

    #[test]
    fn test_unmapped_keycode_is_skipped_without_error() {
        let (mut uc, emu) = use_case();

        let result = uc.handle(&Message::KeyEvent { keycode: 0, pressed: true });

        assert!(result.is_ok());
        assert!(emu.injected().is_empty());
    }

    #[test]
    fn test_report_diff_releases_before_presses() {
        // Arrange: A + B held, then B + C.
        let (mut uc, emu) = use_case();
        uc.handle(&Message::KeyboardReport(report(0, &[0x04, 0x05]))).unwrap();
        emu.clear();

        // Act
        uc.handle(&Message::KeyboardReport(report(0, &[0x05, 0x06]))).unwrap();

        // Assert
        assert_eq!(
            emu.injected(),
            vec![
                Injected::Key(HidUsage(0x04), false),
                Injected::Key(HidUsage(0x06), true),
            ]
        );
    }

    #[test]
    fn test_report_modifier_changes_are_diffed() {
        // Arrange
        let (mut uc, emu) = use_case();
        uc.handle(&Message::KeyboardReport(report(ModifierFlags::LEFT_SHIFT, &[])))
            .unwrap();
        emu.clear();

        // Act: shift -> ctrl
        uc.handle(&Message::KeyboardReport(report(ModifierFlags::LEFT_CTRL, &[])))
            .unwrap();

        // Assert
        assert_eq!(
            emu.injected(),
            vec![
                Injected::Key(HidUsage::LEFT_SHIFT, false),
                Injected::Key(HidUsage::LEFT_CTRL, true),
            ]
        );
    }

    #[test]
    fn test_identical_report_injects_nothing() {
        let (mut uc, emu) = use_case();
        let r = report(ModifierFlags::RIGHT_ALT, &[0x04]);
        uc.handle(&Message::KeyboardReport(r)).unwrap();
        emu.clear();

        uc.handle(&Message::KeyboardReport(r)).unwrap();

        assert!(emu.injected().is_empty());
        assert_eq!(uc.applied_report(), r);
    }

    #[test]
    fn test_switch_tracks_remote_active() {
        let (mut uc, emu) = use_case();

        uc.handle(&Message::Switch(ControlState::Remote)).unwrap();
        assert!(uc.remote_active());
        uc.handle(&Message::Switch(ControlState::Local)).unwrap();

        assert!(!uc.remote_active());
        assert!(emu.injected().is_empty());
    }

    #[test]
    fn test_release_all_clears_report_keys_event_keys_and_buttons() {
        // Arrange
        let (mut uc, emu) = use_case();
        uc.handle(&Message::KeyboardReport(report(ModifierFlags::LEFT_SHIFT, &[0x04])))
            .unwrap();
        uc.handle(&Message::KeyEvent { keycode: KEY_LEFTSHIFT, pressed: true }).unwrap();
        uc.handle(&Message::MouseButton { button: MouseButton::Right, pressed: true })
            .unwrap();
        emu.clear();

        // Act
        uc.release_all().unwrap();

        // Assert: shift is released once even though both paths hold it.
        assert_eq!(
            emu.injected(),
            vec![
                Injected::Key(HidUsage(0x04), false),
                Injected::Key(HidUsage::LEFT_SHIFT, false),
                Injected::Button(MouseButton::Right, false),
            ]
        );
        assert_eq!(uc.applied_report(), KeyboardReport::EMPTY);

        emu.clear();
        uc.release_all().unwrap();
        assert!(emu.injected().is_empty());
    }

    #[test]
    fn test_released_button_is_not_released_again() {
        let (mut uc, emu) = use_case();
        uc.handle(&Message::MouseButton { button: MouseButton::Left, pressed: true })
            .unwrap();
        uc.handle(&Message::MouseButton { button: MouseButton::Left, pressed: false })
            .unwrap();
        emu.clear();

        uc.release_all().unwrap();

        assert!(emu.injected().is_empty());
    }

    #[test]
    fn test_failed_injection_still_applies_rest_of_report() {
        // Arrange
        let emulator = Arc::new(MockInputEmulator::failing());
        let mut uc = EmulateInputUseCase::new(emulator.clone());

        // Act
        let result = uc.handle(&Message::KeyboardReport(report(0, &[0x04, 0x05])));

        // Assert
        assert!(matches!(result, Err(EmulationError::Platform(_))));
        assert_eq!(uc.applied_report(), report(0, &[0x04, 0x05]));
    }

    #[test]
    fn test_emulator_sees_exactly_one_press_per_new_key() {
        // Arrange
        let mut emulator = MockPlatformInputEmulator::new();
        emulator
            .expect_emit_key()
            .with(eq(HidUsage::KEY_A), eq(true))
            .times(1)
            .returning(|_, _| Ok(()));
        let mut uc = EmulateInputUseCase::new(Arc::new(emulator));

        // Act
        uc.handle(&Message::KeyboardReport(report(0, &[0x04]))).unwrap();
        uc.handle(&Message::KeyboardReport(report(0, &[0x04]))).unwrap();
    }
}
