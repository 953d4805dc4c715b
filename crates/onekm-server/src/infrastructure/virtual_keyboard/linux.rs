//! uinput-backed key-sync sink.

use evdev::uinput::{VirtualDevice, VirtualDeviceBuilder};
use evdev::{AttributeSet, BusType, EventType, InputEvent, InputId, Key};
use tracing::info;

use onekm_core::keymap::evdev::KEY_DOMAIN;

use super::{KeySyncError, KeySyncSink};

/// Virtual keyboard able to emit any key code in `1..256`.
pub struct UinputKeySync {
    device: VirtualDevice,
}

impl UinputKeySync {
    /// Creates the virtual keyboard.
    ///
    /// # Errors
    ///
    /// Returns [`KeySyncError::Create`] if `/dev/uinput` is unavailable or the
    /// process lacks permission to use it.
    pub fn create(name: &str) -> Result<Self, KeySyncError> {
        let mut keys = AttributeSet::<Key>::new();
        for code in 1..KEY_DOMAIN as u16 {
            keys.insert(Key::new(code));
        }

        let device = VirtualDeviceBuilder::new()
            .map_err(KeySyncError::Create)?
            .name(name)
            .input_id(InputId::new(BusType::BUS_USB, 0x1234, 0x5678, 1))
            .with_keys(&keys)
            .map_err(KeySyncError::Create)?
            .build()
            .map_err(KeySyncError::Create)?;

        info!("created key-sync device \"{name}\"");
        Ok(Self { device })
    }
}

impl KeySyncSink for UinputKeySync {
    fn inject_release(&mut self, code: u16) -> Result<(), KeySyncError> {
        // `emit` appends the SYN_REPORT.
        self.device
            .emit(&[InputEvent::new(EventType::KEY, code, 0)])
            .map_err(|source| KeySyncError::Inject { code, source })
    }
}
