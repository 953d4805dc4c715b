//! Fixed-stride binary codec for OneKM records.
//!
//! Wire format (every record is [`RECORD_SIZE`] bytes):
//! ```text
//! [version:1][type:1][a:2][b:2][reserved:4]
//! ```
//! `KEYBOARD_REPORT` reuses bytes 2..10 as `[modifiers:1][reserved:1][keys:6]`.
//! All multi-byte integers are big-endian.

use thiserror::Error;

use crate::domain::control::ControlState;
use crate::keymap::hid::HidUsage;
use crate::protocol::messages::{
    KeyboardReport, Message, MessageType, ModifierFlags, MouseButton, PROTOCOL_VERSION,
    RECORD_SIZE, REPORT_KEY_SLOTS,
};

/// Errors that can occur while decoding a record.
#[derive(Debug, Error, PartialEq)]
pub enum ProtocolError {
    /// The byte slice is shorter than one record.
    #[error("insufficient data: need at least {needed} bytes, got {available}")]
    InsufficientData { needed: usize, available: usize },

    /// The type byte is not a recognized tag.
    #[error("unknown message type: 0x{0:02X}")]
    UnknownMessageType(u8),

    /// The version byte is not [`PROTOCOL_VERSION`].
    #[error("unsupported protocol version: {0}")]
    UnsupportedVersion(u8),

    /// A field holds a value outside its domain.
    #[error("malformed payload: {0}")]
    MalformedPayload(String),
}

const OFFSET_VERSION: usize = 0;
const OFFSET_TYPE: usize = 1;
const OFFSET_A: usize = 2;
const OFFSET_B: usize = 4;
const OFFSET_REPORT_MODIFIERS: usize = 2;
const OFFSET_REPORT_KEYS: usize = 4;

// ── Public API ────────────────────────────────────────────────────────────────

/// Encodes a [`Message`] into exactly one record.
///
/// # Examples
///
/// ```rust
/// use onekm_core::protocol::{decode_message, encode_message, Message, RECORD_SIZE};
///
/// let msg = Message::MouseMove { dx: -3, dy: 7 };
/// let record = encode_message(&msg);
/// assert_eq!(record.len(), RECORD_SIZE);
/// assert_eq!(decode_message(&record).unwrap(), msg);
/// ```
pub fn encode_message(msg: &Message) -> [u8; RECORD_SIZE] {
    let mut buf = [0u8; RECORD_SIZE];
    buf[OFFSET_VERSION] = PROTOCOL_VERSION;
    buf[OFFSET_TYPE] = msg.message_type() as u8;

    match msg {
        Message::MouseMove { dx, dy } => {
            write_i16(&mut buf, OFFSET_A, *dx);
            write_i16(&mut buf, OFFSET_B, *dy);
        }
        Message::MouseButton { button, pressed } => {
            write_u16(&mut buf, OFFSET_A, button.wire_id());
            write_u16(&mut buf, OFFSET_B, u16::from(*pressed));
        }
        Message::KeyEvent { keycode, pressed } => {
            write_u16(&mut buf, OFFSET_A, *keycode);
            write_u16(&mut buf, OFFSET_B, u16::from(*pressed));
        }
        Message::KeyboardReport(report) => {
            buf[OFFSET_REPORT_MODIFIERS] = report.modifiers.0;
            for (slot, key) in report.keys.iter().enumerate() {
                buf[OFFSET_REPORT_KEYS + slot] = key.0;
            }
        }
        Message::Switch(state) => {
            write_u16(&mut buf, OFFSET_A, state.wire_value());
        }
    }

    buf
}

/// Decodes one record from the front of `buf`.
///
/// Bytes past the first [`RECORD_SIZE`] are ignored.
///
/// # Errors
///
/// Returns [`ProtocolError`] if `buf` is short, the version or type byte is
/// unrecognized, or a field is out of range.
pub fn decode_message(buf: &[u8]) -> Result<Message, ProtocolError> {
    if buf.len() < RECORD_SIZE {
        return Err(ProtocolError::InsufficientData {
            needed: RECORD_SIZE,
            available: buf.len(),
        });
    }

    let version = buf[OFFSET_VERSION];
    if version != PROTOCOL_VERSION {
        return Err(ProtocolError::UnsupportedVersion(version));
    }

    let tag = buf[OFFSET_TYPE];
    let msg_type = MessageType::try_from(tag).map_err(|_| ProtocolError::UnknownMessageType(tag))?;

    let a = read_u16(buf, OFFSET_A);
    let b = read_u16(buf, OFFSET_B);

    let msg = match msg_type {
        MessageType::MouseMove => Message::MouseMove {
            dx: a as i16,
            dy: b as i16,
        },
        MessageType::MouseButton => Message::MouseButton {
            button: MouseButton::try_from(a).map_err(|_| {
                ProtocolError::MalformedPayload(format!("unknown mouse button id: {a}"))
            })?,
            pressed: decode_flag(b, "mouse button state")?,
        },
        MessageType::KeyEvent => Message::KeyEvent {
            keycode: a,
            pressed: decode_flag(b, "key state")?,
        },
        MessageType::KeyboardReport => {
            let mut keys = [HidUsage::NONE; REPORT_KEY_SLOTS];
            for (slot, key) in keys.iter_mut().enumerate() {
                *key = HidUsage(buf[OFFSET_REPORT_KEYS + slot]);
            }
            Message::KeyboardReport(KeyboardReport {
                modifiers: ModifierFlags(buf[OFFSET_REPORT_MODIFIERS]),
                keys,
            })
        }
        MessageType::Switch => Message::Switch(ControlState::from_wire_value(a).ok_or_else(
            || ProtocolError::MalformedPayload(format!("invalid switch target: {a}")),
        )?),
    };

    Ok(msg)
}

// ── Field helpers ─────────────────────────────────────────────────────────────

fn decode_flag(value: u16, context: &str) -> Result<bool, ProtocolError> {
    match value {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(ProtocolError::MalformedPayload(format!(
            "{context}: expected 0 or 1, got {other}"
        ))),
    }
}

fn write_u16(buf: &mut [u8; RECORD_SIZE], offset: usize, value: u16) {
    buf[offset..offset + 2].copy_from_slice(&value.to_be_bytes());
}

fn write_i16(buf: &mut [u8; RECORD_SIZE], offset: usize, value: i16) {
    buf[offset..offset + 2].copy_from_slice(&value.to_be_bytes());
}

fn read_u16(buf: &[u8], offset: usize) -> u16 {
    u16::from_be_bytes([buf[offset], buf[offset + 1]])
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(msg: &Message) -> Message {
        let encoded = encode_message(msg);
        decode_message(&encoded).expect("decode failed")
    }

    #[test]
    fn test_mouse_move_round_trip_preserves_negative_deltas() {
        let msg = Message::MouseMove {
            dx: i16::MIN,
            dy: -1,
        };
        assert_eq!(round_trip(&msg), msg);
    }

    #[test]
    fn test_keyboard_report_round_trip_preserves_slot_order() {
        // Arrange
        let mut report = KeyboardReport::EMPTY;
        report.modifiers = ModifierFlags(ModifierFlags::LEFT_CTRL | ModifierFlags::RIGHT_GUI);
        report.keys[0] = HidUsage(0x16);
        report.keys[1] = HidUsage(0x04);

        // Act
        let decoded = round_trip(&Message::KeyboardReport(report));

        // Assert
        assert_eq!(decoded, Message::KeyboardReport(report));
    }

    #[test]
    fn test_switch_round_trip_for_both_states() {
        for state in [ControlState::Local, ControlState::Remote] {
            assert_eq!(round_trip(&Message::Switch(state)), Message::Switch(state));
        }
    }

    #[test]
    fn test_encoded_layout_matches_wire_table() {
        // Arrange / Act
        let record = encode_message(&Message::MouseButton {
            button: MouseButton::Right,
            pressed: true,
        });

        // Assert
        assert_eq!(record, [0x01, 0x02, 0x00, 0x02, 0x00, 0x01, 0, 0, 0, 0]);
    }

    #[test]
    fn test_switch_remote_encodes_a_as_one() {
        let record = encode_message(&Message::Switch(ControlState::Remote));
        assert_eq!(&record[..4], &[0x01, 0x05, 0x00, 0x01]);
        let record = encode_message(&Message::Switch(ControlState::Local));
        assert_eq!(&record[..4], &[0x01, 0x05, 0x00, 0x00]);
    }

    #[test]
    fn test_all_variants_encode_to_the_same_stride() {
        let messages = [
            Message::MouseMove { dx: 1, dy: 2 },
            Message::MouseButton {
                button: MouseButton::Middle,
                pressed: false,
            },
            Message::KeyEvent {
                keycode: 30,
                pressed: true,
            },
            Message::KeyboardReport(KeyboardReport::EMPTY),
            Message::Switch(ControlState::Local),
        ];
        for msg in messages {
            assert_eq!(encode_message(&msg).len(), RECORD_SIZE, "{msg}");
        }
    }

    #[test]
    fn test_decode_short_buffer_returns_insufficient_data() {
        let err = decode_message(&[0x01, 0x01, 0x00]).unwrap_err();
        assert_eq!(
            err,
            ProtocolError::InsufficientData {
                needed: RECORD_SIZE,
                available: 3
            }
        );
    }

    #[test]
    fn test_decode_wrong_version_is_rejected() {
        let mut record = encode_message(&Message::MouseMove { dx: 0, dy: 0 });
        record[0] = 0x7F;
        assert_eq!(
            decode_message(&record).unwrap_err(),
            ProtocolError::UnsupportedVersion(0x7F)
        );
    }

    #[test]
    fn test_decode_unknown_tag_is_rejected() {
        let mut record = encode_message(&Message::MouseMove { dx: 0, dy: 0 });
        record[1] = 0x09;
        assert_eq!(
            decode_message(&record).unwrap_err(),
            ProtocolError::UnknownMessageType(0x09)
        );
    }

    #[test]
    fn test_decode_out_of_range_button_is_malformed() {
        let mut record = encode_message(&Message::MouseButton {
            button: MouseButton::Left,
            pressed: true,
        });
        record[3] = 7;
        assert!(matches!(
            decode_message(&record),
            Err(ProtocolError::MalformedPayload(_))
        ));
    }

    #[test]
    fn test_decode_pressed_flag_outside_zero_one_is_malformed() {
        let mut record = encode_message(&Message::KeyEvent {
            keycode: 30,
            pressed: true,
        });
        record[5] = 2;
        assert!(matches!(
            decode_message(&record),
            Err(ProtocolError::MalformedPayload(_))
        ));
    }

    #[test]
    fn test_decode_invalid_switch_value_is_malformed() {
        let mut record = encode_message(&Message::Switch(ControlState::Remote));
        record[3] = 2;
        assert!(matches!(
            decode_message(&record),
            Err(ProtocolError::MalformedPayload(_))
        ));
    }

    #[test]
    fn test_decode_ignores_trailing_bytes() {
        let msg = Message::KeyEvent {
            keycode: 42,
            pressed: false,
        };
        let mut bytes = encode_message(&msg).to_vec();
        bytes.extend_from_slice(&[0xAA; 4]);
        assert_eq!(decode_message(&bytes).unwrap(), msg);
    }
}
