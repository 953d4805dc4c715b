//! Protocol module containing the message types and the fixed-stride codec.

pub mod codec;
pub mod messages;

pub use codec::{decode_message, encode_message, ProtocolError};
pub use messages::*;
