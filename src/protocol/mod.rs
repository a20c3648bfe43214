//! Wire protocol definitions and types
//!
//! Defines the fixed-size frames exchanged between publishers, the broker
//! and subscribers:
//! - UDP publish datagram: 50-byte topic, 1-byte type tag, payload
//! - identity handshake: 50-byte client identity sent once after connect
//! - control message: 1-byte command + 51-byte topic field
//! - data header: origin address, total length, type tag, topic field
//! - close signal: a data header with no payload

mod error;
mod packet;

pub use error::{DecodeError, EncodeError, ProtocolError};
pub use packet::*;

/// Size of the identity handshake sent by a subscriber after connecting
pub const IDENTITY_SIZE: usize = 50;

/// Maximum identity length in bytes
pub const MAX_IDENTITY_LEN: usize = IDENTITY_SIZE;

/// Size of the topic field in control messages and data headers
/// (50 topic bytes plus terminator)
pub const TOPIC_FIELD_SIZE: usize = 51;

/// Maximum topic or pattern length in bytes
pub const MAX_TOPIC_LEN: usize = TOPIC_FIELD_SIZE - 1;

/// Size of the topic area at the start of a UDP datagram
pub const DATAGRAM_TOPIC_SIZE: usize = 50;

/// Topic area plus the type tag
pub const DATAGRAM_PREFIX_SIZE: usize = DATAGRAM_TOPIC_SIZE + 1;

/// Maximum payload carried by one datagram
pub const MAX_PAYLOAD_SIZE: usize = 1500;

/// Maximum accepted datagram size
pub const MAX_DATAGRAM_SIZE: usize = DATAGRAM_PREFIX_SIZE + MAX_PAYLOAD_SIZE;

/// Size of a control message (command byte + topic field)
pub const CONTROL_MESSAGE_SIZE: usize = 1 + TOPIC_FIELD_SIZE;

/// Size of the TCP data header
/// (ip 4 + port 4 + length 4 + type 1 + topic 51)
pub const HEADER_SIZE: usize = 4 + 4 + 4 + 1 + TOPIC_FIELD_SIZE;

/// Payload data type carried in the type tag byte
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum DataType {
    /// Sign byte + 4-byte big-endian magnitude
    #[default]
    Int = 0,
    /// 2-byte big-endian hundredths
    ShortReal = 1,
    /// Sign byte + 4-byte big-endian magnitude + exponent byte
    Float = 2,
    /// Raw bytes
    String = 3,
}

impl DataType {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(DataType::Int),
            1 => Some(DataType::ShortReal),
            2 => Some(DataType::Float),
            3 => Some(DataType::String),
            _ => None,
        }
    }

    /// Smallest payload that can hold a value of this type
    pub fn min_payload_len(self) -> usize {
        match self {
            DataType::Int => 5,
            DataType::ShortReal => 2,
            DataType::Float => 6,
            DataType::String => 1,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DataType::Int => "INT",
            DataType::ShortReal => "SHORT_REAL",
            DataType::Float => "FLOAT",
            DataType::String => "STRING",
        }
    }
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Subscription control command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Command {
    Unsubscribe = 0,
    Subscribe = 1,
}

impl Command {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Command::Unsubscribe),
            1 => Some(Command::Subscribe),
            _ => None,
        }
    }
}
