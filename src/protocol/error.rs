//! Protocol error types

use std::fmt;

/// Errors that can occur while decoding a frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Not enough data for the fixed-size part of the frame
    InsufficientData,
    /// Datagram exceeds the maximum datagram size
    DatagramTooLarge(usize),
    /// Unknown data type tag
    InvalidDataType(u8),
    /// Unknown control command
    InvalidCommand(u8),
    /// Sign byte other than 0 or 1
    InvalidSign(u8),
    /// Invalid UTF-8 in a text field
    InvalidUtf8,
    /// Topic field is empty
    EmptyTopic,
    /// Identity field is empty
    EmptyIdentity,
    /// Topic field is not terminated within its fixed size
    TopicTooLong,
    /// Payload shorter than its data type requires
    PayloadTooShort { expected: usize, actual: usize },
    /// Header declares a length smaller than the header itself
    InvalidLength(u32),
    /// Header origin port does not fit 16 bits
    InvalidPort(u32),
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InsufficientData => write!(f, "insufficient data in buffer"),
            Self::DatagramTooLarge(n) => write!(f, "datagram too large: {} bytes", n),
            Self::InvalidDataType(t) => write!(f, "invalid data type: {}", t),
            Self::InvalidCommand(c) => write!(f, "invalid command: {}", c),
            Self::InvalidSign(s) => write!(f, "invalid sign byte: {}", s),
            Self::InvalidUtf8 => write!(f, "invalid UTF-8 string"),
            Self::EmptyTopic => write!(f, "empty topic"),
            Self::EmptyIdentity => write!(f, "empty client identity"),
            Self::TopicTooLong => write!(f, "topic is not terminated"),
            Self::PayloadTooShort { expected, actual } => write!(
                f,
                "payload too short: expected at least {} bytes, got {}",
                expected, actual
            ),
            Self::InvalidLength(len) => write!(f, "invalid total length: {}", len),
            Self::InvalidPort(port) => write!(f, "invalid origin port: {}", port),
        }
    }
}

impl std::error::Error for DecodeError {}

/// Errors that can occur while encoding a frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncodeError {
    /// Topic does not fit its fixed-size field
    TopicTooLong,
    /// Identity does not fit the handshake
    IdentityTooLong,
    /// Payload exceeds the maximum payload size
    PayloadTooLarge,
    /// Topic contains a NUL byte or is empty
    InvalidTopic,
    /// Identity contains a NUL byte or is empty
    InvalidIdentity,
    /// Numeric value cannot be represented by its encoding
    ValueOutOfRange,
    /// Origin address is not IPv4
    UnsupportedAddress,
}

impl fmt::Display for EncodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TopicTooLong => write!(f, "topic too long"),
            Self::IdentityTooLong => write!(f, "identity too long"),
            Self::PayloadTooLarge => write!(f, "payload too large"),
            Self::InvalidTopic => write!(f, "invalid topic"),
            Self::InvalidIdentity => write!(f, "invalid identity"),
            Self::ValueOutOfRange => write!(f, "value out of range"),
            Self::UnsupportedAddress => write!(f, "origin address is not IPv4"),
        }
    }
}

impl std::error::Error for EncodeError {}

/// High-level protocol errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Decode error
    Decode(DecodeError),
    /// Encode error
    Encode(EncodeError),
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Decode(e) => write!(f, "decode error: {}", e),
            Self::Encode(e) => write!(f, "encode error: {}", e),
        }
    }
}

impl std::error::Error for ProtocolError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Decode(e) => Some(e),
            Self::Encode(e) => Some(e),
        }
    }
}

impl From<DecodeError> for ProtocolError {
    fn from(e: DecodeError) -> Self {
        ProtocolError::Decode(e)
    }
}

impl From<EncodeError> for ProtocolError {
    fn from(e: EncodeError) -> Self {
        ProtocolError::Encode(e)
    }
}
