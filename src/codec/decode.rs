//! Frame decoders

use std::net::{Ipv4Addr, SocketAddrV4};

use bytes::Bytes;

use super::{is_terminated, read_fixed_str, read_u32};
use crate::protocol::{
    Command, ControlMessage, DataHeader, DataType, DecodeError, InboundMessage,
    CONTROL_MESSAGE_SIZE, DATAGRAM_PREFIX_SIZE, DATAGRAM_TOPIC_SIZE, HEADER_SIZE, IDENTITY_SIZE,
    MAX_DATAGRAM_SIZE, TOPIC_FIELD_SIZE,
};

/// Decode the identity handshake sent by a subscriber after connecting
pub fn decode_identity(buf: &[u8]) -> Result<String, DecodeError> {
    if buf.len() < IDENTITY_SIZE {
        return Err(DecodeError::InsufficientData);
    }
    let identity = read_fixed_str(&buf[..IDENTITY_SIZE])?;
    if identity.is_empty() {
        return Err(DecodeError::EmptyIdentity);
    }
    Ok(identity.to_string())
}

/// Decode a UDP publish datagram
///
/// Layout: 50-byte NUL-padded topic, 1-byte type tag, payload.
/// A datagram without payload is rejected: forwarding it would produce
/// a frame that reads as the close signal.
pub fn decode_inbound(buf: &[u8]) -> Result<InboundMessage, DecodeError> {
    if buf.len() <= DATAGRAM_PREFIX_SIZE {
        return Err(DecodeError::InsufficientData);
    }
    if buf.len() > MAX_DATAGRAM_SIZE {
        return Err(DecodeError::DatagramTooLarge(buf.len()));
    }

    let topic = read_fixed_str(&buf[..DATAGRAM_TOPIC_SIZE])?;
    if topic.is_empty() {
        return Err(DecodeError::EmptyTopic);
    }

    let tag = buf[DATAGRAM_TOPIC_SIZE];
    let data_type = DataType::from_u8(tag).ok_or(DecodeError::InvalidDataType(tag))?;

    let payload = &buf[DATAGRAM_PREFIX_SIZE..];
    let expected = data_type.min_payload_len();
    if payload.len() < expected {
        return Err(DecodeError::PayloadTooShort {
            expected,
            actual: payload.len(),
        });
    }

    Ok(InboundMessage {
        topic: topic.to_string(),
        data_type,
        payload: Bytes::copy_from_slice(payload),
    })
}

/// Decode a subscribe/unsubscribe control message
pub fn decode_control(buf: &[u8]) -> Result<ControlMessage, DecodeError> {
    if buf.len() < CONTROL_MESSAGE_SIZE {
        return Err(DecodeError::InsufficientData);
    }

    let command = Command::from_u8(buf[0]).ok_or(DecodeError::InvalidCommand(buf[0]))?;

    let field = &buf[1..CONTROL_MESSAGE_SIZE];
    if !is_terminated(field) {
        return Err(DecodeError::TopicTooLong);
    }
    let topic = read_fixed_str(field)?;
    if topic.is_empty() {
        return Err(DecodeError::EmptyTopic);
    }

    Ok(ControlMessage {
        command,
        topic: topic.to_string(),
    })
}

/// Decode the fixed header that precedes every packet sent to a subscriber
pub fn decode_header(buf: &[u8]) -> Result<DataHeader, DecodeError> {
    if buf.len() < HEADER_SIZE {
        return Err(DecodeError::InsufficientData);
    }

    let ip = Ipv4Addr::new(buf[0], buf[1], buf[2], buf[3]);
    let port = u32::from_ne_bytes([buf[4], buf[5], buf[6], buf[7]]);
    let port = u16::try_from(port).map_err(|_| DecodeError::InvalidPort(port))?;
    let total_length = read_u32(&buf[8..12])?;
    if (total_length as usize) < HEADER_SIZE {
        return Err(DecodeError::InvalidLength(total_length));
    }

    let tag = buf[12];
    let data_type = DataType::from_u8(tag).ok_or(DecodeError::InvalidDataType(tag))?;

    let field = &buf[13..13 + TOPIC_FIELD_SIZE];
    if !is_terminated(field) {
        return Err(DecodeError::TopicTooLong);
    }
    let topic = read_fixed_str(field)?;

    Ok(DataHeader {
        origin: SocketAddrV4::new(ip, port),
        total_length,
        data_type,
        topic: topic.to_string(),
    })
}
