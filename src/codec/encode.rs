//! Frame encoders

use std::net::SocketAddr;

use bytes::{BufMut, Bytes, BytesMut};

use super::write_fixed_str;
use crate::protocol::{
    ControlMessage, DataHeader, DataType, EncodeError, InboundMessage, DATAGRAM_TOPIC_SIZE,
    HEADER_SIZE, IDENTITY_SIZE, MAX_IDENTITY_LEN, MAX_PAYLOAD_SIZE, MAX_TOPIC_LEN,
    TOPIC_FIELD_SIZE,
};

/// Header-only frame with total length == header size and every other byte zero
const CLOSE_SIGNAL: [u8; HEADER_SIZE] = {
    let mut frame = [0u8; HEADER_SIZE];
    let len = (HEADER_SIZE as u32).to_be_bytes();
    frame[8] = len[0];
    frame[9] = len[1];
    frame[10] = len[2];
    frame[11] = len[3];
    frame
};

/// The close signal, ready to be written to a socket
pub fn close_signal() -> Bytes {
    Bytes::from_static(&CLOSE_SIGNAL)
}

fn check_topic(topic: &str) -> Result<(), EncodeError> {
    if topic.is_empty() || topic.as_bytes().contains(&0) {
        return Err(EncodeError::InvalidTopic);
    }
    if topic.len() > MAX_TOPIC_LEN {
        return Err(EncodeError::TopicTooLong);
    }
    Ok(())
}

/// Encode the identity handshake
pub fn encode_identity(identity: &str, buf: &mut BytesMut) -> Result<(), EncodeError> {
    if identity.is_empty() || identity.as_bytes().contains(&0) {
        return Err(EncodeError::InvalidIdentity);
    }
    if identity.len() > MAX_IDENTITY_LEN {
        return Err(EncodeError::IdentityTooLong);
    }
    buf.reserve(IDENTITY_SIZE);
    write_fixed_str(buf, identity, IDENTITY_SIZE)
}

/// Encode a subscribe/unsubscribe control message
pub fn encode_control(message: &ControlMessage, buf: &mut BytesMut) -> Result<(), EncodeError> {
    check_topic(&message.topic)?;
    buf.reserve(1 + TOPIC_FIELD_SIZE);
    buf.put_u8(message.command as u8);
    write_fixed_str(buf, &message.topic, TOPIC_FIELD_SIZE)
}

/// Encode a UDP publish datagram
pub fn encode_datagram(
    topic: &str,
    data_type: DataType,
    payload: &[u8],
    buf: &mut BytesMut,
) -> Result<(), EncodeError> {
    check_topic(topic)?;
    if payload.len() > MAX_PAYLOAD_SIZE {
        return Err(EncodeError::PayloadTooLarge);
    }
    buf.reserve(DATAGRAM_TOPIC_SIZE + 1 + payload.len());
    write_fixed_str(buf, topic, DATAGRAM_TOPIC_SIZE)?;
    buf.put_u8(data_type as u8);
    buf.put_slice(payload);
    Ok(())
}

/// Encode the fixed data header
pub fn encode_header(header: &DataHeader, buf: &mut BytesMut) -> Result<(), EncodeError> {
    if header.topic.len() > MAX_TOPIC_LEN {
        return Err(EncodeError::TopicTooLong);
    }
    buf.reserve(HEADER_SIZE);
    buf.put_slice(&header.origin.ip().octets());
    // The origin port is the one field kept in host byte order
    buf.put_u32_ne(header.origin.port() as u32);
    buf.put_u32(header.total_length);
    buf.put_u8(header.data_type as u8);
    write_fixed_str(buf, &header.topic, TOPIC_FIELD_SIZE)
}

/// Build the complete packet (header + payload) for one inbound message.
///
/// The returned buffer is immutable and released when its last handle drops,
/// whichever path (delivered, failed, discarded) the delivery takes.
pub fn encode_data_packet(origin: SocketAddr, message: &InboundMessage) -> Result<Bytes, EncodeError> {
    if message.payload.len() > MAX_PAYLOAD_SIZE {
        return Err(EncodeError::PayloadTooLarge);
    }

    let origin = match origin {
        SocketAddr::V4(v4) => v4,
        SocketAddr::V6(v6) => match v6.ip().to_ipv4_mapped() {
            Some(ip) => std::net::SocketAddrV4::new(ip, v6.port()),
            None => return Err(EncodeError::UnsupportedAddress),
        },
    };

    let total_length = HEADER_SIZE + message.payload.len();
    let header = DataHeader {
        origin,
        total_length: total_length as u32,
        data_type: message.data_type,
        topic: message.topic.clone(),
    };

    let mut buf = BytesMut::with_capacity(total_length);
    encode_header(&header, &mut buf)?;
    buf.put_slice(&message.payload);
    Ok(buf.freeze())
}
