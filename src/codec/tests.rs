//! Codec tests
//!
//! Covers every fixed-layout frame and the four payload encodings.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

use bytes::{Bytes, BytesMut};
use pretty_assertions::assert_eq;

use crate::codec::{
    close_signal, decode_control, decode_header, decode_identity, decode_inbound, encode_control,
    encode_data_packet, encode_datagram, encode_header, encode_identity, Payload,
};
use crate::protocol::{
    Command, ControlMessage, DataHeader, DataType, DecodeError, EncodeError, InboundMessage,
    CONTROL_MESSAGE_SIZE, HEADER_SIZE, IDENTITY_SIZE, MAX_DATAGRAM_SIZE, MAX_PAYLOAD_SIZE,
};

fn datagram(topic: &str, data_type: DataType, payload: &[u8]) -> BytesMut {
    let mut buf = BytesMut::new();
    encode_datagram(topic, data_type, payload, &mut buf).unwrap();
    buf
}

fn payload_bytes(payload: &Payload) -> BytesMut {
    let mut buf = BytesMut::new();
    payload.encode(&mut buf).unwrap();
    buf
}

// ============================================================================
// Identity handshake
// ============================================================================

#[test]
fn test_identity_is_padded_to_fixed_size() {
    let mut buf = BytesMut::new();
    encode_identity("C1", &mut buf).unwrap();
    assert_eq!(buf.len(), IDENTITY_SIZE);
    assert_eq!(&buf[..2], b"C1");
    assert!(buf[2..].iter().all(|&b| b == 0));
    assert_eq!(decode_identity(&buf).unwrap(), "C1");
}

#[test]
fn test_identity_of_maximum_length_has_no_terminator() {
    let identity = "x".repeat(IDENTITY_SIZE);
    let mut buf = BytesMut::new();
    encode_identity(&identity, &mut buf).unwrap();
    assert_eq!(decode_identity(&buf).unwrap(), identity);
}

#[test]
fn test_identity_rejections() {
    let mut buf = BytesMut::new();
    assert_eq!(
        encode_identity(&"x".repeat(IDENTITY_SIZE + 1), &mut buf),
        Err(EncodeError::IdentityTooLong)
    );
    assert_eq!(encode_identity("", &mut buf), Err(EncodeError::InvalidIdentity));
    assert_eq!(
        decode_identity(&[0u8; IDENTITY_SIZE]),
        Err(DecodeError::EmptyIdentity)
    );
    assert_eq!(decode_identity(b"short"), Err(DecodeError::InsufficientData));
}

// ============================================================================
// UDP datagrams
// ============================================================================

#[test]
fn test_decode_inbound_layout() {
    let mut raw = vec![0u8; 51];
    raw[..11].copy_from_slice(b"upb/precis/");
    raw[50] = DataType::String as u8;
    raw.extend_from_slice(b"hello");

    let msg = decode_inbound(&raw).unwrap();
    assert_eq!(msg.topic, "upb/precis/");
    assert_eq!(msg.data_type, DataType::String);
    assert_eq!(msg.payload, Bytes::from_static(b"hello"));
}

#[test]
fn test_decode_inbound_topic_uses_whole_area() {
    let topic = "t".repeat(50);
    let buf = datagram(&topic, DataType::ShortReal, &[0x30, 0x39]);
    let msg = decode_inbound(&buf).unwrap();
    assert_eq!(msg.topic, topic);
    assert_eq!(msg.data_type, DataType::ShortReal);
}

#[test]
fn test_decode_inbound_rejects_truncated_prefix() {
    assert_eq!(decode_inbound(&[0u8; 10]), Err(DecodeError::InsufficientData));
    // Prefix only, no payload: would look like a close signal downstream
    let buf = datagram("a", DataType::String, &[]);
    assert_eq!(decode_inbound(&buf), Err(DecodeError::InsufficientData));
}

#[test]
fn test_decode_inbound_rejects_bad_fields() {
    let mut buf = datagram("a/b", DataType::Int, &[0, 0, 0, 0, 1]);
    buf[50] = 9;
    assert_eq!(decode_inbound(&buf), Err(DecodeError::InvalidDataType(9)));

    let buf = datagram("a/b", DataType::Int, &[0, 0, 1]);
    assert_eq!(
        decode_inbound(&buf),
        Err(DecodeError::PayloadTooShort {
            expected: 5,
            actual: 3
        })
    );

    let mut raw = vec![0u8; 60];
    raw[50] = DataType::String as u8;
    assert_eq!(decode_inbound(&raw), Err(DecodeError::EmptyTopic));

    let raw = vec![b'a'; MAX_DATAGRAM_SIZE + 1];
    assert_eq!(
        decode_inbound(&raw),
        Err(DecodeError::DatagramTooLarge(MAX_DATAGRAM_SIZE + 1))
    );
}

#[test]
fn test_encode_datagram_rejects_oversized_input() {
    let mut buf = BytesMut::new();
    assert_eq!(
        encode_datagram(&"t".repeat(51), DataType::String, b"x", &mut buf),
        Err(EncodeError::TopicTooLong)
    );
    assert_eq!(
        encode_datagram("t", DataType::String, &vec![b'x'; MAX_PAYLOAD_SIZE + 1], &mut buf),
        Err(EncodeError::PayloadTooLarge)
    );
}

// ============================================================================
// Control messages
// ============================================================================

#[test]
fn test_control_message_layout() {
    let mut buf = BytesMut::new();
    encode_control(&ControlMessage::subscribe("a/+/c"), &mut buf).unwrap();
    assert_eq!(buf.len(), CONTROL_MESSAGE_SIZE);
    assert_eq!(buf[0], 1);
    assert_eq!(&buf[1..6], b"a/+/c");

    let decoded = decode_control(&buf).unwrap();
    assert_eq!(decoded.command, Command::Subscribe);
    assert_eq!(decoded.topic, "a/+/c");

    buf.clear();
    encode_control(&ControlMessage::unsubscribe("x"), &mut buf).unwrap();
    assert_eq!(buf[0], 0);
    assert_eq!(decode_control(&buf).unwrap().command, Command::Unsubscribe);
}

#[test]
fn test_control_message_errors() {
    let mut raw = [0u8; CONTROL_MESSAGE_SIZE];
    raw[0] = 7;
    raw[1] = b'a';
    assert_eq!(decode_control(&raw), Err(DecodeError::InvalidCommand(7)));

    raw[0] = 1;
    raw[1] = 0;
    assert_eq!(decode_control(&raw), Err(DecodeError::EmptyTopic));

    let mut unterminated = [b'z'; CONTROL_MESSAGE_SIZE];
    unterminated[0] = 1;
    assert_eq!(decode_control(&unterminated), Err(DecodeError::TopicTooLong));

    assert_eq!(decode_control(&raw[..20]), Err(DecodeError::InsufficientData));
}

// ============================================================================
// Data header, packets and the close signal
// ============================================================================

#[test]
fn test_header_layout() {
    let header = DataHeader {
        origin: SocketAddrV4::new(Ipv4Addr::new(127, 0, 0, 1), 40000),
        total_length: (HEADER_SIZE + 5) as u32,
        data_type: DataType::Int,
        topic: "a/b".to_string(),
    };
    let mut buf = BytesMut::new();
    encode_header(&header, &mut buf).unwrap();

    assert_eq!(buf.len(), HEADER_SIZE);
    assert_eq!(&buf[0..4], &[127, 0, 0, 1]);
    assert_eq!(&buf[4..8], &40000u32.to_ne_bytes());
    assert_eq!(&buf[8..12], &((HEADER_SIZE + 5) as u32).to_be_bytes());
    assert_eq!(buf[12], DataType::Int as u8);
    assert_eq!(&buf[13..16], b"a/b");
    assert_eq!(decode_header(&buf).unwrap(), header);
}

#[test]
fn test_data_packet_carries_payload_verbatim() {
    let message = InboundMessage {
        topic: "sensors/temp".to_string(),
        data_type: DataType::Float,
        payload: Bytes::from_static(&[1, 0, 0, 0x30, 0x39, 2]),
    };
    let origin: SocketAddr = "10.0.0.7:5000".parse().unwrap();
    let packet = encode_data_packet(origin, &message).unwrap();

    assert_eq!(packet.len(), HEADER_SIZE + 6);
    let header = decode_header(&packet).unwrap();
    assert_eq!(header.origin, "10.0.0.7:5000".parse::<SocketAddrV4>().unwrap());
    assert_eq!(header.payload_len(), 6);
    assert_eq!(header.topic, "sensors/temp");
    assert_eq!(header.data_type, DataType::Float);
    assert!(!header.is_close_signal());
    assert_eq!(&packet[HEADER_SIZE..], &message.payload[..]);
}

#[test]
fn test_data_packet_maps_ipv4_mapped_origin() {
    let message = InboundMessage {
        topic: "t".to_string(),
        data_type: DataType::String,
        payload: Bytes::from_static(b"x"),
    };
    let origin: SocketAddr = "[::ffff:192.168.1.2]:7000".parse().unwrap();
    let packet = encode_data_packet(origin, &message).unwrap();
    assert_eq!(&packet[0..4], &[192, 168, 1, 2]);

    let origin: SocketAddr = "[2001:db8::1]:7000".parse().unwrap();
    assert_eq!(
        encode_data_packet(origin, &message),
        Err(EncodeError::UnsupportedAddress)
    );
}

#[test]
fn test_data_packet_origin_port_in_host_order() {
    let message = InboundMessage {
        topic: "t".to_string(),
        data_type: DataType::ShortReal,
        payload: Bytes::from_static(&[0, 1]),
    };
    let packet = encode_data_packet("10.0.0.1:6000".parse().unwrap(), &message).unwrap();

    assert_eq!(&packet[0..4], &[10, 0, 0, 1]);
    assert_eq!(&packet[4..8], &6000u32.to_ne_bytes());
    // Length stays in network order
    assert_eq!(&packet[8..12], &((HEADER_SIZE + 2) as u32).to_be_bytes());
    assert_eq!(decode_header(&packet).unwrap().origin.port(), 6000);
}

#[test]
fn test_header_rejects_port_out_of_range() {
    let mut raw = close_signal().to_vec();
    raw[4..8].copy_from_slice(&70000u32.to_ne_bytes());
    assert_eq!(decode_header(&raw), Err(DecodeError::InvalidPort(70000)));
}

#[test]
fn test_close_signal_is_header_only() {
    let signal = close_signal();
    assert_eq!(signal.len(), HEADER_SIZE);
    let header = decode_header(&signal).unwrap();
    assert!(header.is_close_signal());
    assert_eq!(header, DataHeader::close_signal());
    // All bytes except the length are zero
    assert!(signal[..8].iter().all(|&b| b == 0));
    assert!(signal[12..].iter().all(|&b| b == 0));
}

#[test]
fn test_header_rejects_impossible_length() {
    let mut raw = close_signal().to_vec();
    raw[11] = 10;
    raw[10] = 0;
    assert_eq!(decode_header(&raw), Err(DecodeError::InvalidLength(10)));
}

// ============================================================================
// Payload encodings
// ============================================================================

#[test]
fn test_int_negative_round_trip() {
    let buf = payload_bytes(&Payload::Int(-12345));
    assert_eq!(&buf[..], &[1, 0, 0, 0x30, 0x39]);
    assert_eq!(Payload::decode(DataType::Int, &buf).unwrap(), Payload::Int(-12345));
    assert_eq!(Payload::Int(-12345).to_string(), "-12345");
}

#[test]
fn test_int_out_of_range() {
    let mut buf = BytesMut::new();
    assert_eq!(
        Payload::Int(i64::from(u32::MAX) + 1).encode(&mut buf),
        Err(EncodeError::ValueOutOfRange)
    );
    assert!(Payload::Int(-i64::from(u32::MAX)).encode(&mut buf).is_ok());
}

#[test]
fn test_short_real_round_trip() {
    let payload = Payload::short_real(123.45).unwrap();
    let buf = payload_bytes(&payload);
    assert_eq!(&buf[..], &12345u16.to_be_bytes());
    let decoded = Payload::decode(DataType::ShortReal, &buf).unwrap();
    assert!((decoded.as_f64().unwrap() - 123.45).abs() < 0.01);
    assert_eq!(decoded.to_string(), "123.45");
    assert_eq!(Payload::short_real(-1.0), Err(EncodeError::ValueOutOfRange));
}

#[test]
fn test_float_round_trip() {
    let payload = Payload::Float {
        negative: true,
        magnitude: 314159,
        exponent: 2,
    };
    let buf = payload_bytes(&payload);
    assert_eq!(buf.len(), 6);
    let decoded = Payload::decode(DataType::Float, &buf).unwrap();
    assert_eq!(decoded, payload);
    assert_eq!(decoded.to_string(), "-3141.5900");
}

#[test]
fn test_string_payload() {
    let buf = payload_bytes(&Payload::String("Hello World".to_string()));
    assert_eq!(
        Payload::decode(DataType::String, &buf).unwrap(),
        Payload::String("Hello World".to_string())
    );
    // Trailing NUL padding is not part of the value
    assert_eq!(
        Payload::decode(DataType::String, b"abc\0\0").unwrap(),
        Payload::String("abc".to_string())
    );
}

#[test]
fn test_payload_decode_errors() {
    assert_eq!(
        Payload::decode(DataType::Int, &[2, 0, 0, 0, 1]),
        Err(DecodeError::InvalidSign(2))
    );
    assert_eq!(
        Payload::decode(DataType::Float, &[0, 0, 0]),
        Err(DecodeError::PayloadTooShort {
            expected: 6,
            actual: 3
        })
    );
    assert_eq!(
        Payload::decode(DataType::String, &[0xff, 0xfe]),
        Err(DecodeError::InvalidUtf8)
    );
}

// ============================================================================
// Property-Based Tests (using proptest)
// ============================================================================

mod proptest_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(500))]

        #[test]
        fn prop_int_roundtrip(value in -(u32::MAX as i64)..=(u32::MAX as i64)) {
            let buf = payload_bytes(&Payload::Int(value));
            prop_assert_eq!(Payload::decode(DataType::Int, &buf).unwrap(), Payload::Int(value));
        }

        #[test]
        fn prop_float_roundtrip(negative in any::<bool>(), magnitude in any::<u32>(), exponent in 0u8..10) {
            let payload = Payload::Float { negative, magnitude, exponent };
            let buf = payload_bytes(&payload);
            prop_assert_eq!(Payload::decode(DataType::Float, &buf).unwrap(), payload);
        }

        #[test]
        fn prop_control_roundtrip(topic in "[a-zA-Z0-9_+*/]{1,50}", subscribe in any::<bool>()) {
            let message = if subscribe {
                ControlMessage::subscribe(topic)
            } else {
                ControlMessage::unsubscribe(topic)
            };
            let mut buf = BytesMut::new();
            encode_control(&message, &mut buf).unwrap();
            prop_assert_eq!(buf.len(), CONTROL_MESSAGE_SIZE);
            prop_assert_eq!(decode_control(&buf).unwrap(), message);
        }

        #[test]
        fn prop_datagram_payload_preserved(
            topic in "[a-z/]{1,50}",
            payload in proptest::collection::vec(1u8..=255, 1..MAX_PAYLOAD_SIZE),
        ) {
            let buf = datagram(&topic, DataType::String, &payload);
            let msg = decode_inbound(&buf).unwrap();
            prop_assert_eq!(msg.topic, topic);
            prop_assert_eq!(&msg.payload[..], &payload[..]);
        }
    }
}
