//! Frame codec
//!
//! Provides encoding and decoding for every fixed-layout frame of the wire
//! protocol, plus the typed payload encodings shared with subscribers.
//! All functions are pure transformations over byte slices.

mod decode;
mod encode;
mod payload;

#[cfg(test)]
mod tests;

pub use decode::{decode_control, decode_header, decode_identity, decode_inbound};
pub use encode::{
    close_signal, encode_control, encode_data_packet, encode_datagram, encode_header,
    encode_identity,
};
pub use payload::Payload;

use bytes::{BufMut, BytesMut};

use crate::protocol::{DecodeError, EncodeError};

/// Read a NUL-padded text field.
/// The text ends at the first NUL byte, or at the end of the field.
#[inline]
pub fn read_fixed_str(field: &[u8]) -> Result<&str, DecodeError> {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    std::str::from_utf8(&field[..end]).map_err(|_| DecodeError::InvalidUtf8)
}

/// Returns true if the field holds a NUL terminator
#[inline]
pub fn is_terminated(field: &[u8]) -> bool {
    field.contains(&0)
}

/// Write text into a fixed-size field, padding the rest with NUL bytes.
/// Callers check the length limit of the field they are writing.
#[inline]
pub fn write_fixed_str(buf: &mut BytesMut, s: &str, field_size: usize) -> Result<(), EncodeError> {
    if s.len() > field_size {
        return Err(EncodeError::TopicTooLong);
    }
    if s.as_bytes().contains(&0) {
        return Err(EncodeError::InvalidTopic);
    }
    buf.put_slice(s.as_bytes());
    buf.put_bytes(0, field_size - s.len());
    Ok(())
}

/// Read a Four Byte Integer (u32 big-endian)
#[inline]
pub fn read_u32(buf: &[u8]) -> Result<u32, DecodeError> {
    if buf.len() < 4 {
        return Err(DecodeError::InsufficientData);
    }
    Ok(u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]))
}

/// Read a Two Byte Integer (u16 big-endian)
#[inline]
pub fn read_u16(buf: &[u8]) -> Result<u16, DecodeError> {
    if buf.len() < 2 {
        return Err(DecodeError::InsufficientData);
    }
    Ok(u16::from_be_bytes([buf[0], buf[1]]))
}
