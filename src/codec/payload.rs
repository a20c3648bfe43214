//! Typed payload encodings
//!
//! - INT: sign byte (0 positive, 1 negative) + u32 big-endian magnitude
//! - SHORT_REAL: u16 big-endian, value = integer / 100
//! - FLOAT: sign byte + u32 big-endian magnitude + exponent byte,
//!   value = sign * magnitude * 10^(-exponent)
//! - STRING: raw UTF-8 bytes, length taken from the frame

use std::fmt;

use bytes::{BufMut, BytesMut};

use super::{read_u16, read_u32};
use crate::protocol::{DataType, DecodeError, EncodeError, MAX_PAYLOAD_SIZE};

/// A decoded payload value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Int(i64),
    /// Value in hundredths
    ShortReal(u16),
    Float {
        negative: bool,
        magnitude: u32,
        exponent: u8,
    },
    String(String),
}

fn read_sign(byte: u8) -> Result<bool, DecodeError> {
    match byte {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(DecodeError::InvalidSign(other)),
    }
}

impl Payload {
    /// SHORT_REAL from a decimal value, rounded to the nearest hundredth
    pub fn short_real(value: f64) -> Result<Self, EncodeError> {
        let hundredths = (value * 100.0).round();
        if !(0.0..=u16::MAX as f64).contains(&hundredths) {
            return Err(EncodeError::ValueOutOfRange);
        }
        Ok(Payload::ShortReal(hundredths as u16))
    }

    pub fn data_type(&self) -> DataType {
        match self {
            Payload::Int(_) => DataType::Int,
            Payload::ShortReal(_) => DataType::ShortReal,
            Payload::Float { .. } => DataType::Float,
            Payload::String(_) => DataType::String,
        }
    }

    /// Numeric value, or None for STRING
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Payload::Int(v) => Some(*v as f64),
            Payload::ShortReal(raw) => Some(*raw as f64 / 100.0),
            Payload::Float {
                negative,
                magnitude,
                exponent,
            } => {
                let value = *magnitude as f64 / 10f64.powi(*exponent as i32);
                Some(if *negative { -value } else { value })
            }
            Payload::String(_) => None,
        }
    }

    pub fn encode(&self, buf: &mut BytesMut) -> Result<(), EncodeError> {
        match self {
            Payload::Int(v) => {
                let magnitude =
                    u32::try_from(v.unsigned_abs()).map_err(|_| EncodeError::ValueOutOfRange)?;
                buf.put_u8(u8::from(*v < 0));
                buf.put_u32(magnitude);
            }
            Payload::ShortReal(raw) => buf.put_u16(*raw),
            Payload::Float {
                negative,
                magnitude,
                exponent,
            } => {
                buf.put_u8(u8::from(*negative));
                buf.put_u32(*magnitude);
                buf.put_u8(*exponent);
            }
            Payload::String(s) => {
                if s.len() > MAX_PAYLOAD_SIZE {
                    return Err(EncodeError::PayloadTooLarge);
                }
                buf.put_slice(s.as_bytes());
            }
        }
        Ok(())
    }

    pub fn decode(data_type: DataType, buf: &[u8]) -> Result<Self, DecodeError> {
        let expected = data_type.min_payload_len();
        if buf.len() < expected {
            return Err(DecodeError::PayloadTooShort {
                expected,
                actual: buf.len(),
            });
        }

        match data_type {
            DataType::Int => {
                let negative = read_sign(buf[0])?;
                let magnitude = read_u32(&buf[1..])? as i64;
                Ok(Payload::Int(if negative { -magnitude } else { magnitude }))
            }
            DataType::ShortReal => Ok(Payload::ShortReal(read_u16(buf)?)),
            DataType::Float => Ok(Payload::Float {
                negative: read_sign(buf[0])?,
                magnitude: read_u32(&buf[1..])?,
                exponent: buf[5],
            }),
            DataType::String => {
                let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
                let s = std::str::from_utf8(&buf[..end]).map_err(|_| DecodeError::InvalidUtf8)?;
                Ok(Payload::String(s.to_string()))
            }
        }
    }
}

impl fmt::Display for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Payload::Int(v) => write!(f, "{}", v),
            Payload::ShortReal(_) => write!(f, "{:.2}", self.as_f64().unwrap_or_default()),
            Payload::Float { .. } => write!(f, "{:.4}", self.as_f64().unwrap_or_default()),
            Payload::String(s) => f.write_str(s),
        }
    }
}
