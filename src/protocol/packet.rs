//! Frame types

use std::net::SocketAddrV4;

use bytes::Bytes;

use super::{Command, DataType, HEADER_SIZE};

/// A message published over UDP, alive for one dispatch cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub topic: String,
    pub data_type: DataType,
    pub payload: Bytes,
}

/// Subscribe/unsubscribe request sent by a subscriber
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlMessage {
    pub command: Command,
    pub topic: String,
}

impl ControlMessage {
    pub fn subscribe(topic: impl Into<String>) -> Self {
        Self {
            command: Command::Subscribe,
            topic: topic.into(),
        }
    }

    pub fn unsubscribe(topic: impl Into<String>) -> Self {
        Self {
            command: Command::Unsubscribe,
            topic: topic.into(),
        }
    }
}

/// Fixed header preceding every packet sent to a subscriber
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataHeader {
    /// Address of the publisher that sent the datagram
    pub origin: SocketAddrV4,
    /// Header plus payload length
    pub total_length: u32,
    pub data_type: DataType,
    pub topic: String,
}

impl DataHeader {
    /// The header-only packet that tells a subscriber to disconnect
    pub fn close_signal() -> Self {
        Self {
            origin: SocketAddrV4::new(std::net::Ipv4Addr::UNSPECIFIED, 0),
            total_length: HEADER_SIZE as u32,
            data_type: DataType::Int,
            topic: String::new(),
        }
    }

    pub fn is_close_signal(&self) -> bool {
        self.total_length as usize == HEADER_SIZE
    }

    /// Number of payload bytes following this header
    pub fn payload_len(&self) -> usize {
        (self.total_length as usize).saturating_sub(HEADER_SIZE)
    }
}

/// A packet received by a subscriber
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Data { header: DataHeader, payload: Bytes },
    Close,
}
