//! Client helpers speaking the broker's wire protocol.
//!
//! `Subscriber` holds the TCP side: identity handshake, control messages
//! and received frames. `Publisher` sends datagrams over UDP.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, ToSocketAddrs, UdpSocket};
use tracing::debug;

use crate::codec::{decode_header, encode_control, encode_datagram, encode_identity, Payload};
use crate::protocol::{
    ControlMessage, DecodeError, EncodeError, Frame, HEADER_SIZE, IDENTITY_SIZE,
    MAX_DATAGRAM_SIZE,
};

/// Client errors
#[derive(Debug)]
pub enum ClientError {
    Io(std::io::Error),
    Decode(DecodeError),
    Encode(EncodeError),
    /// The broker closed the connection without a close signal
    Closed,
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientError::Io(e) => write!(f, "IO error: {}", e),
            ClientError::Decode(e) => write!(f, "Decode error: {}", e),
            ClientError::Encode(e) => write!(f, "Encode error: {}", e),
            ClientError::Closed => write!(f, "Connection closed by broker"),
        }
    }
}

impl std::error::Error for ClientError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ClientError::Io(e) => Some(e),
            ClientError::Decode(e) => Some(e),
            ClientError::Encode(e) => Some(e),
            ClientError::Closed => None,
        }
    }
}

impl From<std::io::Error> for ClientError {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::UnexpectedEof => ClientError::Closed,
            _ => ClientError::Io(e),
        }
    }
}

impl From<DecodeError> for ClientError {
    fn from(e: DecodeError) -> Self {
        ClientError::Decode(e)
    }
}

impl From<EncodeError> for ClientError {
    fn from(e: EncodeError) -> Self {
        ClientError::Encode(e)
    }
}

/// TCP subscriber connection
pub struct Subscriber {
    stream: TcpStream,
    identity: String,
}

impl Subscriber {
    /// Connect and send the identity handshake
    pub async fn connect<A: ToSocketAddrs>(addr: A, identity: &str) -> Result<Self, ClientError> {
        let mut handshake = BytesMut::with_capacity(IDENTITY_SIZE);
        encode_identity(identity, &mut handshake)?;

        let mut stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        stream.write_all(&handshake).await?;
        debug!("Subscriber {} connected to {}", identity, stream.peer_addr()?);

        Ok(Self {
            stream,
            identity: identity.to_string(),
        })
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub async fn subscribe(&mut self, pattern: &str) -> Result<(), ClientError> {
        self.send_control(&ControlMessage::subscribe(pattern)).await
    }

    pub async fn unsubscribe(&mut self, pattern: &str) -> Result<(), ClientError> {
        self.send_control(&ControlMessage::unsubscribe(pattern)).await
    }

    async fn send_control(&mut self, message: &ControlMessage) -> Result<(), ClientError> {
        let mut buf = BytesMut::new();
        encode_control(message, &mut buf)?;
        self.stream.write_all(&buf).await?;
        Ok(())
    }

    /// Wait for the next frame from the broker
    pub async fn recv(&mut self) -> Result<Frame, ClientError> {
        let mut raw = [0u8; HEADER_SIZE];
        self.stream.read_exact(&mut raw).await?;

        let header = decode_header(&raw)?;
        if header.is_close_signal() {
            return Ok(Frame::Close);
        }

        let mut payload = vec![0u8; header.payload_len()];
        self.stream.read_exact(&mut payload).await?;
        Ok(Frame::Data {
            header,
            payload: Bytes::from(payload),
        })
    }

    /// Close the connection
    pub async fn close(mut self) -> Result<(), ClientError> {
        self.stream.shutdown().await?;
        Ok(())
    }
}

/// UDP publisher
pub struct Publisher {
    socket: UdpSocket,
    target: SocketAddr,
}

impl Publisher {
    /// Bind an ephemeral local port for sending to `target`
    pub async fn bind(target: SocketAddr) -> Result<Self, ClientError> {
        let local = match target.ip() {
            IpAddr::V4(ip) if ip.is_loopback() => SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0),
            IpAddr::V4(_) => SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0),
            IpAddr::V6(_) => SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), 0),
        };
        let socket = UdpSocket::bind(local).await?;
        Ok(Self { socket, target })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ClientError> {
        Ok(self.socket.local_addr()?)
    }

    /// Publish a typed value on `topic`
    pub async fn publish(&self, topic: &str, payload: &Payload) -> Result<(), ClientError> {
        let mut body = BytesMut::new();
        payload.encode(&mut body)?;

        let mut datagram = BytesMut::with_capacity(MAX_DATAGRAM_SIZE);
        encode_datagram(topic, payload.data_type(), &body, &mut datagram)?;
        self.publish_raw(&datagram).await
    }

    /// Send bytes as-is, valid or not
    pub async fn publish_raw(&self, datagram: &[u8]) -> Result<(), ClientError> {
        self.socket.send_to(datagram, self.target).await?;
        Ok(())
    }
}
