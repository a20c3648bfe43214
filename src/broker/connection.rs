//! Subscriber connection tasks
//!
//! Socket I/O for subscribers runs outside the event loop. Each accepted
//! stream first goes through a handshake task that reads the identity; once
//! registered it is split into a reader task (control messages in) and a
//! writer task (see `writer`). Everything the tasks learn is reported back
//! to the event loop as a `ConnectionEvent`.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, trace, warn};

use crate::codec::{close_signal, decode_control, decode_identity};
use crate::metrics::Metrics;
use crate::protocol::{ControlMessage, DecodeError, CONTROL_MESSAGE_SIZE, IDENTITY_SIZE};
use crate::registry::ConnectionId;

/// Connection error types
#[derive(Debug)]
pub enum ConnectionError {
    Io(std::io::Error),
    Decode(DecodeError),
    Timeout,
}

impl std::fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionError::Io(e) => write!(f, "IO error: {}", e),
            ConnectionError::Decode(e) => write!(f, "Decode error: {}", e),
            ConnectionError::Timeout => write!(f, "Connection timeout"),
        }
    }
}

impl std::error::Error for ConnectionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConnectionError::Io(e) => Some(e),
            ConnectionError::Decode(e) => Some(e),
            ConnectionError::Timeout => None,
        }
    }
}

impl From<std::io::Error> for ConnectionError {
    fn from(e: std::io::Error) -> Self {
        ConnectionError::Io(e)
    }
}

impl From<DecodeError> for ConnectionError {
    fn from(e: DecodeError) -> Self {
        ConnectionError::Decode(e)
    }
}

/// Events reported to the event loop by connection tasks
#[derive(Debug)]
pub(crate) enum ConnectionEvent {
    /// Identity received on a freshly accepted stream
    Handshake {
        stream: TcpStream,
        addr: SocketAddr,
        identity: String,
    },
    /// A well-formed control message
    Control {
        conn_id: ConnectionId,
        message: ControlMessage,
    },
    /// A control message that failed to decode; the connection stays up
    Malformed {
        conn_id: ConnectionId,
        error: DecodeError,
    },
    /// Peer closed the stream or the read failed
    Closed {
        conn_id: ConnectionId,
        error: Option<std::io::Error>,
    },
}

/// Read the fixed-size identity frame, bounded by `limit`
pub(crate) async fn read_identity<R>(reader: &mut R, limit: Duration) -> Result<String, ConnectionError>
where
    R: AsyncRead + Unpin,
{
    let mut buf = [0u8; IDENTITY_SIZE];
    match timeout(limit, reader.read_exact(&mut buf)).await {
        Ok(Ok(_)) => Ok(decode_identity(&buf)?),
        Ok(Err(e)) => Err(e.into()),
        Err(_) => Err(ConnectionError::Timeout),
    }
}

/// Handshake task for one accepted stream
pub(crate) async fn handshake(
    mut stream: TcpStream,
    addr: SocketAddr,
    limit: Duration,
    events: mpsc::Sender<ConnectionEvent>,
    metrics: Option<Arc<Metrics>>,
) {
    match read_identity(&mut stream, limit).await {
        Ok(identity) => {
            let event = ConnectionEvent::Handshake {
                stream,
                addr,
                identity,
            };
            if events.send(event).await.is_err() {
                debug!("Broker stopped before handshake from {} completed", addr);
            }
        }
        Err(e) => {
            warn!("Handshake with {} failed: {}", addr, e);
            if let Some(m) = metrics {
                m.connection_rejected("handshake");
            }
        }
    }
}

/// Reader task: forward control messages until the stream ends
pub(crate) async fn run_reader<R>(mut reader: R, conn_id: ConnectionId, events: mpsc::Sender<ConnectionEvent>)
where
    R: AsyncRead + Unpin,
{
    let mut buf = [0u8; CONTROL_MESSAGE_SIZE];

    loop {
        let event = match reader.read_exact(&mut buf).await {
            Ok(_) => match decode_control(&buf) {
                Ok(message) => {
                    trace!("Connection {} sent {:?}", conn_id, message);
                    ConnectionEvent::Control { conn_id, message }
                }
                Err(error) => ConnectionEvent::Malformed { conn_id, error },
            },
            Err(e) => {
                // A partial frame followed by EOF counts as a clean close
                let error = match e.kind() {
                    std::io::ErrorKind::UnexpectedEof => None,
                    _ => Some(e),
                };
                let _ = events.send(ConnectionEvent::Closed { conn_id, error }).await;
                return;
            }
        };

        if events.send(event).await.is_err() {
            return;
        }
    }
}

/// Turn away a connection whose identity is already live.
///
/// Sends the close signal, then waits (bounded by `limit`) for the peer to
/// hang up before dropping the stream.
pub(crate) async fn reject_duplicate<S>(mut stream: S, identity: String, limit: Duration)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    if let Err(e) = stream.write_all(&close_signal()).await {
        debug!("Could not send close signal to duplicate client {}: {}", identity, e);
        return;
    }

    let mut sink = [0u8; 64];
    let drained = timeout(limit, async {
        loop {
            match stream.read(&mut sink).await {
                Ok(0) | Err(_) => break,
                Ok(_) => continue,
            }
        }
    })
    .await;

    if drained.is_err() {
        debug!("Duplicate client {} did not close in time", identity);
    }
}
