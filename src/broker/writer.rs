//! Per-client outbound queue.
//!
//! The event loop never writes to a socket. Each connection gets a bounded
//! queue of pre-encoded packets and a writer task that drains it, so a slow
//! subscriber only ever delays itself.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, warn};

use super::connection::ConnectionEvent;
use crate::codec::close_signal;
use crate::registry::ConnectionId;

/// Error when queueing a packet for a client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendError {
    /// Writer task has exited
    Closed,
    /// Outbound queue is at capacity
    QueueFull,
}

impl fmt::Display for SendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "connection closed"),
            Self::QueueFull => write!(f, "outbound queue full"),
        }
    }
}

impl std::error::Error for SendError {}

/// Handle used by the event loop to queue packets for one connection.
///
/// Dropping the last handle closes the queue; the writer task then flushes
/// what is left and exits, which shuts down the write half of the socket.
#[derive(Debug, Clone)]
pub struct ClientWriter {
    conn_id: ConnectionId,
    addr: SocketAddr,
    tx: mpsc::Sender<Bytes>,
}

impl ClientWriter {
    /// Create a handle and the receiving end for its writer task
    pub fn new(conn_id: ConnectionId, addr: SocketAddr, capacity: usize) -> (Self, mpsc::Receiver<Bytes>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { conn_id, addr, tx }, rx)
    }

    pub fn conn_id(&self) -> ConnectionId {
        self.conn_id
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Queue a packet without waiting
    pub fn send(&self, packet: Bytes) -> Result<(), SendError> {
        self.tx.try_send(packet).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SendError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => SendError::Closed,
        })
    }
}

/// Drain the outbound queue into the socket.
///
/// When `shutdown` fires, everything already queued is written, followed by
/// the close signal. The task then keeps the queue open (discarding late
/// packets) until the event loop drops the handle, so the socket stays up
/// until the client has disconnected.
///
/// A failed write ends the task and reports the connection as closed, so
/// the event loop unregisters it even if the read half never errors.
pub(crate) async fn run_writer<W>(
    mut socket: W,
    mut rx: mpsc::Receiver<Bytes>,
    identity: Arc<str>,
    conn_id: ConnectionId,
    events: mpsc::Sender<ConnectionEvent>,
    mut shutdown: broadcast::Receiver<()>,
) where
    W: AsyncWrite + Unpin,
{
    loop {
        tokio::select! {
            biased;

            packet = rx.recv() => match packet {
                Some(packet) => {
                    if let Err(e) = socket.write_all(&packet).await {
                        warn!("Error sending message to client {}: {}", identity, e);
                        report_closed(&events, conn_id, e).await;
                        return;
                    }
                }
                None => break,
            },
            result = shutdown.recv() => {
                if let Err(broadcast::error::RecvError::Lagged(_)) = result {
                    continue;
                }
                if let Err(e) = send_close(&mut socket, &mut rx).await {
                    warn!("Error sending close signal to client {}: {}", identity, e);
                    report_closed(&events, conn_id, e).await;
                    return;
                }
                debug!("Close signal sent to client {}", identity);
                while rx.recv().await.is_some() {}
                break;
            }
        }
    }

    let _ = socket.shutdown().await;
}

async fn report_closed(events: &mpsc::Sender<ConnectionEvent>, conn_id: ConnectionId, error: std::io::Error) {
    let event = ConnectionEvent::Closed {
        conn_id,
        error: Some(error),
    };
    if events.send(event).await.is_err() {
        debug!("Broker stopped before connection {} was reported closed", conn_id);
    }
}

async fn send_close<W>(socket: &mut W, rx: &mut mpsc::Receiver<Bytes>) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Ok(packet) = rx.try_recv() {
        socket.write_all(&packet).await?;
    }
    socket.write_all(&close_signal()).await?;
    socket.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::HEADER_SIZE;
    use crate::registry::{ConnectOutcome, ConnectionRegistry};
    use tokio::io::AsyncReadExt;

    fn writer(capacity: usize) -> (ClientWriter, mpsc::Receiver<Bytes>) {
        ClientWriter::new(ConnectionId::new(1), "127.0.0.1:4000".parse().unwrap(), capacity)
    }

    #[test]
    fn test_send_reports_full_queue() {
        let (writer, _rx) = writer(2);
        assert!(writer.send(Bytes::from_static(b"a")).is_ok());
        assert!(writer.send(Bytes::from_static(b"b")).is_ok());
        assert_eq!(writer.send(Bytes::from_static(b"c")), Err(SendError::QueueFull));
    }

    #[test]
    fn test_send_reports_closed_queue() {
        let (writer, rx) = writer(2);
        drop(rx);
        assert!(writer.is_closed());
        assert_eq!(writer.send(Bytes::from_static(b"a")), Err(SendError::Closed));
    }

    #[tokio::test]
    async fn test_writer_forwards_in_order() {
        let (client, server) = tokio::io::duplex(1024);
        let (writer, rx) = writer(8);
        let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let (events_tx, _events_rx) = mpsc::channel(8);
        let task = tokio::spawn(run_writer(
            server,
            rx,
            "c1".into(),
            ConnectionId::new(1),
            events_tx,
            shutdown_rx,
        ));

        writer.send(Bytes::from_static(b"one")).unwrap();
        writer.send(Bytes::from_static(b"two")).unwrap();
        drop(writer);
        task.await.unwrap();

        let mut received = Vec::new();
        let mut client = client;
        client.read_to_end(&mut received).await.unwrap();
        assert_eq!(received, b"onetwo");
    }

    fn broken_pipe() -> std::io::Error {
        std::io::Error::new(std::io::ErrorKind::BrokenPipe, "peer went away")
    }

    #[tokio::test]
    async fn test_write_error_reports_connection_closed() {
        let socket = tokio_test::io::Builder::new()
            .write(b"one")
            .write_error(broken_pipe())
            .build();
        let (writer, rx) = writer(8);
        let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let (events_tx, mut events_rx) = mpsc::channel(8);

        writer.send(Bytes::from_static(b"one")).unwrap();
        writer.send(Bytes::from_static(b"two")).unwrap();
        let task = tokio::spawn(run_writer(
            socket,
            rx,
            "c1".into(),
            ConnectionId::new(1),
            events_tx,
            shutdown_rx,
        ));

        // Returns without waiting for the handle to drop
        task.await.unwrap();
        assert!(writer.is_closed());

        match events_rx.recv().await {
            Some(ConnectionEvent::Closed { conn_id, error }) => {
                assert_eq!(conn_id, ConnectionId::new(1));
                assert_eq!(error.map(|e| e.kind()), Some(std::io::ErrorKind::BrokenPipe));
            }
            other => panic!("expected closed event, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_failed_writer_frees_identity_for_reconnect() {
        let mut registry = ConnectionRegistry::new();
        let (first, rx) = writer(8);
        assert_eq!(registry.on_connect_attempt("c1", first.clone()), ConnectOutcome::Accepted);

        let socket = tokio_test::io::Builder::new().write_error(broken_pipe()).build();
        let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let (events_tx, mut events_rx) = mpsc::channel(8);
        let task = tokio::spawn(run_writer(
            socket,
            rx,
            "c1".into(),
            first.conn_id(),
            events_tx,
            shutdown_rx,
        ));
        first.send(Bytes::from_static(b"lost")).unwrap();
        task.await.unwrap();

        // The event loop applies the close it is told about
        let Some(ConnectionEvent::Closed { conn_id, .. }) = events_rx.recv().await else {
            panic!("expected closed event");
        };
        assert_eq!(registry.disconnect_connection(conn_id).as_deref(), Some("c1"));

        let (second, _rx) =
            ClientWriter::new(ConnectionId::new(2), "127.0.0.1:4001".parse().unwrap(), 8);
        assert_eq!(registry.on_connect_attempt("c1", second), ConnectOutcome::Reattached);
    }

    #[tokio::test]
    async fn test_close_signal_failure_reports_connection_closed() {
        let socket = tokio_test::io::Builder::new().write_error(broken_pipe()).build();
        let (_writer, rx) = writer(8);
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let (events_tx, mut events_rx) = mpsc::channel(8);
        let task = tokio::spawn(run_writer(
            socket,
            rx,
            "c1".into(),
            ConnectionId::new(1),
            events_tx,
            shutdown_rx,
        ));

        shutdown_tx.send(()).unwrap();
        task.await.unwrap();
        assert!(matches!(
            events_rx.recv().await,
            Some(ConnectionEvent::Closed { error: Some(_), .. })
        ));
    }

    #[tokio::test]
    async fn test_shutdown_flushes_then_sends_close_signal() {
        let (mut client, server) = tokio::io::duplex(1024);
        let (writer, rx) = writer(8);
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let (events_tx, _events_rx) = mpsc::channel(8);

        writer.send(Bytes::from_static(b"queued")).unwrap();
        let task = tokio::spawn(run_writer(
            server,
            rx,
            "c1".into(),
            ConnectionId::new(1),
            events_tx,
            shutdown_rx,
        ));
        shutdown_tx.send(()).unwrap();

        let mut buf = vec![0u8; 6 + HEADER_SIZE];
        client.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf[..6], b"queued");
        assert_eq!(&buf[6..], &close_signal()[..]);

        // Socket stays open until the handle goes away
        assert!(!task.is_finished());
        drop(writer);
        task.await.unwrap();
    }
}
