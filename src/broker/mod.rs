//! Broker Core
//!
//! Binds the UDP and TCP sockets on one port and runs the event loop that
//! accepts subscribers, applies their control messages and fans published
//! datagrams out to them. Shutdown drains: every client is sent the close
//! signal and the broker stops once all of them have disconnected.

mod connection;
mod dispatcher;
mod event_loop;
mod writer;

pub use connection::ConnectionError;
pub use dispatcher::{DispatchReport, PublishDispatcher};
pub use writer::{ClientWriter, SendError};

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use socket2::{Domain, Protocol, Socket, Type};
use tokio::io::{AsyncBufRead, BufReader};
use tokio::net::{TcpListener, UdpSocket};
use tokio::sync::mpsc;
use tracing::info;

use crate::metrics::Metrics;
use crate::protocol::ProtocolError;
use event_loop::EventLoop;

/// Pending connections allowed on the TCP listener
const LISTEN_BACKLOG: i32 = 128;

/// Broker configuration
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// Address shared by the UDP and TCP sockets. Port 0 picks a free port.
    pub bind_addr: SocketAddr,
    /// Packets that may wait in one client's outbound queue
    pub outbound_queue: usize,
    /// Limit for the identity handshake and for rejecting duplicates
    pub handshake_timeout: Duration,
    /// Give up waiting for clients to disconnect after this long
    pub drain_timeout: Option<Duration>,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0),
            outbound_queue: 256,
            handshake_timeout: Duration::from_secs(10),
            drain_timeout: None,
        }
    }
}

/// Broker errors
#[derive(Debug)]
pub enum BrokerError {
    Io(std::io::Error),
    Protocol(ProtocolError),
}

impl fmt::Display for BrokerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BrokerError::Io(e) => write!(f, "IO error: {}", e),
            BrokerError::Protocol(e) => write!(f, "Protocol error: {}", e),
        }
    }
}

impl std::error::Error for BrokerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BrokerError::Io(e) => Some(e),
            BrokerError::Protocol(e) => Some(e),
        }
    }
}

impl From<std::io::Error> for BrokerError {
    fn from(e: std::io::Error) -> Self {
        BrokerError::Io(e)
    }
}

impl From<ProtocolError> for BrokerError {
    fn from(e: ProtocolError) -> Self {
        BrokerError::Protocol(e)
    }
}

/// Commands accepted on the control input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    /// Start draining
    Exit,
}

impl ControlCommand {
    /// Parse one line of control input. Unknown lines yield None.
    pub fn parse(line: &str) -> Option<Self> {
        match line.trim() {
            "exit" => Some(ControlCommand::Exit),
            _ => None,
        }
    }
}

/// Cloneable trigger for a graceful shutdown
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    tx: mpsc::Sender<()>,
}

impl ShutdownHandle {
    /// Start draining. Has no effect once the broker is already draining
    /// or has stopped.
    pub fn shutdown(&self) {
        let _ = self.tx.try_send(());
    }
}

/// A broker with its sockets bound, ready to run
pub struct Broker {
    config: BrokerConfig,
    listener: TcpListener,
    udp: UdpSocket,
    metrics: Option<Arc<Metrics>>,
    shutdown_tx: mpsc::Sender<()>,
    shutdown_rx: mpsc::Receiver<()>,
}

impl Broker {
    /// Bind the TCP listener, then the UDP socket on the same port.
    /// Failure here is fatal for the broker.
    pub async fn bind(config: BrokerConfig) -> Result<Self, BrokerError> {
        let listener = tcp_listener(config.bind_addr)?;
        let local = listener.local_addr()?;
        let udp = UdpSocket::bind(local).await?;

        info!("Listening on {} (TCP subscribers, UDP publishers)", local);

        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        Ok(Self {
            config,
            listener,
            udp,
            metrics: None,
            shutdown_tx,
            shutdown_rx,
        })
    }

    /// Attach metrics collection
    pub fn set_metrics(&mut self, metrics: Arc<Metrics>) {
        self.metrics = Some(metrics);
    }

    /// Address both sockets are bound to
    pub fn local_addr(&self) -> Result<SocketAddr, BrokerError> {
        Ok(self.listener.local_addr()?)
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            tx: self.shutdown_tx.clone(),
        }
    }

    /// Run with commands read from standard input
    pub async fn run(self) -> Result<(), BrokerError> {
        self.run_with_control(BufReader::new(tokio::io::stdin())).await
    }

    /// Run with commands read line by line from `control`
    pub async fn run_with_control<R>(self, control: R) -> Result<(), BrokerError>
    where
        R: AsyncBufRead + Unpin,
    {
        let Broker {
            config,
            listener,
            udp,
            metrics,
            shutdown_tx,
            shutdown_rx,
        } = self;
        drop(shutdown_tx);

        EventLoop::new(config, listener, udp, metrics, shutdown_rx)
            .run(control)
            .await
    }
}

fn tcp_listener(addr: SocketAddr) -> std::io::Result<TcpListener> {
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
    socket.set_reuse_address(true)?;
    socket.bind(&addr.into())?;
    socket.listen(LISTEN_BACKLOG)?;
    socket.set_nonblocking(true)?;
    TcpListener::from_std(socket.into())
}
