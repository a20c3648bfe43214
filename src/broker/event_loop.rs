//! The broker's single scheduler task.
//!
//! `EventLoop` exclusively owns the registry and both listening sockets.
//! Per-connection tasks never touch shared state; they report back over
//! one channel and the loop applies every change in order.

use std::net::SocketAddr;
use std::sync::Arc;

use ahash::AHashMap;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::sync::{broadcast, mpsc};
use tokio::task::AbortHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, trace, warn};

use super::connection::{self, ConnectionEvent};
use super::dispatcher::PublishDispatcher;
use super::writer::{run_writer, ClientWriter};
use super::{BrokerConfig, BrokerError, ControlCommand};
use crate::codec::decode_inbound;
use crate::metrics::Metrics;
use crate::protocol::{Command, ControlMessage, DecodeError, MAX_DATAGRAM_SIZE};
use crate::registry::{ConnectOutcome, ConnectionId, ConnectionRegistry, ControlOutcome};

/// Capacity of the channel carrying connection events to the loop
const EVENT_CHANNEL_CAPACITY: usize = 1024;

pub(crate) struct EventLoop {
    config: BrokerConfig,
    listener: TcpListener,
    udp: UdpSocket,
    registry: ConnectionRegistry,
    dispatcher: PublishDispatcher,
    metrics: Option<Arc<Metrics>>,
    events_tx: mpsc::Sender<ConnectionEvent>,
    events_rx: mpsc::Receiver<ConnectionEvent>,
    /// Programmatic shutdown requests
    shutdown_rx: mpsc::Receiver<()>,
    /// Fired once when draining starts; every writer task listens
    close_tx: broadcast::Sender<()>,
    /// Reader tasks of registered connections
    readers: AHashMap<ConnectionId, AbortHandle>,
    next_conn_id: u64,
    draining: bool,
    drain_deadline: Option<Instant>,
}

impl EventLoop {
    pub(crate) fn new(
        config: BrokerConfig,
        listener: TcpListener,
        udp: UdpSocket,
        metrics: Option<Arc<Metrics>>,
        shutdown_rx: mpsc::Receiver<()>,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let (close_tx, _) = broadcast::channel(1);
        let mut dispatcher = PublishDispatcher::new();
        if let Some(ref m) = metrics {
            dispatcher.set_metrics(m.clone());
        }

        Self {
            config,
            listener,
            udp,
            registry: ConnectionRegistry::new(),
            dispatcher,
            metrics,
            events_tx,
            events_rx,
            shutdown_rx,
            close_tx,
            readers: AHashMap::new(),
            next_conn_id: 0,
            draining: false,
            drain_deadline: None,
        }
    }

    /// Run until draining completes
    pub(crate) async fn run<R>(mut self, control: R) -> Result<(), BrokerError>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut lines = control.lines();
        let mut control_open = true;
        let mut shutdown_open = true;
        // One spare byte so oversized datagrams are detected, not truncated
        let mut datagram = vec![0u8; MAX_DATAGRAM_SIZE + 1];

        loop {
            if self.draining && self.registry.connected_count() == 0 {
                info!("All clients disconnected, broker stopped");
                return Ok(());
            }

            let drain_deadline = self.drain_deadline;

            tokio::select! {
                line = lines.next_line(), if control_open => match line {
                    Ok(Some(line)) => self.handle_control_line(&line),
                    Ok(None) => {
                        debug!("Control input closed");
                        control_open = false;
                    }
                    Err(e) => {
                        warn!("Error reading control input: {}", e);
                        control_open = false;
                    }
                },
                request = self.shutdown_rx.recv(), if shutdown_open => match request {
                    Some(()) => self.begin_draining(),
                    None => shutdown_open = false,
                },
                result = self.udp.recv_from(&mut datagram), if !self.draining => match result {
                    Ok((len, origin)) => self.handle_datagram(&datagram[..len], origin),
                    Err(e) => error!("Error receiving datagram: {}", e),
                },
                result = self.listener.accept(), if !self.draining => match result {
                    Ok((stream, addr)) => self.handle_accept(stream, addr),
                    Err(e) => error!("Failed to accept TCP connection: {}", e),
                },
                Some(event) = self.events_rx.recv() => self.handle_event(event),
                _ = sleep_until(drain_deadline), if drain_deadline.is_some() => {
                    let remaining: Vec<&str> = self
                        .registry
                        .active_records()
                        .map(|r| &**r.identity())
                        .collect();
                    warn!(
                        "Drain timeout expired with {} clients still connected: {}",
                        remaining.len(),
                        remaining.join(", ")
                    );
                    for (_, reader) in self.readers.drain() {
                        reader.abort();
                    }
                    return Ok(());
                }
            }
        }
    }

    fn handle_control_line(&mut self, line: &str) {
        match ControlCommand::parse(line) {
            Some(ControlCommand::Exit) => self.begin_draining(),
            None => debug!("Ignoring control input: {:?}", line.trim()),
        }
    }

    fn begin_draining(&mut self) {
        if self.draining {
            debug!("Shutdown already in progress");
            return;
        }
        self.draining = true;
        self.drain_deadline = self.config.drain_timeout.map(|d| Instant::now() + d);

        info!(
            "Shutting down, sending close signal to {} connected clients",
            self.registry.connected_count()
        );
        // Writers subscribe on spawn, so this reaches every live connection
        let _ = self.close_tx.send(());
    }

    fn handle_datagram(&mut self, datagram: &[u8], origin: SocketAddr) {
        if let Some(ref m) = self.metrics {
            m.datagram_received();
        }

        let message = match decode_inbound(datagram) {
            Ok(message) => message,
            Err(e) => {
                warn!("Malformed datagram from {}: {}", origin, e);
                if let Some(ref m) = self.metrics {
                    m.datagram_malformed();
                }
                return;
            }
        };

        trace!(
            "Datagram from {} on {} ({}, {} bytes)",
            origin,
            message.topic,
            message.data_type,
            message.payload.len()
        );

        match self.dispatcher.dispatch(&self.registry, &message, origin) {
            Ok(report) => debug!(
                "Delivered {} to {}/{} matching clients",
                message.topic, report.delivered, report.matched
            ),
            Err(e) => error!("Cannot frame datagram from {}: {}", origin, e),
        }
    }

    fn handle_accept(&mut self, stream: TcpStream, addr: SocketAddr) {
        debug!("New TCP connection from {}", addr);
        if let Err(e) = stream.set_nodelay(true) {
            warn!("Failed to set TCP_NODELAY for {}: {}", addr, e);
        }

        tokio::spawn(connection::handshake(
            stream,
            addr,
            self.config.handshake_timeout,
            self.events_tx.clone(),
            self.metrics.clone(),
        ));
    }

    fn handle_event(&mut self, event: ConnectionEvent) {
        match event {
            ConnectionEvent::Handshake {
                stream,
                addr,
                identity,
            } => self.handle_handshake(stream, addr, identity),
            ConnectionEvent::Control { conn_id, message } => {
                self.handle_control_message(conn_id, message)
            }
            ConnectionEvent::Malformed { conn_id, error } => self.handle_malformed(conn_id, error),
            ConnectionEvent::Closed { conn_id, error } => self.handle_closed(conn_id, error),
        }
    }

    fn handle_handshake(&mut self, stream: TcpStream, addr: SocketAddr, identity: String) {
        if self.draining {
            debug!("Dropping connection from {} ({}) during shutdown", identity, addr);
            if let Some(ref m) = self.metrics {
                m.connection_rejected("draining");
            }
            return;
        }

        let conn_id = self.next_connection_id();
        let (writer, outbound) = ClientWriter::new(conn_id, addr, self.config.outbound_queue);

        match self.registry.on_connect_attempt(&identity, writer) {
            ConnectOutcome::Accepted | ConnectOutcome::Reattached => {
                info!("New client {} connected from {}.", identity, addr);

                let identity = self
                    .registry
                    .identity_of(conn_id)
                    .cloned()
                    .unwrap_or_else(|| identity.into());
                let (read_half, write_half) = stream.into_split();
                let reader =
                    tokio::spawn(connection::run_reader(read_half, conn_id, self.events_tx.clone()));
                self.readers.insert(conn_id, reader.abort_handle());
                tokio::spawn(run_writer(
                    write_half,
                    outbound,
                    identity,
                    conn_id,
                    self.events_tx.clone(),
                    self.close_tx.subscribe(),
                ));

                if let Some(ref m) = self.metrics {
                    m.client_connected();
                }
                self.update_registry_stats();
            }
            ConnectOutcome::Rejected => {
                info!("Client {} already connected.", identity);
                if let Some(ref m) = self.metrics {
                    m.connection_rejected("duplicate_identity");
                }
                tokio::spawn(connection::reject_duplicate(
                    stream,
                    identity,
                    self.config.handshake_timeout,
                ));
            }
        }
    }

    fn handle_control_message(&mut self, conn_id: ConnectionId, message: ControlMessage) {
        let Some(identity) = self.registry.identity_of(conn_id).cloned() else {
            trace!("Ignoring control message from stale connection {}", conn_id);
            return;
        };

        match self
            .registry
            .on_control_message(&identity, message.command, &message.topic)
        {
            Ok(outcome) => {
                match outcome {
                    ControlOutcome::Subscribed => {
                        debug!("Client {} subscribed to {}", identity, message.topic)
                    }
                    ControlOutcome::Unsubscribed => {
                        debug!("Client {} unsubscribed from {}", identity, message.topic)
                    }
                    ControlOutcome::AlreadySubscribed | ControlOutcome::NotSubscribed => trace!(
                        "Client {} {} {} changed nothing",
                        identity,
                        match message.command {
                            Command::Subscribe => "subscribe",
                            Command::Unsubscribe => "unsubscribe",
                        },
                        message.topic
                    ),
                }
                self.update_registry_stats();
            }
            Err(e) => warn!("Rejected control message from {}: {}", identity, e),
        }
    }

    fn handle_malformed(&mut self, conn_id: ConnectionId, error: DecodeError) {
        match self.registry.identity_of(conn_id) {
            Some(identity) => warn!("Invalid control message from {}: {}", identity, error),
            None => trace!("Invalid control message from stale connection {}", conn_id),
        }
    }

    fn handle_closed(&mut self, conn_id: ConnectionId, error: Option<std::io::Error>) {
        // A failed writer leaves the reader blocked on a half-open socket
        if let Some(reader) = self.readers.remove(&conn_id) {
            reader.abort();
        }

        let Some(identity) = self.registry.disconnect_connection(conn_id) else {
            trace!("Close event for stale connection {}", conn_id);
            return;
        };

        if let Some(e) = error {
            warn!("Connection to client {} failed: {}", identity, e);
        }
        info!("Client {} disconnected.", identity);

        if let Some(ref m) = self.metrics {
            m.client_disconnected();
        }
        if self.draining {
            debug!(
                "{} clients left to disconnect",
                self.registry.connected_count()
            );
        }
    }

    fn next_connection_id(&mut self) -> ConnectionId {
        self.next_conn_id += 1;
        ConnectionId::new(self.next_conn_id)
    }

    fn update_registry_stats(&self) {
        if let Some(ref m) = self.metrics {
            m.update_registry_stats(self.registry.len(), self.registry.subscription_count());
        }
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
