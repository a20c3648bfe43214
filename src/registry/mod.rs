//! Connection Registry
//!
//! Owns one `ClientRecord` per client identity for the lifetime of the
//! broker. A record is created on the first connection and afterwards only
//! moves between `Connected` and `Disconnected`; its subscription set
//! survives disconnects so a reconnecting client resumes where it left off.
//!
//! Connections are looked up by `ConnectionId`, never by position, so the
//! registry stays consistent however connections come and go.

use std::fmt;
use std::sync::Arc;

use ahash::AHashMap;

use crate::broker::ClientWriter;
use crate::protocol::Command;
use crate::topic::{find_any_match, validate_pattern, TopicPattern};


/// Broker-assigned identifier of one accepted TCP connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Client state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    /// A live connection is attached
    Connected,
    /// No connection; subscriptions retained for a reconnect
    Disconnected,
}

/// Result of a connection attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectOutcome {
    /// First connection for this identity
    Accepted,
    /// Known identity came back; subscriptions restored
    Reattached,
    /// Identity already has a live connection
    Rejected,
}

/// Result of applying a control message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlOutcome {
    Subscribed,
    AlreadySubscribed,
    Unsubscribed,
    NotSubscribed,
}

/// Registry errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// No record exists for the identity
    UnknownIdentity(String),
    /// Pattern failed validation
    InvalidPattern(&'static str),
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownIdentity(id) => write!(f, "unknown client identity: {}", id),
            Self::InvalidPattern(msg) => write!(f, "invalid pattern: {}", msg),
        }
    }
}

impl std::error::Error for RegistryError {}

/// Per-identity state
#[derive(Debug)]
pub struct ClientRecord {
    identity: Arc<str>,
    /// Active connection, absent while disconnected
    connection: Option<ClientWriter>,
    /// Patterns keyed by their source string, compiled once on subscribe
    subscriptions: AHashMap<String, TopicPattern>,
}

impl ClientRecord {
    fn new(identity: Arc<str>, connection: ClientWriter) -> Self {
        Self {
            identity,
            connection: Some(connection),
            subscriptions: AHashMap::new(),
        }
    }

    pub fn identity(&self) -> &Arc<str> {
        &self.identity
    }

    pub fn state(&self) -> ClientState {
        if self.connection.is_some() {
            ClientState::Connected
        } else {
            ClientState::Disconnected
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    pub fn connection(&self) -> Option<&ClientWriter> {
        self.connection.as_ref()
    }

    /// Registered patterns, in no particular order
    pub fn subscriptions(&self) -> impl Iterator<Item = &str> {
        self.subscriptions.keys().map(String::as_str)
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn is_subscribed(&self, pattern: &str) -> bool {
        self.subscriptions.contains_key(pattern)
    }

    /// Returns true if any registered pattern matches the topic
    pub fn matches(&self, topic: &str) -> bool {
        find_any_match(self.subscriptions.values(), topic)
    }
}

/// Identity -> record mapping plus a connection index
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    clients: AHashMap<Arc<str>, ClientRecord>,
    by_connection: AHashMap<ConnectionId, Arc<str>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve a connection attempt for `identity`.
    ///
    /// On `Rejected` the writer is dropped and nothing is registered; the
    /// caller owns the close handshake with the new socket.
    pub fn on_connect_attempt(&mut self, identity: &str, connection: ClientWriter) -> ConnectOutcome {
        match self.clients.get_mut(identity) {
            Some(record) if record.is_connected() => ConnectOutcome::Rejected,
            Some(record) => {
                self.by_connection
                    .insert(connection.conn_id(), record.identity.clone());
                record.connection = Some(connection);
                ConnectOutcome::Reattached
            }
            None => {
                let identity: Arc<str> = identity.into();
                self.by_connection
                    .insert(connection.conn_id(), identity.clone());
                self.clients
                    .insert(identity.clone(), ClientRecord::new(identity, connection));
                ConnectOutcome::Accepted
            }
        }
    }

    /// Apply a subscribe/unsubscribe command to the identity's pattern set
    pub fn on_control_message(
        &mut self,
        identity: &str,
        command: Command,
        pattern: &str,
    ) -> Result<ControlOutcome, RegistryError> {
        let record = self
            .clients
            .get_mut(identity)
            .ok_or_else(|| RegistryError::UnknownIdentity(identity.to_string()))?;

        match command {
            Command::Subscribe => {
                validate_pattern(pattern).map_err(RegistryError::InvalidPattern)?;
                if record.subscriptions.contains_key(pattern) {
                    return Ok(ControlOutcome::AlreadySubscribed);
                }
                record
                    .subscriptions
                    .insert(pattern.to_string(), TopicPattern::compile(pattern));
                Ok(ControlOutcome::Subscribed)
            }
            Command::Unsubscribe => {
                if record.subscriptions.remove(pattern).is_some() {
                    Ok(ControlOutcome::Unsubscribed)
                } else {
                    Ok(ControlOutcome::NotSubscribed)
                }
            }
        }
    }

    /// Detach the identity's connection, keeping its subscriptions.
    /// Returns false if the identity was not connected.
    pub fn on_disconnect(&mut self, identity: &str) -> bool {
        let Some(record) = self.clients.get_mut(identity) else {
            return false;
        };
        match record.connection.take() {
            Some(connection) => {
                self.by_connection.remove(&connection.conn_id());
                true
            }
            None => false,
        }
    }

    /// Disconnect whichever identity owns `conn_id`.
    /// Stale ids (already detached) yield None.
    pub fn disconnect_connection(&mut self, conn_id: ConnectionId) -> Option<Arc<str>> {
        let identity = self.by_connection.get(&conn_id)?.clone();
        self.on_disconnect(&identity);
        Some(identity)
    }

    /// Identity currently attached to a connection
    pub fn identity_of(&self, conn_id: ConnectionId) -> Option<&Arc<str>> {
        self.by_connection.get(&conn_id)
    }

    pub fn get(&self, identity: &str) -> Option<&ClientRecord> {
        self.clients.get(identity)
    }

    /// Records with a live connection
    pub fn active_records(&self) -> impl Iterator<Item = &ClientRecord> {
        self.clients.values().filter(|r| r.is_connected())
    }

    pub fn connected_count(&self) -> usize {
        self.by_connection.len()
    }

    /// Number of identities ever seen
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// Total patterns across all records
    pub fn subscription_count(&self) -> usize {
        self.clients.values().map(|r| r.subscriptions.len()).sum()
    }
}
