//! Publish fan-out
//!
//! Turns one inbound datagram into at most one data packet per connected
//! subscriber. The packet is encoded once and shared: every queue gets a
//! cheap handle to the same immutable buffer.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use tracing::{trace, warn};

use super::writer::SendError;
use crate::codec::encode_data_packet;
use crate::metrics::Metrics;
use crate::protocol::{EncodeError, InboundMessage};
use crate::registry::ConnectionRegistry;

/// Outcome of one dispatch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Connected clients whose patterns matched
    pub matched: usize,
    /// Packets queued successfully
    pub delivered: usize,
    /// Packets dropped because a queue was full or closed
    pub dropped: usize,
}

/// Routes inbound messages to subscribers
#[derive(Default)]
pub struct PublishDispatcher {
    metrics: Option<Arc<Metrics>>,
}

impl PublishDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_metrics(&mut self, metrics: Arc<Metrics>) {
        self.metrics = Some(metrics);
    }

    /// Deliver `message` to every connected client with a matching pattern.
    ///
    /// A client with several matching patterns still receives one copy.
    /// Failure to queue for one client never affects the others.
    pub fn dispatch(
        &self,
        registry: &ConnectionRegistry,
        message: &InboundMessage,
        origin: SocketAddr,
    ) -> Result<DispatchReport, EncodeError> {
        let start = Instant::now();
        let mut report = DispatchReport::default();
        let mut packet: Option<Bytes> = None;

        for record in registry.active_records() {
            if !record.matches(&message.topic) {
                continue;
            }
            let Some(connection) = record.connection() else {
                continue;
            };
            report.matched += 1;

            let bytes = match &packet {
                Some(bytes) => bytes.clone(),
                None => {
                    let encoded = encode_data_packet(origin, message)?;
                    packet = Some(encoded.clone());
                    encoded
                }
            };
            let len = bytes.len();

            match connection.send(bytes) {
                Ok(()) => {
                    report.delivered += 1;
                    trace!("Queued {} bytes for client {}", len, record.identity());
                    if let Some(ref m) = self.metrics {
                        m.packet_delivered(len);
                    }
                }
                Err(e) => {
                    report.dropped += 1;
                    warn!("Error sending message to client {}: {}", record.identity(), e);
                    if let Some(ref m) = self.metrics {
                        m.packet_dropped(match e {
                            SendError::QueueFull => "queue_full",
                            SendError::Closed => "closed",
                        });
                    }
                }
            }
        }

        if let Some(ref m) = self.metrics {
            m.dispatch_latency.observe(start.elapsed().as_secs_f64());
        }

        Ok(report)
    }
}
