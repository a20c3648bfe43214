//! Prometheus metrics for RelayMQ
//!
//! Exposes broker counters at the /metrics endpoint when enabled.

use prometheus::{Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry};

mod server;

pub use server::MetricsServer;

/// All RelayMQ metrics in one place
#[derive(Clone)]
pub struct Metrics {
    pub registry: Registry,

    // Connection metrics
    pub connections_total: IntCounter,
    pub connections_current: IntGauge,
    pub connections_rejected_total: IntCounterVec,
    pub clients_known: IntGauge,

    // Datagram metrics
    pub datagrams_received_total: IntCounter,
    pub datagrams_malformed_total: IntCounter,

    // Delivery metrics
    pub packets_delivered_total: IntCounter,
    pub packets_dropped_total: IntCounterVec,
    pub bytes_delivered_total: IntCounter,

    // Subscription metrics
    pub subscriptions_current: IntGauge,

    // Performance metrics
    pub dispatch_latency: Histogram,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        // Connection metrics
        let connections_total = IntCounter::with_opts(Opts::new(
            "relaymq_connections_total",
            "Total subscriber connections accepted since startup",
        ))
        .unwrap();

        let connections_current = IntGauge::with_opts(Opts::new(
            "relaymq_connections_current",
            "Current number of connected subscribers",
        ))
        .unwrap();

        let connections_rejected_total = IntCounterVec::new(
            Opts::new(
                "relaymq_connections_rejected_total",
                "Total connections refused before registration",
            ),
            &["reason"],
        )
        .unwrap();

        let clients_known = IntGauge::with_opts(Opts::new(
            "relaymq_clients_known",
            "Identities seen since startup, connected or not",
        ))
        .unwrap();

        // Datagram metrics
        let datagrams_received_total = IntCounter::with_opts(Opts::new(
            "relaymq_datagrams_received_total",
            "Total UDP datagrams received",
        ))
        .unwrap();

        let datagrams_malformed_total = IntCounter::with_opts(Opts::new(
            "relaymq_datagrams_malformed_total",
            "Total UDP datagrams discarded as malformed",
        ))
        .unwrap();

        // Delivery metrics
        let packets_delivered_total = IntCounter::with_opts(Opts::new(
            "relaymq_packets_delivered_total",
            "Total data packets queued for subscribers",
        ))
        .unwrap();

        let packets_dropped_total = IntCounterVec::new(
            Opts::new(
                "relaymq_packets_dropped_total",
                "Total data packets dropped for a subscriber",
            ),
            &["reason"],
        )
        .unwrap();

        let bytes_delivered_total = IntCounter::with_opts(Opts::new(
            "relaymq_bytes_delivered_total",
            "Total bytes queued for subscribers",
        ))
        .unwrap();

        // Subscription metrics
        let subscriptions_current = IntGauge::with_opts(Opts::new(
            "relaymq_subscriptions_current",
            "Current number of registered patterns across all clients",
        ))
        .unwrap();

        // Performance metrics
        let dispatch_latency = Histogram::with_opts(
            HistogramOpts::new(
                "relaymq_dispatch_latency_seconds",
                "Time to match and queue one datagram",
            )
            .buckets(vec![
                0.00001, 0.00005, 0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1,
            ]),
        )
        .unwrap();

        // Register all metrics
        registry
            .register(Box::new(connections_total.clone()))
            .unwrap();
        registry
            .register(Box::new(connections_current.clone()))
            .unwrap();
        registry
            .register(Box::new(connections_rejected_total.clone()))
            .unwrap();
        registry.register(Box::new(clients_known.clone())).unwrap();
        registry
            .register(Box::new(datagrams_received_total.clone()))
            .unwrap();
        registry
            .register(Box::new(datagrams_malformed_total.clone()))
            .unwrap();
        registry
            .register(Box::new(packets_delivered_total.clone()))
            .unwrap();
        registry
            .register(Box::new(packets_dropped_total.clone()))
            .unwrap();
        registry
            .register(Box::new(bytes_delivered_total.clone()))
            .unwrap();
        registry
            .register(Box::new(subscriptions_current.clone()))
            .unwrap();
        registry
            .register(Box::new(dispatch_latency.clone()))
            .unwrap();

        Metrics {
            registry,
            connections_total,
            connections_current,
            connections_rejected_total,
            clients_known,
            datagrams_received_total,
            datagrams_malformed_total,
            packets_delivered_total,
            packets_dropped_total,
            bytes_delivered_total,
            subscriptions_current,
            dispatch_latency,
        }
    }

    // Helper methods for common operations

    pub fn client_connected(&self) {
        self.connections_total.inc();
        self.connections_current.inc();
    }

    pub fn client_disconnected(&self) {
        self.connections_current.dec();
    }

    pub fn connection_rejected(&self, reason: &str) {
        self.connections_rejected_total
            .with_label_values(&[reason])
            .inc();
    }

    pub fn datagram_received(&self) {
        self.datagrams_received_total.inc();
    }

    pub fn datagram_malformed(&self) {
        self.datagrams_malformed_total.inc();
    }

    pub fn packet_delivered(&self, bytes: usize) {
        self.packets_delivered_total.inc();
        self.bytes_delivered_total.inc_by(bytes as u64);
    }

    pub fn packet_dropped(&self, reason: &str) {
        self.packets_dropped_total.with_label_values(&[reason]).inc();
    }

    pub fn update_registry_stats(&self, known_clients: usize, subscriptions: usize) {
        self.clients_known.set(known_clients as i64);
        self.subscriptions_current.set(subscriptions as i64);
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
