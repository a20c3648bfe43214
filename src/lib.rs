//! RelayMQ - topic broker between UDP publishers and TCP subscribers
//!
//! Publishers send datagrams carrying a topic and a typed payload. The
//! broker matches the topic against the wildcard patterns of every
//! connected subscriber and forwards a framed copy over each matching TCP
//! connection. Subscribers are known by identity, so a client that
//! reconnects keeps its patterns.

pub mod broker;
pub mod client;
pub mod codec;
pub mod config;
pub mod metrics;
pub mod protocol;
pub mod registry;
pub mod topic;

pub use broker::{Broker, BrokerConfig, ShutdownHandle};
pub use client::{Publisher, Subscriber};
pub use config::Config;
pub use metrics::{Metrics, MetricsServer};
pub use protocol::{DataType, Frame};
pub use registry::ConnectionRegistry;
