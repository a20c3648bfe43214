//! Configuration Module
//!
//! Provides TOML-based configuration for RelayMQ with support for:
//! - Log level
//! - Bind address (the port is given on the command line)
//! - Per-client queue and timeout limits
//! - Prometheus endpoint
//! - Environment variable overrides (RELAYMQ__* prefix)

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use config::{Environment, File, FileFormat};
use regex::Regex;
use serde::Deserialize;

use crate::broker::BrokerConfig;

/// Substitute environment variables in a string.
/// Supports `${VAR}` and `${VAR:-default}` syntax.
fn substitute_env_vars(content: &str) -> String {
    let re = match Regex::new(r"\$\{([^}:]+)(?::-([^}]*))?\}") {
        Ok(re) => re,
        Err(_) => return content.to_string(),
    };
    re.replace_all(content, |caps: &regex::Captures| {
        let var_name = &caps[1];
        let default = caps.get(2).map(|m| m.as_str()).unwrap_or("");
        std::env::var(var_name).unwrap_or_else(|_| default.to_string())
    })
    .to_string()
}


const LOG_LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];

/// Configuration error types
#[derive(Debug)]
pub enum ConfigError {
    /// IO error reading config file
    Io(std::io::Error),
    /// TOML parsing error
    Parse(toml::de::Error),
    /// Config crate error
    Config(config::ConfigError),
    /// Validation error
    Validation(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Parse(e) => write!(f, "Parse error: {}", e),
            ConfigError::Config(e) => write!(f, "Config error: {}", e),
            ConfigError::Validation(msg) => write!(f, "Validation error: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        ConfigError::Parse(e)
    }
}

impl From<config::ConfigError> for ConfigError {
    fn from(e: config::ConfigError) -> Self {
        ConfigError::Config(e)
    }
}

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Logging configuration
    pub log: LogConfig,
    /// Server configuration
    pub server: ServerConfig,
    /// Queue and timeout limits
    pub limits: LimitsConfig,
    /// Metrics configuration
    pub metrics: MetricsConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level: error, warn, info, debug, trace
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Server configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// IP address for both the UDP and TCP sockets
    pub bind: IpAddr,
}

fn default_bind() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

/// Queue and timeout limits
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Packets that may wait for one slow subscriber before deliveries
    /// to it are dropped.
    pub outbound_queue: usize,

    /// Time allowed for a new connection to send its identity, and for a
    /// rejected duplicate to hang up (e.g. "10s")
    #[serde(with = "humantime_serde")]
    pub handshake_timeout: Duration,

    /// Stop waiting for clients to disconnect during shutdown after this
    /// long. Unset waits indefinitely.
    #[serde(with = "humantime_serde")]
    pub drain_timeout: Option<Duration>,
}

fn default_outbound_queue() -> usize {
    256
}

fn default_handshake_timeout() -> Duration {
    Duration::from_secs(10)
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            outbound_queue: default_outbound_queue(),
            handshake_timeout: default_handshake_timeout(),
            drain_timeout: None,
        }
    }
}

/// Prometheus endpoint configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Serve /metrics and /health over HTTP
    pub enabled: bool,
    /// HTTP bind address
    pub bind: SocketAddr,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bind: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 9090),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file with environment variable overrides.
    ///
    /// Supports two forms of environment variable usage:
    /// 1. In-file substitution: `${VAR}` or `${VAR:-default}` syntax in the TOML file
    /// 2. Override via env vars: `RELAYMQ__` prefix with double underscores for nesting:
    ///    - `RELAYMQ__SERVER__BIND=127.0.0.1` overrides `server.bind`
    ///    - `RELAYMQ__LIMITS__DRAIN_TIMEOUT=30s` overrides `limits.drain_timeout`
    ///
    /// A missing file is not an error; defaults apply.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder()
            .set_default("log.level", default_log_level())?
            .set_default("server.bind", default_bind().to_string())?
            .set_default("limits.outbound_queue", default_outbound_queue() as i64)?
            .set_default("limits.handshake_timeout", "10s")?
            .set_default("metrics.enabled", false)?
            .set_default("metrics.bind", MetricsConfig::default().bind.to_string())?;

        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(content) => {
                let substituted = substitute_env_vars(&content);
                builder = builder.add_source(File::from_str(&substituted, FileFormat::Toml));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(ConfigError::Io(e)),
        }

        // Double underscore separates nested keys, single underscore preserved in field names
        let cfg = builder
            .add_source(
                Environment::with_prefix("RELAYMQ")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Config = cfg.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration with environment variable overrides only (no file)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load(Path::new(""))
    }

    /// Parse configuration from a string (for testing, no env var support)
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !LOG_LEVELS.contains(&self.log.level.to_ascii_lowercase().as_str()) {
            return Err(ConfigError::Validation(format!(
                "log.level must be one of {}, got '{}'",
                LOG_LEVELS.join(", "),
                self.log.level
            )));
        }

        if self.limits.outbound_queue == 0 {
            return Err(ConfigError::Validation(
                "limits.outbound_queue must be at least 1".to_string(),
            ));
        }

        if self.limits.handshake_timeout.is_zero() {
            return Err(ConfigError::Validation(
                "limits.handshake_timeout must be greater than zero".to_string(),
            ));
        }

        if self.limits.drain_timeout.is_some_and(|d| d.is_zero()) {
            return Err(ConfigError::Validation(
                "limits.drain_timeout must be greater than zero when set".to_string(),
            ));
        }

        Ok(())
    }

    /// Broker settings for listening on `port`
    pub fn broker_config(&self, port: u16) -> BrokerConfig {
        BrokerConfig {
            bind_addr: SocketAddr::new(self.server.bind, port),
            outbound_queue: self.limits.outbound_queue,
            handshake_timeout: self.limits.handshake_timeout,
            drain_timeout: self.limits.drain_timeout,
        }
    }
}
