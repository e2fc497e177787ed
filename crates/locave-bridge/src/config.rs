//! Configuration types for the LoCave bridge
//!
//! This module provides configuration structures for the serial link, the
//! sequence file, transmit defaults, the periodic schedulers and the node
//! registry, plus the protocol constants shared across the crate.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{BridgeError, Result};

/// Logical address of the bridge itself
pub const BRIDGE_ADDRESS: u8 = 0;

/// Virtual source address used for messages injected by the chat relay
pub const RELAY_ADDRESS: u8 = 254;

/// Broadcast destination address
pub const BROADCAST_ADDRESS: u8 = 255;

/// Size of the fixed protocol header
pub const HEADER_LEN: usize = 8;

/// Largest payload the 8-bit length field can describe
pub const MAX_PAYLOAD_LEN: usize = u8::MAX as usize;

/// Default hop budget for bridge-originated messages
pub const DEFAULT_TTL: u8 = 25;

/// Default baud rate for the bridge UART
pub const DEFAULT_BAUD_RATE: u32 = 115200;

/// Default number of retained history entries
pub const DEFAULT_HISTORY_CAPACITY: usize = 200;

/// Default freshness window for topology reports
pub const DEFAULT_TOPOLOGY_WINDOW: Duration = Duration::from_secs(600);

/// Main configuration for the bridge
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Serial link settings
    #[serde(default)]
    pub link: LinkConfig,

    /// File holding the persisted sequence counter
    #[serde(default = "default_sequence_path")]
    pub sequence_path: PathBuf,

    /// Transmit path settings
    #[serde(default)]
    pub transmit: TransmitConfig,

    /// Periodic activity settings
    #[serde(default)]
    pub schedule: ScheduleConfig,

    /// Node registry settings
    #[serde(default)]
    pub registry: RegistryConfig,
}

fn default_sequence_path() -> PathBuf {
    PathBuf::from(".sequence")
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            link: LinkConfig::default(),
            sequence_path: default_sequence_path(),
            transmit: TransmitConfig::default(),
            schedule: ScheduleConfig::default(),
            registry: RegistryConfig::default(),
        }
    }
}

/// Serial link configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkConfig {
    /// Path to serial port (e.g., /dev/ttyUSB0)
    #[serde(default = "default_port")]
    pub port: PathBuf,

    /// Baud rate (default: 115200)
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,

    /// Read timeout on the open port
    #[serde(with = "humantime_serde", default = "default_read_timeout")]
    pub read_timeout: Duration,

    /// Fixed delay between reconnect attempts
    #[serde(with = "humantime_serde", default = "default_reconnect_interval")]
    pub reconnect_interval: Duration,
}

fn default_port() -> PathBuf {
    PathBuf::from("/dev/ttyUSB0")
}

fn default_baud_rate() -> u32 {
    DEFAULT_BAUD_RATE
}

fn default_read_timeout() -> Duration {
    Duration::from_secs(1)
}

fn default_reconnect_interval() -> Duration {
    Duration::from_secs(2)
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            baud_rate: DEFAULT_BAUD_RATE,
            read_timeout: default_read_timeout(),
            reconnect_interval: default_reconnect_interval(),
        }
    }
}

/// Transmit path configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransmitConfig {
    /// Hop budget stamped on outgoing frames
    #[serde(default = "default_ttl")]
    pub default_ttl: u8,

    /// Queue size for frames waiting for the link
    #[serde(default = "default_queue_size")]
    pub queue_size: usize,
}

fn default_ttl() -> u8 {
    DEFAULT_TTL
}

fn default_queue_size() -> usize {
    256
}

impl Default for TransmitConfig {
    fn default() -> Self {
        Self {
            default_ttl: DEFAULT_TTL,
            queue_size: default_queue_size(),
        }
    }
}

/// Periodic activity configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Broadcast keepalive pings
    #[serde(default = "default_enabled")]
    pub keepalive_enabled: bool,

    /// Delay between keepalive pings
    #[serde(with = "humantime_serde", default = "default_keepalive_interval")]
    pub keepalive_interval: Duration,

    /// Broadcast current weather when a weather source is attached
    #[serde(default = "default_enabled")]
    pub weather_enabled: bool,

    /// Delay between weather broadcasts
    #[serde(with = "humantime_serde", default = "default_weather_interval")]
    pub weather_interval: Duration,

    /// Forward chat relay messages into the mesh
    #[serde(default = "default_enabled")]
    pub relay_enabled: bool,

    /// Poll interval while the relay queue is empty
    #[serde(with = "humantime_serde", default = "default_relay_poll_interval")]
    pub relay_poll_interval: Duration,

    /// Gap between consecutive forwarded relay messages
    #[serde(with = "humantime_serde", default = "default_relay_spacing")]
    pub relay_spacing: Duration,
}

fn default_enabled() -> bool {
    true
}

fn default_keepalive_interval() -> Duration {
    Duration::from_secs(5)
}

fn default_weather_interval() -> Duration {
    Duration::from_secs(300)
}

fn default_relay_poll_interval() -> Duration {
    Duration::from_secs(1)
}

fn default_relay_spacing() -> Duration {
    Duration::from_millis(100)
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            keepalive_enabled: true,
            keepalive_interval: default_keepalive_interval(),
            weather_enabled: true,
            weather_interval: default_weather_interval(),
            relay_enabled: true,
            relay_poll_interval: default_relay_poll_interval(),
            relay_spacing: default_relay_spacing(),
        }
    }
}

/// Node registry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Number of history entries kept before the oldest is evicted
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,

    /// Topology reports older than this are hidden from queries
    #[serde(with = "humantime_serde", default = "default_topology_window")]
    pub topology_window: Duration,
}

fn default_history_capacity() -> usize {
    DEFAULT_HISTORY_CAPACITY
}

fn default_topology_window() -> Duration {
    DEFAULT_TOPOLOGY_WINDOW
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            topology_window: DEFAULT_TOPOLOGY_WINDOW,
        }
    }
}

impl BridgeConfig {
    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.link.baud_rate == 0 {
            return Err(BridgeError::InvalidConfig(
                "link.baud_rate must be greater than zero".to_string(),
            ));
        }
        let intervals = [
            ("link.read_timeout", self.link.read_timeout),
            ("link.reconnect_interval", self.link.reconnect_interval),
            ("schedule.keepalive_interval", self.schedule.keepalive_interval),
            ("schedule.weather_interval", self.schedule.weather_interval),
            ("schedule.relay_poll_interval", self.schedule.relay_poll_interval),
        ];
        for (name, interval) in intervals {
            if interval.is_zero() {
                return Err(BridgeError::InvalidConfig(format!(
                    "{} must be greater than zero",
                    name
                )));
            }
        }
        if self.registry.history_capacity == 0 {
            return Err(BridgeError::InvalidConfig(
                "registry.history_capacity must be greater than zero".to_string(),
            ));
        }
        if self.transmit.queue_size == 0 {
            return Err(BridgeError::InvalidConfig(
                "transmit.queue_size must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Builder for BridgeConfig
#[derive(Debug, Default)]
pub struct BridgeConfigBuilder {
    config: BridgeConfig,
}

impl BridgeConfigBuilder {
    /// Create a new builder with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set serial port path
    pub fn serial_port(mut self, port: impl Into<PathBuf>) -> Self {
        self.config.link.port = port.into();
        self
    }

    /// Set serial port with baud rate
    pub fn serial_port_with_baud(mut self, port: impl Into<PathBuf>, baud_rate: u32) -> Self {
        self.config.link.port = port.into();
        self.config.link.baud_rate = baud_rate;
        self
    }

    /// Set the delay between reconnect attempts
    pub fn reconnect_interval(mut self, interval: Duration) -> Self {
        self.config.link.reconnect_interval = interval;
        self
    }

    /// Set the sequence file location
    pub fn sequence_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.sequence_path = path.into();
        self
    }

    /// Set the default hop budget
    pub fn default_ttl(mut self, ttl: u8) -> Self {
        self.config.transmit.default_ttl = ttl;
        self
    }

    /// Enable or disable the keepalive ping
    pub fn keepalive(mut self, enabled: bool) -> Self {
        self.config.schedule.keepalive_enabled = enabled;
        self
    }

    /// Enable or disable weather broadcasts
    pub fn weather(mut self, enabled: bool) -> Self {
        self.config.schedule.weather_enabled = enabled;
        self
    }

    /// Enable or disable chat relay forwarding
    pub fn relay(mut self, enabled: bool) -> Self {
        self.config.schedule.relay_enabled = enabled;
        self
    }

    /// Set the history capacity
    pub fn history_capacity(mut self, capacity: usize) -> Self {
        self.config.registry.history_capacity = capacity;
        self
    }

    /// Build the configuration
    pub fn build(self) -> BridgeConfig {
        self.config
    }
}

// Custom serde module for Duration with humantime
mod humantime_serde {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let s = humantime::format_duration(*duration).to_string();
        serializer.serialize_str(&s)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}
