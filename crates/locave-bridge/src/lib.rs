//! LoCave UART bridge protocol engine
//!
//! This crate terminates the UART end of the LoCave mesh. The bridge is logical
//! address 0 on the mesh: it decodes the frames its directly attached node
//! hands over, tracks what it learns about the network, confirms DATA
//! messages, and puts its own traffic (keepalives, weather, chat relay
//! messages) back on the wire.
//!
//! # Architecture
//!
//! The engine is built in layers:
//!
//! 1. **Wire** - SLIP framing ([`slip`]), CRC-8 ([`checksum`]), 8-byte header ([`header`])
//! 2. **State** - Persisted sequence counter ([`sequence`]) and node registry ([`registry`])
//! 3. **Engine** - Receive pipeline, transmit path, link manager with reconnect
//! 4. **Schedulers** - Keepalive, weather broadcast, chat relay forwarding
//!
//! # Quick Start
//!
//! ```rust,ignore
//! // Enable the `serial` feature to use SerialInterface
//! use locave_bridge::{BridgeConfigBuilder, BridgeService, RelayQueue, SerialInterface};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = BridgeConfigBuilder::new()
//!         .serial_port("/dev/ttyUSB0")
//!         .build();
//!
//!     let interface = SerialInterface::from_config(&config.link);
//!     let relay = Arc::new(RelayQueue::new());
//!     let service = BridgeService::start(interface, config, relay, None)?;
//!
//!     service.handle().broadcast("hello cave")?;
//!     println!("{:?}", service.handle().known_nodes());
//!
//!     service.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! # Features
//!
//! - `serial` - Serial port interface via `tokio-serial` (no libudev needed)
//!
//! # Frame Format
//!
//! On the wire each frame is SLIP-escaped and wrapped in `0xC0` delimiters:
//! - Byte 0: CRC-8/MAXIM over bytes 1..
//! - Bytes 1-7: link sender, source, dest, ttl, seq, type, length
//! - Bytes 8+: payload (at most 255 bytes)

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

// Wire format
pub mod checksum;
pub mod header;
pub mod payload;
pub mod slip;

// Core modules
pub mod config;
pub mod error;
pub mod interface;

// State
pub mod registry;
pub mod sequence;

// Engine
pub mod bridge;
pub mod pipeline;
pub mod scheduler;
pub mod service;
pub mod transmit;

// Collaborators
pub mod relay;
pub mod weather;

// Testing utilities
pub mod test_utils;

// Re-exports for convenience
pub use config::{
    BridgeConfig, BridgeConfigBuilder, LinkConfig, RegistryConfig, ScheduleConfig, TransmitConfig,
};
pub use error::{BridgeError, Result};
pub use interface::{ConnectionState, LinkInterface};

#[cfg(feature = "serial")]
pub use interface::SerialInterface;

pub use bridge::{BridgeHandle, LinkManager};
pub use header::{Frame, MessageType, ProtocolHeader};
pub use payload::{InterfaceKind, Neighbor, StatusReport};
pub use pipeline::ReceivePipeline;
pub use registry::{
    BleSighting, Direction, HistoryEntry, HistoryRecord, KnownNode, NodeRegistry, TopologyEntry,
};
pub use relay::{ChatRelay, RelayQueue};
pub use sequence::SequenceStore;
pub use service::BridgeService;
pub use transmit::{OutboundMessage, Transmitter};
pub use weather::{CurrentConditions, WeatherSource};

pub use test_utils::{MockController, MockInterface};

// Protocol constants re-exports
pub use config::{
    BRIDGE_ADDRESS, BROADCAST_ADDRESS, DEFAULT_BAUD_RATE, DEFAULT_TTL, HEADER_LEN,
    MAX_PAYLOAD_LEN, RELAY_ADDRESS,
};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
