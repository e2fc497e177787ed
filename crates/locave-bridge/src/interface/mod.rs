//! Link interfaces for the bridge UART
//!
//! The engine talks to the mesh through a [`LinkInterface`]: a raw byte pipe
//! that can be opened, read with a timeout, written and closed again. SLIP
//! framing happens above this layer, so an interface never interprets bytes.
//!
//! - [`SerialInterface`] - Serial port communication (requires `serial` feature)
//! - [`crate::test_utils::MockInterface`] - In-memory link for tests
//!
//! The `serial` feature builds `tokio-serial` without libudev, so no system
//! packages are needed; ports are opened by path.

#[cfg(feature = "serial")]
mod serial;

#[cfg(feature = "serial")]
pub use serial::SerialInterface;

use crate::error::Result;
use async_trait::async_trait;
use bytes::Bytes;

/// Trait for the byte link between the bridge and its UART peer
#[async_trait]
pub trait LinkInterface: Send + Sync {
    /// Open the link
    async fn connect(&mut self) -> Result<()>;

    /// Close the link
    async fn disconnect(&mut self) -> Result<()>;

    /// Check if currently connected
    fn is_connected(&self) -> bool;

    /// Read whatever bytes are available
    ///
    /// Returns `None` when the read timed out without data.
    /// Returns `Err` on connection/read errors.
    async fn read_bytes(&mut self) -> Result<Option<Bytes>>;

    /// Write all of `data` to the link
    async fn write_bytes(&mut self, data: &[u8]) -> Result<()>;

    /// Get the interface name (for logging)
    fn name(&self) -> &str;
}

/// Connection state of the link, as published to the query surface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not connected
    Disconnected,
    /// Connection in progress
    Connecting,
    /// Successfully connected
    Connected,
    /// Connection lost, retrying
    Reconnecting,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
            ConnectionState::Reconnecting => write!(f, "reconnecting"),
        }
    }
}
