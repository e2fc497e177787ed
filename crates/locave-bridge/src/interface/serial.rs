//! Serial port interface for the bridge UART
//!
//! Thin async wrapper around tokio-serial. Bytes are passed through untouched;
//! the caller does SLIP framing. A read that times out is not an error.

use crate::config::{LinkConfig, DEFAULT_BAUD_RATE};
use crate::error::{BridgeError, Result};
use crate::interface::{ConnectionState, LinkInterface};
use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_serial::{SerialPortBuilderExt, SerialStream};
use tracing::{debug, error, info, trace};

/// Buffer size for reading from serial port
const READ_BUFFER_SIZE: usize = 512;

/// Serial interface to the UART peer
pub struct SerialInterface {
    /// Serial port path
    port_path: PathBuf,

    /// Baud rate
    baud_rate: u32,

    /// Read timeout
    timeout: Duration,

    /// Serial stream (when connected)
    stream: Option<SerialStream>,

    /// Current connection state
    state: ConnectionState,

    /// Interface name for logging
    name: String,
}

impl SerialInterface {
    /// Create a new serial interface
    pub fn new(port: impl AsRef<Path>) -> Self {
        let port_path = port.as_ref().to_path_buf();
        let name = format!("serial:{}", port_path.display());

        Self {
            port_path,
            baud_rate: DEFAULT_BAUD_RATE,
            timeout: Duration::from_secs(1),
            stream: None,
            state: ConnectionState::Disconnected,
            name,
        }
    }

    /// Create from link configuration
    pub fn from_config(config: &LinkConfig) -> Self {
        Self::new(&config.port)
            .with_baud_rate(config.baud_rate)
            .with_timeout(config.read_timeout)
    }

    /// Create with custom baud rate
    pub fn with_baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    /// Create with custom read timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Get the port path
    pub fn port_path(&self) -> &Path {
        &self.port_path
    }

    /// Get the current connection state
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    fn mark_lost(&mut self) {
        self.stream = None;
        self.state = ConnectionState::Disconnected;
    }
}

#[async_trait]
impl LinkInterface for SerialInterface {
    async fn connect(&mut self) -> Result<()> {
        if self.is_connected() {
            return Ok(());
        }
        // Adapter not plugged in yet; the link manager keeps retrying
        if !self.port_path.exists() {
            self.mark_lost();
            return Err(BridgeError::PortNotFound(
                self.port_path.display().to_string(),
            ));
        }

        self.state = ConnectionState::Connecting;
        debug!(port = %self.port_path.display(), baud = self.baud_rate, "Opening UART");

        let opened = tokio_serial::new(self.port_path.to_string_lossy(), self.baud_rate)
            .timeout(self.timeout)
            .open_native_async();

        match opened {
            Ok(stream) => {
                self.stream = Some(stream);
                self.state = ConnectionState::Connected;
                info!(port = %self.port_path.display(), baud = self.baud_rate, "UART open");
                Ok(())
            }
            Err(e) => {
                self.mark_lost();
                Err(match BridgeError::from(e) {
                    BridgeError::PortOpenFailed { reason, .. } => BridgeError::PortOpenFailed {
                        port: self.port_path.display().to_string(),
                        reason,
                    },
                    other => other,
                })
            }
        }
    }

    async fn disconnect(&mut self) -> Result<()> {
        let was_open = self.stream.is_some();
        self.mark_lost();
        if was_open {
            info!(port = %self.port_path.display(), "UART closed");
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected && self.stream.is_some()
    }

    async fn read_bytes(&mut self) -> Result<Option<Bytes>> {
        let timeout = self.timeout;
        let stream = self.stream.as_mut().ok_or(BridgeError::Disconnected)?;

        let mut buf = [0u8; READ_BUFFER_SIZE];
        let read = match tokio::time::timeout(timeout, stream.read(&mut buf)).await {
            Ok(read) => read,
            Err(_) => return Ok(None),
        };

        match read {
            Ok(0) => {
                // EOF - adapter unplugged
                self.mark_lost();
                Err(BridgeError::Disconnected)
            }
            Ok(n) => {
                trace!(bytes = n, "Read from serial port");
                Ok(Some(Bytes::copy_from_slice(&buf[..n])))
            }
            Err(e)
                if e.kind() == std::io::ErrorKind::TimedOut
                    || e.kind() == std::io::ErrorKind::WouldBlock =>
            {
                Ok(None)
            }
            Err(e) => {
                error!(error = %e, "Serial read error");
                self.mark_lost();
                Err(BridgeError::ReadError(e.to_string()))
            }
        }
    }

    async fn write_bytes(&mut self, data: &[u8]) -> Result<()> {
        let stream = self.stream.as_mut().ok_or(BridgeError::Disconnected)?;

        trace!(bytes = data.len(), "Writing to serial port");
        if let Err(e) = stream.write_all(data).await {
            error!(error = %e, "Serial write error");
            self.mark_lost();
            return Err(BridgeError::WriteError(e.to_string()));
        }

        stream
            .flush()
            .await
            .map_err(|e| BridgeError::WriteError(format!("Flush failed: {}", e)))?;

        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Debug for SerialInterface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialInterface")
            .field("port", &self.port_path)
            .field("baud_rate", &self.baud_rate)
            .field("state", &self.state)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interface_state() {
        let iface = SerialInterface::new("/dev/ttyUSB0");
        assert_eq!(iface.state(), ConnectionState::Disconnected);
        assert!(!iface.is_connected());
    }

    #[test]
    fn test_interface_name() {
        let iface = SerialInterface::new("/dev/ttyUSB0");
        assert_eq!(iface.name(), "serial:/dev/ttyUSB0");
    }

    #[test]
    fn test_from_config() {
        let config = LinkConfig {
            port: PathBuf::from("/dev/ttyACM1"),
            baud_rate: 9600,
            ..LinkConfig::default()
        };
        let iface = SerialInterface::from_config(&config);
        assert_eq!(iface.port_path(), Path::new("/dev/ttyACM1"));
        assert_eq!(iface.baud_rate, 9600);
    }

    #[tokio::test]
    async fn test_missing_port() {
        let mut iface = SerialInterface::new("/dev/does-not-exist-locave");
        let err = iface.connect().await.unwrap_err();
        assert!(matches!(err, BridgeError::PortNotFound(_)));
        assert!(err.is_retriable());
        assert_eq!(iface.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_disconnect_when_closed() {
        let mut iface = SerialInterface::new("/dev/does-not-exist-locave");
        iface.disconnect().await.unwrap();
        assert_eq!(iface.state(), ConnectionState::Disconnected);
        assert!(!iface.is_connected());
    }

    #[tokio::test]
    async fn test_read_without_connection() {
        let mut iface = SerialInterface::new("/dev/ttyUSB0");
        assert!(matches!(
            iface.read_bytes().await,
            Err(BridgeError::Disconnected)
        ));
        assert!(iface.write_bytes(b"x").await.is_err());
    }
}
