//! Error types for LoCave bridge operations
//!
//! Errors are grouped the way the engine reacts to them: link errors send the
//! link manager into its reconnect loop, protocol errors drop a single frame,
//! and everything else is logged by the caller and skipped.

use thiserror::Error;

/// Main error type for bridge operations
#[derive(Error, Debug)]
pub enum BridgeError {
    // ===== Serial/Link Errors =====
    /// Serial port not found
    #[error("Serial port not found: {0}")]
    PortNotFound(String),

    /// Serial port open failed
    #[error("Failed to open serial port {port}: {reason}")]
    PortOpenFailed {
        /// Port path
        port: String,
        /// Failure reason
        reason: String,
    },

    /// Serial read error
    #[error("Serial read error: {0}")]
    ReadError(String),

    /// Serial write error
    #[error("Serial write error: {0}")]
    WriteError(String),

    /// Serial port disconnected
    #[error("Serial port disconnected")]
    Disconnected,

    // ===== Frame Errors =====
    /// Frame shorter than the fixed header
    #[error("Frame too short: {len} bytes, header needs {min}")]
    FrameTooShort {
        /// Received frame length
        len: usize,
        /// Minimum frame length
        min: usize,
    },

    /// Checksum over header and payload did not match the declared one
    #[error("Checksum mismatch: declared 0x{declared:02X}, computed 0x{computed:02X}")]
    ChecksumMismatch {
        /// Checksum carried in the frame
        declared: u8,
        /// Checksum recomputed over the frame
        computed: u8,
    },

    /// Payload does not fit the 8-bit length field
    #[error("Payload too large: {size} bytes exceeds maximum of {max} bytes")]
    PayloadTooLarge {
        /// Actual payload size
        size: usize,
        /// Maximum allowed size
        max: usize,
    },

    // ===== Application Payload Errors =====
    /// A single neighbor entry of a STATUS record could not be parsed
    #[error("Invalid status entry '{entry}': {reason}")]
    InvalidStatusEntry {
        /// The offending entry
        entry: String,
        /// Parse failure reason
        reason: String,
    },

    // ===== Collaborator Errors =====
    /// Chat relay rejected an outbound message
    #[error("Chat relay failed: {0}")]
    RelayFailed(String),

    /// Weather source could not deliver current conditions
    #[error("Weather fetch failed: {0}")]
    WeatherFailed(String),

    // ===== Persistence Errors =====
    /// Sequence counter could not be written
    #[error("Failed to persist sequence number to {path}: {reason}")]
    SequencePersist {
        /// Sequence file path
        path: String,
        /// Failure reason
        reason: String,
    },

    // ===== Configuration Errors =====
    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ===== General Errors =====
    /// Channel closed
    #[error("Channel closed")]
    ChannelClosed,

    /// IO error wrapper
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BridgeError {
    /// Check if this error means the link must be re-established
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            BridgeError::Disconnected
                | BridgeError::ReadError(_)
                | BridgeError::WriteError(_)
                | BridgeError::PortNotFound(_)
                | BridgeError::PortOpenFailed { .. }
                | BridgeError::Io(_)
        )
    }

    /// Get an error code for logging
    pub fn error_code(&self) -> &'static str {
        match self {
            BridgeError::PortNotFound(_) => "PORT_NOT_FOUND",
            BridgeError::PortOpenFailed { .. } => "PORT_OPEN_FAILED",
            BridgeError::ReadError(_) => "READ_ERROR",
            BridgeError::WriteError(_) => "WRITE_ERROR",
            BridgeError::Disconnected => "DISCONNECTED",
            BridgeError::FrameTooShort { .. } => "FRAME_TOO_SHORT",
            BridgeError::ChecksumMismatch { .. } => "CHECKSUM_MISMATCH",
            BridgeError::PayloadTooLarge { .. } => "PAYLOAD_TOO_LARGE",
            BridgeError::InvalidStatusEntry { .. } => "INVALID_STATUS_ENTRY",
            BridgeError::RelayFailed(_) => "RELAY_FAILED",
            BridgeError::WeatherFailed(_) => "WEATHER_FAILED",
            BridgeError::SequencePersist { .. } => "SEQUENCE_PERSIST",
            BridgeError::InvalidConfig(_) => "INVALID_CONFIG",
            BridgeError::ChannelClosed => "CHANNEL_CLOSED",
            BridgeError::Io(_) => "IO_ERROR",
        }
    }
}

/// Result type alias for bridge operations
pub type Result<T> = std::result::Result<T, BridgeError>;

// Port path is not part of a serialport error; `SerialInterface` fills it in
#[cfg(feature = "serial")]
impl From<tokio_serial::Error> for BridgeError {
    fn from(err: tokio_serial::Error) -> Self {
        match err.kind {
            tokio_serial::ErrorKind::NoDevice => BridgeError::PortNotFound(err.description),
            tokio_serial::ErrorKind::Io(kind) => {
                BridgeError::Io(std::io::Error::new(kind, err.description))
            }
            _ => BridgeError::PortOpenFailed {
                port: String::new(),
                reason: err.description,
            },
        }
    }
}
