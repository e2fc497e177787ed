//! Protocol header codec
//!
//! Every frame starts with a fixed 8-byte header:
//!
//! ```text
//! 0         1            2       3     4    5    6         7
//! checksum  link_sender  source  dest  ttl  seq  msg_type  length
//! ```
//!
//! followed by `length` payload bytes. The checksum covers bytes 1.. of the
//! frame (the rest of the header and the payload).

use bytes::{BufMut, Bytes, BytesMut};
use tracing::debug;

use crate::checksum::checksum;
use crate::config::{HEADER_LEN, MAX_PAYLOAD_LEN};
use crate::error::{BridgeError, Result};

/// Message types carried in the header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    /// Application text
    Data,
    /// Link-level acknowledgement
    Ack,
    /// Hello / ping request
    Hello,
    /// Neighbor and weather status report
    Status,
    /// BLE device sightings
    BleScanResult,
    /// Bridge confirmation of a received DATA message
    BaseConfirm,
    /// Reply to a ping
    PingResponse,
    /// Ping
    Ping,
    /// Any type this bridge does not know
    Unknown(u8),
}

impl From<u8> for MessageType {
    fn from(value: u8) -> Self {
        match value {
            0 => Self::Data,
            1 => Self::Ack,
            2 => Self::Hello,
            3 => Self::Status,
            4 => Self::BleScanResult,
            5 => Self::BaseConfirm,
            254 => Self::PingResponse,
            255 => Self::Ping,
            other => Self::Unknown(other),
        }
    }
}

impl From<MessageType> for u8 {
    fn from(msg_type: MessageType) -> Self {
        match msg_type {
            MessageType::Data => 0,
            MessageType::Ack => 1,
            MessageType::Hello => 2,
            MessageType::Status => 3,
            MessageType::BleScanResult => 4,
            MessageType::BaseConfirm => 5,
            MessageType::PingResponse => 254,
            MessageType::Ping => 255,
            MessageType::Unknown(other) => other,
        }
    }
}

/// Decoded protocol header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtocolHeader {
    /// Checksum over the rest of the frame
    pub checksum: u8,
    /// UART peer that handed the frame to us (0 for bridge-originated frames)
    pub link_sender: u8,
    /// Logical originating node
    pub source: u8,
    /// Logical destination
    pub dest: u8,
    /// Remaining hop budget
    pub ttl: u8,
    /// Sender's sequence number
    pub seq: u8,
    /// Message type
    pub msg_type: MessageType,
    /// Declared payload length
    pub length: u8,
}

impl ProtocolHeader {
    /// Header for a frame originated by this bridge
    ///
    /// `checksum` and `length` are filled in by [`encode`].
    pub fn outbound(source: u8, dest: u8, ttl: u8, seq: u8, msg_type: MessageType) -> Self {
        Self {
            checksum: 0,
            link_sender: 0,
            source,
            dest,
            ttl,
            seq,
            msg_type,
            length: 0,
        }
    }

    fn to_bytes(self) -> [u8; HEADER_LEN] {
        [
            self.checksum,
            self.link_sender,
            self.source,
            self.dest,
            self.ttl,
            self.seq,
            self.msg_type.into(),
            self.length,
        ]
    }
}

/// A decoded frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Frame header
    pub header: ProtocolHeader,
    /// Payload bytes following the header
    pub payload: Bytes,
}

/// Serialize `header` and `payload`, stamping length and checksum
///
/// The `checksum` and `length` fields of `header` are ignored; they are always
/// derived from the payload.
pub fn encode(header: &ProtocolHeader, payload: &[u8]) -> Result<Bytes> {
    if payload.len() > MAX_PAYLOAD_LEN {
        return Err(BridgeError::PayloadTooLarge {
            size: payload.len(),
            max: MAX_PAYLOAD_LEN,
        });
    }

    let mut stamped = *header;
    stamped.length = payload.len() as u8;

    let mut out = BytesMut::with_capacity(HEADER_LEN + payload.len());
    out.put_slice(&stamped.to_bytes());
    out.put_slice(payload);
    out[0] = checksum(&out[1..]);
    Ok(out.freeze())
}

/// Parse and verify a frame
///
/// The payload is everything after the header. A declared `length` that
/// disagrees with it is tolerated and only logged.
pub fn decode(frame: &[u8]) -> Result<Frame> {
    if frame.len() < HEADER_LEN {
        return Err(BridgeError::FrameTooShort {
            len: frame.len(),
            min: HEADER_LEN,
        });
    }

    let declared = frame[0];
    let computed = checksum(&frame[1..]);
    if declared != computed {
        return Err(BridgeError::ChecksumMismatch { declared, computed });
    }

    let header = ProtocolHeader {
        checksum: declared,
        link_sender: frame[1],
        source: frame[2],
        dest: frame[3],
        ttl: frame[4],
        seq: frame[5],
        msg_type: MessageType::from(frame[6]),
        length: frame[7],
    };
    let payload = Bytes::copy_from_slice(&frame[HEADER_LEN..]);

    if header.length as usize != payload.len() {
        debug!(
            declared = header.length,
            actual = payload.len(),
            source = header.source,
            "Payload length mismatch, using actual length"
        );
    }

    Ok(Frame { header, payload })
}
