//! Transmit path
//!
//! Turns an [`OutboundMessage`] into wire bytes: takes the next sequence
//! number, builds and checksums the header, SLIP-frames the result and
//! records DATA messages in history. Only the link task calls
//! [`Transmitter::prepare`], right before writing, so sequence numbers reach
//! the wire in order.

use bytes::Bytes;
use std::sync::Arc;
use tracing::debug;

use crate::config::{BRIDGE_ADDRESS, MAX_PAYLOAD_LEN};
use crate::error::{BridgeError, Result};
use crate::header::{self, MessageType, ProtocolHeader};
use crate::payload::printable;
use crate::registry::{Direction, HistoryEntry, NodeRegistry};
use crate::sequence::SequenceStore;
use crate::slip;

/// A message the bridge wants to put on the mesh
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    /// Logical destination
    pub dest: u8,
    /// Message type
    pub msg_type: MessageType,
    /// Payload bytes
    pub payload: Bytes,
    /// Hop budget, `None` for the configured default
    pub ttl: Option<u8>,
    /// Logical source, the bridge unless relaying for a virtual node
    pub source: u8,
}

impl OutboundMessage {
    /// Message from the bridge with the default TTL
    pub fn new(dest: u8, msg_type: MessageType, payload: impl Into<Bytes>) -> Self {
        Self {
            dest,
            msg_type,
            payload: payload.into(),
            ttl: None,
            source: BRIDGE_ADDRESS,
        }
    }

    /// DATA message carrying `text`
    pub fn data(dest: u8, text: &str) -> Self {
        Self::new(dest, MessageType::Data, Bytes::copy_from_slice(text.as_bytes()))
    }

    /// HELLO with an empty payload
    pub fn hello(dest: u8) -> Self {
        Self::new(dest, MessageType::Hello, Bytes::new())
    }

    /// Override the hop budget
    pub fn with_ttl(mut self, ttl: u8) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Override the logical source
    pub fn with_source(mut self, source: u8) -> Self {
        self.source = source;
        self
    }

    /// Reject payloads that do not fit the 8-bit length field
    pub fn check_size(&self) -> Result<()> {
        if self.payload.len() > MAX_PAYLOAD_LEN {
            return Err(BridgeError::PayloadTooLarge {
                size: self.payload.len(),
                max: MAX_PAYLOAD_LEN,
            });
        }
        Ok(())
    }
}

/// Builds wire frames for outbound messages
#[derive(Debug)]
pub struct Transmitter {
    sequence: Arc<SequenceStore>,
    registry: Arc<NodeRegistry>,
    default_ttl: u8,
}

impl Transmitter {
    /// Create a transmitter
    pub fn new(sequence: Arc<SequenceStore>, registry: Arc<NodeRegistry>, default_ttl: u8) -> Self {
        Self {
            sequence,
            registry,
            default_ttl,
        }
    }

    /// Sequence counter used for outbound frames
    pub fn sequence(&self) -> &SequenceStore {
        &self.sequence
    }

    /// Encode `message` into SLIP-framed wire bytes
    ///
    /// Advances the sequence counter. An oversized payload is rejected before
    /// a sequence number is consumed.
    pub fn prepare(&self, message: &OutboundMessage) -> Result<Bytes> {
        message.check_size()?;

        let seq = self.sequence.next();
        let ttl = message.ttl.unwrap_or(self.default_ttl);
        let header =
            ProtocolHeader::outbound(message.source, message.dest, ttl, seq, message.msg_type);
        let frame = header::encode(&header, &message.payload)?;

        debug!(
            source = message.source,
            dest = message.dest,
            ttl,
            seq,
            msg_type = ?message.msg_type,
            length = message.payload.len(),
            "TX"
        );

        if message.msg_type == MessageType::Data {
            let direction = if message.source == BRIDGE_ADDRESS {
                Direction::Sent
            } else {
                Direction::Received
            };
            self.registry.push_history(HistoryEntry::now(
                message.source,
                message.dest,
                direction,
                printable(&message.payload),
            ));
        }

        Ok(slip::encode(&frame))
    }
}
