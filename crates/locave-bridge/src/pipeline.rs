//! Receive pipeline
//!
//! Decodes complete SLIP frames coming off the link and applies them: every
//! frame refreshes the sender's last-seen entry, DATA is mirrored to history
//! and the chat relay and confirmed back to the sender, STATUS and
//! BLE_SCAN_RESULT update the registry. Nothing in here can fail the link.

use std::sync::Arc;
use tracing::{debug, warn};

use crate::header::{self, Frame, MessageType};
use crate::payload::{parse_ble_ids, parse_status, printable};
use crate::registry::{Direction, HistoryEntry, NodeRegistry};
use crate::relay::ChatRelay;
use crate::transmit::OutboundMessage;

/// Applies inbound frames to the registry and the chat relay
pub struct ReceivePipeline {
    registry: Arc<NodeRegistry>,
    relay: Arc<dyn ChatRelay>,
}

impl std::fmt::Debug for ReceivePipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReceivePipeline")
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

impl ReceivePipeline {
    /// Create a pipeline
    pub fn new(registry: Arc<NodeRegistry>, relay: Arc<dyn ChatRelay>) -> Self {
        Self { registry, relay }
    }

    /// Decode and apply one unescaped frame
    ///
    /// Undecodable frames are logged and dropped. Returns the reply the
    /// bridge owes the sender, if any.
    pub fn handle_frame(&self, raw: &[u8]) -> Option<OutboundMessage> {
        match header::decode(raw) {
            Ok(frame) => self.dispatch(&frame),
            Err(e) => {
                warn!(error = %e, code = e.error_code(), len = raw.len(), "Dropping frame");
                None
            }
        }
    }

    /// Apply a decoded frame
    pub fn dispatch(&self, frame: &Frame) -> Option<OutboundMessage> {
        let h = &frame.header;
        debug!(
            source = h.source,
            link_sender = h.link_sender,
            dest = h.dest,
            ttl = h.ttl,
            seq = h.seq,
            msg_type = ?h.msg_type,
            length = frame.payload.len(),
            payload = %printable(&frame.payload),
            "RX"
        );

        self.registry.record_seen(h.source, h.ttl);

        match h.msg_type {
            MessageType::Data => Some(self.on_data(frame)),
            MessageType::Status => {
                let report = parse_status(&frame.payload);
                self.registry.record_status(h.source, report);
                None
            }
            MessageType::BleScanResult => {
                let ids = parse_ble_ids(&frame.payload);
                debug!(source = h.source, count = ids.len(), "BLE scan result");
                self.registry.record_ble_sightings(h.source, &ids);
                None
            }
            MessageType::Ack
            | MessageType::Hello
            | MessageType::BaseConfirm
            | MessageType::PingResponse
            | MessageType::Ping
            | MessageType::Unknown(_) => None,
        }
    }

    fn on_data(&self, frame: &Frame) -> OutboundMessage {
        let h = &frame.header;
        self.registry.push_history(HistoryEntry::now(
            h.source,
            h.dest,
            Direction::Received,
            printable(&frame.payload),
        ));

        let text = String::from_utf8_lossy(&frame.payload);
        if let Err(e) = self.relay.send_outbound(&format!("{}: {}", h.source, text)) {
            warn!(error = %e, source = h.source, "Chat relay notification failed");
        }

        OutboundMessage::new(h.source, MessageType::BaseConfirm, h.seq.to_string())
    }
}
