//! Link manager and bridge handle
//!
//! The [`LinkManager`] task owns the [`LinkInterface`]. It reads bytes, runs
//! them through the SLIP decoder and the [`ReceivePipeline`], writes queued
//! outbound messages and, whenever the link fails, closes it and retries at a
//! fixed interval until it is back or shutdown is signalled.
//!
//! Sequence numbers are assigned by the link task at write time, for queued
//! messages and pipeline replies alike, so the wire order always matches the
//! sequence order.
//!
//! Everything else talks to the engine through a cloneable [`BridgeHandle`].
//!
//! ```text
//!  BridgeHandle ──► outbound queue ──► LinkManager ──prepare──► UART
//!       │                                   │
//!       └── queries ──► NodeRegistry ◄── ReceivePipeline ◄── UART
//! ```

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, trace, warn};

use crate::config::BROADCAST_ADDRESS;
use crate::error::{BridgeError, Result};
use crate::interface::{ConnectionState, LinkInterface};
use crate::pipeline::ReceivePipeline;
use crate::registry::{BleSighting, HistoryRecord, KnownNode, NodeRegistry, TopologyEntry};
use crate::relay::ChatRelay;
use crate::slip::SlipDecoder;
use crate::transmit::{OutboundMessage, Transmitter};

/// Task that owns the link
pub struct LinkManager<I: LinkInterface> {
    /// UART link
    interface: I,
    /// Inbound frame handling
    pipeline: ReceivePipeline,
    /// Used for replies generated by the pipeline
    transmitter: Arc<Transmitter>,
    /// SLIP state for the inbound byte stream
    decoder: SlipDecoder,
    /// Messages queued by handles
    outbound_rx: mpsc::Receiver<OutboundMessage>,
    /// Published link state
    state_tx: watch::Sender<ConnectionState>,
    /// Delay between reconnect attempts
    reconnect_interval: Duration,
}

impl<I: LinkInterface + 'static> LinkManager<I> {
    /// Create a link manager and the handle that feeds it
    pub fn new(
        interface: I,
        pipeline: ReceivePipeline,
        transmitter: Arc<Transmitter>,
        registry: Arc<NodeRegistry>,
        relay: Arc<dyn ChatRelay>,
        queue_size: usize,
        reconnect_interval: Duration,
    ) -> (Self, BridgeHandle) {
        let (outbound_tx, outbound_rx) = mpsc::channel(queue_size.max(1));
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);

        let handle = BridgeHandle {
            outbound_tx,
            transmitter: transmitter.clone(),
            registry,
            relay,
            link_state: state_rx,
        };

        let manager = Self {
            interface,
            pipeline,
            transmitter,
            decoder: SlipDecoder::new(),
            outbound_rx,
            state_tx,
            reconnect_interval,
        };

        (manager, handle)
    }

    /// Run until `shutdown` flips to true
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(interface = self.interface.name(), "Starting link manager");

        if self.establish(&mut shutdown).await {
            loop {
                let outcome = tokio::select! {
                    biased;

                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                        Ok(())
                    }

                    Some(message) = self.outbound_rx.recv() => self.transmit(&message).await,

                    read = self.interface.read_bytes() => match read {
                        Ok(Some(data)) => self.on_bytes(&data).await,
                        Ok(None) => {
                            trace!("Read timeout");
                            Ok(())
                        }
                        Err(e) => Err(e),
                    },
                };

                match outcome {
                    Ok(()) => {}
                    Err(e) if e.is_retriable() => {
                        if !self.recover(e, &mut shutdown).await {
                            break;
                        }
                    }
                    Err(e) => warn!(error = %e, code = e.error_code(), "Frame not sent"),
                }
            }
        }

        if let Err(e) = self.interface.disconnect().await {
            warn!(error = %e, "Error closing link");
        }
        self.state_tx.send_replace(ConnectionState::Disconnected);
        info!("Link manager stopped");
    }

    /// Feed raw bytes through the decoder and answer what needs answering
    ///
    /// Every complete frame in `data` is applied before any reply goes out,
    /// so a failing write cannot lose frames that were already received.
    async fn on_bytes(&mut self, data: &[u8]) -> Result<()> {
        trace!(bytes = data.len(), "Link read");
        let frames = self.decoder.feed(data);
        let replies: Vec<OutboundMessage> = frames
            .iter()
            .filter_map(|raw| self.pipeline.handle_frame(raw))
            .collect();

        for reply in &replies {
            match self.transmit(reply).await {
                Ok(()) => {}
                Err(e) if e.is_retriable() => return Err(e),
                Err(e) => warn!(error = %e, dest = reply.dest, "Reply not sent"),
            }
        }
        Ok(())
    }

    /// Number, encode and write one message
    async fn transmit(&mut self, message: &OutboundMessage) -> Result<()> {
        let wire = self.transmitter.prepare(message)?;
        self.interface.write_bytes(&wire).await
    }

    /// Close the failed link and reopen it
    ///
    /// Returns false if shutdown was signalled first.
    async fn recover(&mut self, cause: BridgeError, shutdown: &mut watch::Receiver<bool>) -> bool {
        warn!(error = %cause, code = cause.error_code(), "Link failure");
        self.state_tx.send_replace(ConnectionState::Reconnecting);
        if let Err(e) = self.interface.disconnect().await {
            debug!(error = %e, "Error closing failed link");
        }
        self.decoder.reset();
        self.establish(shutdown).await
    }

    /// Try to open the link until it succeeds or shutdown is signalled
    async fn establish(&mut self, shutdown: &mut watch::Receiver<bool>) -> bool {
        loop {
            if *shutdown.borrow() {
                return false;
            }
            if *self.state_tx.borrow() == ConnectionState::Disconnected {
                self.state_tx.send_replace(ConnectionState::Connecting);
            }

            match self.interface.connect().await {
                Ok(()) => {
                    self.state_tx.send_replace(ConnectionState::Connected);
                    info!(interface = self.interface.name(), "Link up");
                    return true;
                }
                Err(e) => {
                    warn!(
                        error = %e,
                        retry_in = ?self.reconnect_interval,
                        "Link open failed"
                    );
                }
            }

            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        return false;
                    }
                }
                _ = tokio::time::sleep(self.reconnect_interval) => {}
            }
        }
    }
}

/// Handle for driving the bridge
///
/// This is what an API layer or console holds: it queues outbound messages
/// and answers registry queries.
#[derive(Clone)]
pub struct BridgeHandle {
    outbound_tx: mpsc::Sender<OutboundMessage>,
    transmitter: Arc<Transmitter>,
    registry: Arc<NodeRegistry>,
    relay: Arc<dyn ChatRelay>,
    link_state: watch::Receiver<ConnectionState>,
}

impl std::fmt::Debug for BridgeHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeHandle")
            .field("link_state", &self.link_state())
            .field("queued", &(self.outbound_tx.max_capacity() - self.outbound_tx.capacity()))
            .finish()
    }
}

impl BridgeHandle {
    /// Queue a message for the link
    ///
    /// Fire-and-forget: a full queue drops the message with a warning. Fails
    /// only for payloads that do not fit a frame or when the engine is gone.
    /// The sequence number is taken when the link task writes the frame.
    pub fn send(&self, message: OutboundMessage) -> Result<()> {
        message.check_size()?;
        match self.outbound_tx.try_send(message) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(message)) => {
                warn!(
                    dest = message.dest,
                    msg_type = ?message.msg_type,
                    "Transmit queue full, message dropped"
                );
                Ok(())
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(BridgeError::ChannelClosed),
        }
    }

    /// Send a HELLO to `node`
    pub fn ping(&self, node: u8) -> Result<()> {
        self.send(OutboundMessage::hello(node))
    }

    /// Mirror `content` to the chat relay and broadcast it as DATA
    pub fn broadcast(&self, content: &str) -> Result<()> {
        if let Err(e) = self.relay.send_outbound(&format!("0 : {}", content)) {
            warn!(error = %e, "Chat relay notification failed");
        }
        self.send(OutboundMessage::data(BROADCAST_ADDRESS, content))
    }

    /// Current link state
    pub fn link_state(&self) -> ConnectionState {
        *self.link_state.borrow()
    }

    /// Last sequence number handed out
    pub fn sequence(&self) -> u8 {
        self.transmitter.sequence().current()
    }

    /// Shared registry
    pub fn registry(&self) -> &Arc<NodeRegistry> {
        &self.registry
    }

    /// Nodes heard so far
    pub fn known_nodes(&self) -> Vec<KnownNode> {
        self.registry.known_nodes()
    }

    /// Recent DATA history, oldest first
    pub fn history(&self) -> Vec<HistoryRecord> {
        self.registry.history()
    }

    /// Fresh neighbor reports
    pub fn topology(&self) -> Vec<TopologyEntry> {
        self.registry.topology()
    }

    /// BLE devices seen by `node`
    pub fn ble_sightings(&self, node: u8) -> Vec<BleSighting> {
        self.registry.ble_sightings(node)
    }
}
