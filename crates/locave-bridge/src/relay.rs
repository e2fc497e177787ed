//! Chat relay capability
//!
//! The bridge mirrors mesh DATA traffic to an external chat service and
//! forwards chat messages back into the mesh. It only needs three operations
//! from that service, captured by [`ChatRelay`]. How the service authenticates
//! or pairs with a chat is its own business.

use parking_lot::Mutex;
use std::collections::VecDeque;
use tracing::{debug, warn};

use crate::error::{BridgeError, Result};

/// Default bound on undelivered outbound relay messages
pub const DEFAULT_OUTBOUND_CAPACITY: usize = 1024;

/// What the engine needs from a chat relay
pub trait ChatRelay: Send + Sync {
    /// True when no chat message is waiting to go into the mesh
    fn is_receive_queue_empty(&self) -> bool;

    /// Take the oldest chat message waiting to go into the mesh
    fn pop_received(&self) -> Option<String>;

    /// Hand mesh text to the chat service
    fn send_outbound(&self, text: &str) -> Result<()>;
}

/// In-process relay backed by two FIFOs
///
/// The chat client pushes inbound messages with [`RelayQueue::push_inbound`]
/// and collects mesh text with [`RelayQueue::drain_outbound`].
#[derive(Debug)]
pub struct RelayQueue {
    inbound: Mutex<VecDeque<String>>,
    outbound: Mutex<VecDeque<String>>,
    outbound_capacity: usize,
}

impl Default for RelayQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl RelayQueue {
    /// Create an empty relay queue
    pub fn new() -> Self {
        Self::with_outbound_capacity(DEFAULT_OUTBOUND_CAPACITY)
    }

    /// Create with a custom outbound bound
    pub fn with_outbound_capacity(capacity: usize) -> Self {
        Self {
            inbound: Mutex::new(VecDeque::new()),
            outbound: Mutex::new(VecDeque::new()),
            outbound_capacity: capacity.max(1),
        }
    }

    /// Queue a chat message for the mesh
    pub fn push_inbound(&self, text: impl Into<String>) {
        self.inbound.lock().push_back(text.into());
    }

    /// Take every message the bridge handed to the chat side
    pub fn drain_outbound(&self) -> Vec<String> {
        self.outbound.lock().drain(..).collect()
    }

    /// Number of messages waiting on the chat side
    pub fn outbound_len(&self) -> usize {
        self.outbound.lock().len()
    }
}

impl ChatRelay for RelayQueue {
    fn is_receive_queue_empty(&self) -> bool {
        self.inbound.lock().is_empty()
    }

    fn pop_received(&self) -> Option<String> {
        self.inbound.lock().pop_front()
    }

    fn send_outbound(&self, text: &str) -> Result<()> {
        let mut outbound = self.outbound.lock();
        if outbound.len() >= self.outbound_capacity {
            warn!(capacity = self.outbound_capacity, "Relay outbound queue full");
            return Err(BridgeError::RelayFailed(format!(
                "outbound queue full ({} messages)",
                self.outbound_capacity
            )));
        }
        debug!(len = text.len(), "Queued text for chat relay");
        outbound.push_back(text.to_string());
        Ok(())
    }
}
