//! Test utilities for driving the bridge without hardware
//!
//! [`MockInterface`] is an in-memory [`LinkInterface`]. Once it has been moved
//! into the engine, the test keeps a [`MockController`] to inject inbound
//! bytes, simulate link failures and inspect what the bridge wrote.
//!
//! # Example
//!
//! ```rust,ignore
//! let interface = MockInterface::new();
//! let link = interface.controller();
//! let service = BridgeService::start(interface, config, relay, None)?;
//!
//! link.push_frame(&inbound_frame(3, 0, MessageType::Data, b"hello"));
//! let frames = link.wait_for_frames(1, Duration::from_secs(1)).await;
//! assert_eq!(frames[0].header.msg_type, MessageType::BaseConfirm);
//! ```

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::debug;

use crate::config::DEFAULT_TTL;
use crate::error::{BridgeError, Result};
use crate::header::{self, Frame, MessageType, ProtocolHeader};
use crate::interface::LinkInterface;
use crate::slip::{self, SlipDecoder};

/// Something the mock link will hand to the next read
#[derive(Debug)]
enum Incoming {
    Data(Bytes),
    Fail,
}

#[derive(Debug, Default)]
struct MockState {
    connected: bool,
    incoming: VecDeque<Incoming>,
    written: Vec<Bytes>,
    connect_attempts: Vec<Instant>,
    fail_connects: usize,
    fail_writes: usize,
    disconnects: usize,
}

/// In-memory link interface
#[derive(Debug)]
pub struct MockInterface {
    state: Arc<Mutex<MockState>>,
    notify: Arc<Notify>,
    read_timeout: Duration,
}

impl Default for MockInterface {
    fn default() -> Self {
        Self::new()
    }
}

impl MockInterface {
    /// Create a new mock interface
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState::default())),
            notify: Arc::new(Notify::new()),
            read_timeout: Duration::from_millis(50),
        }
    }

    /// How long a read waits for data before returning `None`
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Handle for driving this interface from a test
    pub fn controller(&self) -> MockController {
        MockController {
            state: self.state.clone(),
            notify: self.notify.clone(),
        }
    }
}

#[async_trait]
impl LinkInterface for MockInterface {
    async fn connect(&mut self) -> Result<()> {
        let mut state = self.state.lock();
        state.connect_attempts.push(Instant::now());
        if state.fail_connects > 0 {
            state.fail_connects -= 1;
            return Err(BridgeError::PortOpenFailed {
                port: "mock".to_string(),
                reason: "simulated open failure".to_string(),
            });
        }
        state.connected = true;
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        let mut state = self.state.lock();
        state.connected = false;
        state.disconnects += 1;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.state.lock().connected
    }

    async fn read_bytes(&mut self) -> Result<Option<Bytes>> {
        let deadline = Instant::now() + self.read_timeout;
        loop {
            {
                let mut state = self.state.lock();
                if !state.connected {
                    return Err(BridgeError::Disconnected);
                }
                match state.incoming.pop_front() {
                    Some(Incoming::Data(data)) => return Ok(Some(data)),
                    Some(Incoming::Fail) => {
                        state.connected = false;
                        return Err(BridgeError::ReadError("simulated read failure".to_string()));
                    }
                    None => {}
                }
            }

            if tokio::time::timeout_at(deadline, self.notify.notified())
                .await
                .is_err()
            {
                return Ok(None);
            }
        }
    }

    async fn write_bytes(&mut self, data: &[u8]) -> Result<()> {
        let mut state = self.state.lock();
        if !state.connected {
            return Err(BridgeError::Disconnected);
        }
        if state.fail_writes > 0 {
            state.fail_writes -= 1;
            state.connected = false;
            return Err(BridgeError::WriteError("simulated write failure".to_string()));
        }
        state.written.push(Bytes::copy_from_slice(data));
        Ok(())
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// Shared handle onto a [`MockInterface`]
#[derive(Debug, Clone)]
pub struct MockController {
    state: Arc<Mutex<MockState>>,
    notify: Arc<Notify>,
}

impl MockController {
    /// Queue raw bytes for the next read
    pub fn push_bytes(&self, data: impl Into<Bytes>) {
        self.state.lock().incoming.push_back(Incoming::Data(data.into()));
        self.notify.notify_one();
    }

    /// Queue an unframed protocol frame, SLIP-encoding it first
    pub fn push_frame(&self, frame: &[u8]) {
        self.push_bytes(slip::encode(frame));
    }

    /// Make the next read fail and drop the link
    pub fn fail_next_read(&self) {
        self.state.lock().incoming.push_back(Incoming::Fail);
        self.notify.notify_one();
    }

    /// Make the next write fail and drop the link
    pub fn fail_next_write(&self) {
        self.state.lock().fail_writes += 1;
    }

    /// Make the next `n` connect attempts fail
    pub fn fail_next_connects(&self, n: usize) {
        self.state.lock().fail_connects = n;
    }

    /// Whether the link is currently open
    pub fn is_connected(&self) -> bool {
        self.state.lock().connected
    }

    /// Number of times the engine closed the link
    pub fn disconnects(&self) -> usize {
        self.state.lock().disconnects
    }

    /// Times at which the engine tried to open the link
    pub fn connect_attempts(&self) -> Vec<Instant> {
        self.state.lock().connect_attempts.clone()
    }

    /// Raw byte chunks written by the engine
    pub fn written(&self) -> Vec<Bytes> {
        self.state.lock().written.clone()
    }

    /// Forget everything written so far
    pub fn clear_written(&self) {
        self.state.lock().written.clear();
    }

    /// Written bytes decoded back into protocol frames
    pub fn written_frames(&self) -> Vec<Frame> {
        let mut decoder = SlipDecoder::new();
        let chunks = self.written();
        chunks
            .iter()
            .flat_map(|chunk| decoder.feed(chunk))
            .filter_map(|raw| match header::decode(&raw) {
                Ok(frame) => Some(frame),
                Err(e) => {
                    debug!(error = %e, "Mock link saw undecodable frame");
                    None
                }
            })
            .collect()
    }

    /// Poll until at least `count` frames were written or `timeout` passes
    pub async fn wait_for_frames(&self, count: usize, timeout: Duration) -> Vec<Frame> {
        let deadline = Instant::now() + timeout;
        loop {
            let frames = self.written_frames();
            if frames.len() >= count || Instant::now() >= deadline {
                return frames;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    /// Poll until the link is open or `timeout` passes
    pub async fn wait_connected(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while !self.is_connected() {
            if Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        true
    }
}

/// Build an inbound frame as a directly attached node would send it
///
/// The frame is not SLIP-encoded; pass it to [`MockController::push_frame`].
pub fn inbound_frame(source: u8, seq: u8, msg_type: MessageType, payload: &[u8]) -> Bytes {
    let mut header = ProtocolHeader::outbound(source, 0, DEFAULT_TTL, seq, msg_type);
    header.link_sender = source;
    // Payloads built by tests always fit
    header::encode(&header, payload).unwrap_or_default()
}
