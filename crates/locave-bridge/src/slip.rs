//! SLIP framing for the bridge UART
//!
//! Frames are delimited by END bytes; END and ESC inside a frame are escaped.
//! The encoder emits an END before and after every frame so a receiver that
//! joined mid-stream flushes its garbage before the real frame starts. The
//! decoder is incremental and consumes the stream one byte at a time.

use bytes::{Bytes, BytesMut};
use tracing::{trace, warn};

use crate::config::{HEADER_LEN, MAX_PAYLOAD_LEN};

/// Frame delimiter
pub const END: u8 = 0xC0;
/// Escape byte
pub const ESC: u8 = 0xDB;
/// Escaped END
pub const ESC_END: u8 = 0xDC;
/// Escaped ESC
pub const ESC_ESC: u8 = 0xDD;

/// Largest decoded frame the decoder will accumulate
pub const MAX_FRAME_LEN: usize = HEADER_LEN + MAX_PAYLOAD_LEN;

/// Escape `payload` and wrap it in END delimiters
pub fn encode(payload: &[u8]) -> Bytes {
    let mut out = BytesMut::with_capacity(payload.len() + 2);
    out.extend_from_slice(&[END]);
    for &b in payload {
        match b {
            END => out.extend_from_slice(&[ESC, ESC_END]),
            ESC => out.extend_from_slice(&[ESC, ESC_ESC]),
            _ => out.extend_from_slice(&[b]),
        }
    }
    out.extend_from_slice(&[END]);
    out.freeze()
}

/// Incremental SLIP decoder
#[derive(Debug)]
pub struct SlipDecoder {
    buf: BytesMut,
    esc: bool,
    /// Current frame is corrupt and is skipped up to the next END
    discard: bool,
    max_len: usize,
}

impl Default for SlipDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl SlipDecoder {
    /// Create a decoder bounded to [`MAX_FRAME_LEN`]
    pub fn new() -> Self {
        Self::with_max_len(MAX_FRAME_LEN)
    }

    /// Create a decoder with a custom frame bound
    pub fn with_max_len(max_len: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(max_len),
            esc: false,
            discard: false,
            max_len,
        }
    }

    /// Number of bytes in the pending frame
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    /// Drop any partially received frame
    pub fn reset(&mut self) {
        self.buf.clear();
        self.esc = false;
        self.discard = false;
    }

    /// Consume one byte, returning a frame when it completes one
    ///
    /// Empty frames (back-to-back END bytes) are swallowed.
    pub fn push(&mut self, byte: u8) -> Option<Bytes> {
        if byte == END {
            let discarded = std::mem::replace(&mut self.discard, false);
            self.esc = false;
            if discarded {
                trace!(pending = self.buf.len(), "Dropping corrupt SLIP frame");
                self.buf.clear();
                return None;
            }
            if self.buf.is_empty() {
                return None;
            }
            return Some(self.buf.split().freeze());
        }

        if self.discard {
            return None;
        }

        let decoded = if self.esc {
            self.esc = false;
            match byte {
                ESC_END => END,
                ESC_ESC => ESC,
                other => {
                    warn!(byte = other, "Invalid SLIP escape, discarding frame");
                    self.poison();
                    return None;
                }
            }
        } else if byte == ESC {
            self.esc = true;
            return None;
        } else {
            byte
        };

        if self.buf.len() >= self.max_len {
            warn!(max = self.max_len, "SLIP frame exceeds maximum length, discarding");
            self.poison();
            return None;
        }
        self.buf.extend_from_slice(&[decoded]);
        None
    }

    /// Consume a chunk of bytes, returning every frame it completes
    pub fn feed(&mut self, data: &[u8]) -> Vec<Bytes> {
        data.iter().filter_map(|&b| self.push(b)).collect()
    }

    fn poison(&mut self) {
        self.buf.clear();
        self.discard = true;
    }
}
