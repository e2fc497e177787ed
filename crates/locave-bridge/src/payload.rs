//! Application payload parsing
//!
//! STATUS payloads are text: `neighbors[;weather]` where `neighbors` is a
//! comma-separated list of `node:interface:rssi` triples and `weather` is a
//! comma-separated list of raw values reported by the node's sensors.
//! BLE_SCAN_RESULT payloads are packed big-endian 16-bit device IDs.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{BridgeError, Result};

/// Radio interface a neighbor was heard on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InterfaceKind {
    /// In-cave link
    Cave,
    /// Cave exit link
    Exit,
    /// Long range RF
    Rf,
    /// All interfaces
    All,
    /// Code this bridge does not know
    Unknown(u8),
}

impl From<u8> for InterfaceKind {
    fn from(code: u8) -> Self {
        match code {
            0 => Self::Cave,
            1 => Self::Exit,
            2 => Self::Rf,
            3 => Self::All,
            other => Self::Unknown(other),
        }
    }
}

impl std::fmt::Display for InterfaceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InterfaceKind::Cave => write!(f, "CAVE"),
            InterfaceKind::Exit => write!(f, "EXIT"),
            InterfaceKind::Rf => write!(f, "RF"),
            InterfaceKind::All => write!(f, "ALL"),
            InterfaceKind::Unknown(code) => write!(f, "UNKNOWN_{}", code),
        }
    }
}

/// One neighbor entry of a STATUS report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Neighbor {
    /// Neighbor node address
    pub node_id: u8,
    /// Interface name (`CAVE`, `EXIT`, `RF`, `ALL`, `UNKNOWN_<code>`)
    pub interface: String,
    /// Received signal strength
    pub rssi: i32,
}

/// Parsed STATUS payload
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusReport {
    /// Valid neighbor entries, in payload order
    pub neighbors: Vec<Neighbor>,
    /// Raw weather values, when the node reported any
    pub weather: Option<Vec<String>>,
}

/// Parse a single `node:interface:rssi` triple
pub fn parse_neighbor(entry: &str) -> Result<Neighbor> {
    let invalid = |reason: String| BridgeError::InvalidStatusEntry {
        entry: entry.to_string(),
        reason,
    };

    let parts: Vec<&str> = entry.split(':').collect();
    let [node_id, interface, rssi] = parts.as_slice() else {
        return Err(invalid(format!("expected 3 fields, got {}", parts.len())));
    };

    let node_id = node_id
        .trim()
        .parse::<u8>()
        .map_err(|e| invalid(format!("node id: {}", e)))?;
    let interface = interface
        .trim()
        .parse::<u8>()
        .map_err(|e| invalid(format!("interface: {}", e)))?;
    let rssi = rssi
        .trim()
        .parse::<i32>()
        .map_err(|e| invalid(format!("rssi: {}", e)))?;

    Ok(Neighbor {
        node_id,
        interface: InterfaceKind::from(interface).to_string(),
        rssi,
    })
}

/// Parse a STATUS payload
///
/// Malformed neighbor entries are logged and skipped; the rest of the record
/// is still used.
pub fn parse_status(payload: &[u8]) -> StatusReport {
    let text = String::from_utf8_lossy(payload);
    let mut sections = text.trim().split(';');

    let neighbor_section = sections.next().unwrap_or_default();
    let weather = sections
        .next()
        .map(|raw| raw.split(',').map(str::to_string).collect());

    let mut neighbors = Vec::new();
    for entry in neighbor_section.split(',') {
        if entry.is_empty() {
            continue;
        }
        match parse_neighbor(entry) {
            Ok(neighbor) => neighbors.push(neighbor),
            Err(e) => warn!(error = %e, "Skipping neighbor entry"),
        }
    }

    StatusReport { neighbors, weather }
}

/// Parse a BLE_SCAN_RESULT payload into device IDs
///
/// A trailing odd byte is ignored.
pub fn parse_ble_ids(payload: &[u8]) -> Vec<u16> {
    payload
        .chunks_exact(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
        .collect()
}

/// Text with every character outside printable ASCII removed
pub fn printable(payload: &[u8]) -> String {
    String::from_utf8_lossy(payload)
        .chars()
        .filter(|c| (' '..='~').contains(c))
        .collect()
}
