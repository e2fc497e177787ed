//! Node registry
//!
//! In-memory view of the mesh as seen from the bridge: when each node was last
//! heard and with which TTL, the latest neighbor/weather report per node, BLE
//! sightings per node, and a bounded history of DATA messages.
//!
//! All tables sit behind a single mutex. The receive pipeline writes, the
//! query surface reads, and no lock is held across I/O. Records are never
//! removed; staleness is computed when a query runs.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::time::Duration;
use tracing::trace;

use crate::config::RegistryConfig;
use crate::payload::{Neighbor, StatusReport};

/// Direction of a history entry relative to the bridge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Originated by the bridge
    Sent,
    /// Heard from the mesh or injected by the chat relay
    Received,
}

/// One DATA message kept in history
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    /// When the entry was recorded
    pub timestamp: DateTime<Utc>,
    /// Source address
    pub source: u8,
    /// Destination address
    pub dest: u8,
    /// Sent or received
    pub direction: Direction,
    /// Message text
    pub content: String,
}

impl HistoryEntry {
    /// Entry stamped with the current time
    pub fn now(source: u8, dest: u8, direction: Direction, content: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            source,
            dest,
            direction,
            content: content.into(),
        }
    }
}

/// History entry annotated with its age
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryRecord {
    /// When the entry was recorded
    pub timestamp: DateTime<Utc>,
    /// Whole seconds since `timestamp`
    pub seconds_ago: i64,
    /// Source address
    pub source: u8,
    /// Destination address
    pub dest: u8,
    /// Sent or received
    #[serde(rename = "type")]
    pub direction: Direction,
    /// Message text
    pub content: String,
}

/// A node the bridge has heard from
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KnownNode {
    /// Node address
    pub address: u8,
    /// Time of the last message of any type
    pub last_seen: DateTime<Utc>,
    /// Whole seconds since `last_seen`
    pub seconds_ago: i64,
    /// TTL carried by that message
    pub ttl: u8,
}

/// Latest neighbor report of a node
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TopologyEntry {
    /// Node address
    pub address: u8,
    /// Time of the last STATUS message
    pub timestamp: DateTime<Utc>,
    /// Whole seconds since `timestamp`
    pub seconds_ago: i64,
    /// Neighbors in report order
    pub neighbors: Vec<Neighbor>,
    /// Raw weather values, if the node ever reported any
    pub weather: Option<Vec<String>>,
}

/// A BLE device seen by a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BleSighting {
    /// Device ID
    pub id: u16,
    /// Whole seconds since the device was last reported
    #[serde(rename = "timestamp")]
    pub seconds_ago: i64,
}

#[derive(Debug, Clone, Copy)]
struct Presence {
    last_seen: DateTime<Utc>,
    ttl: u8,
}

#[derive(Debug, Clone)]
struct StatusSnapshot {
    received_at: DateTime<Utc>,
    neighbors: Vec<Neighbor>,
    weather: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default)]
struct NodeRecord {
    presence: Option<Presence>,
    status: Option<StatusSnapshot>,
    ble_sightings: BTreeMap<u16, DateTime<Utc>>,
}

#[derive(Debug, Default)]
struct Tables {
    nodes: BTreeMap<u8, NodeRecord>,
    history: VecDeque<HistoryEntry>,
}

/// Thread-safe node registry
#[derive(Debug)]
pub struct NodeRegistry {
    tables: Mutex<Tables>,
    history_capacity: usize,
    topology_window: Duration,
}

impl Default for NodeRegistry {
    fn default() -> Self {
        Self::new(&RegistryConfig::default())
    }
}

fn seconds_between(earlier: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    now.signed_duration_since(earlier).num_seconds()
}

impl NodeRegistry {
    /// Create an empty registry
    pub fn new(config: &RegistryConfig) -> Self {
        Self {
            tables: Mutex::new(Tables::default()),
            history_capacity: config.history_capacity.max(1),
            topology_window: config.topology_window,
        }
    }

    // ===== Writes (receive pipeline / transmit path) =====

    /// Record that `node` was heard with `ttl`
    pub fn record_seen(&self, node: u8, ttl: u8) {
        self.record_seen_at(node, ttl, Utc::now());
    }

    /// Record that `node` was heard with `ttl` at `now`
    pub fn record_seen_at(&self, node: u8, ttl: u8, now: DateTime<Utc>) {
        let mut tables = self.tables.lock();
        tables.nodes.entry(node).or_default().presence = Some(Presence {
            last_seen: now,
            ttl,
        });
    }

    /// Store a STATUS report from `node`
    pub fn record_status(&self, node: u8, report: StatusReport) {
        self.record_status_at(node, report, Utc::now());
    }

    /// Store a STATUS report from `node` received at `now`
    ///
    /// Neighbors are replaced; weather is only replaced when the report
    /// carries some.
    pub fn record_status_at(&self, node: u8, report: StatusReport, now: DateTime<Utc>) {
        let mut tables = self.tables.lock();
        let record = tables.nodes.entry(node).or_default();
        let weather = match (report.weather, record.status.take()) {
            (Some(weather), _) => Some(weather),
            (None, Some(previous)) => previous.weather,
            (None, None) => None,
        };
        record.status = Some(StatusSnapshot {
            received_at: now,
            neighbors: report.neighbors,
            weather,
        });
    }

    /// Mark BLE devices as seen by `node`
    pub fn record_ble_sightings(&self, node: u8, ids: &[u16]) {
        self.record_ble_sightings_at(node, ids, Utc::now());
    }

    /// Mark BLE devices as seen by `node` at `now`
    pub fn record_ble_sightings_at(&self, node: u8, ids: &[u16], now: DateTime<Utc>) {
        let mut tables = self.tables.lock();
        let sightings = &mut tables.nodes.entry(node).or_default().ble_sightings;
        for &id in ids {
            sightings.insert(id, now);
        }
    }

    /// Append to history, evicting the oldest entry when full
    pub fn push_history(&self, entry: HistoryEntry) {
        let mut tables = self.tables.lock();
        tables.history.push_back(entry);
        while tables.history.len() > self.history_capacity {
            if let Some(evicted) = tables.history.pop_front() {
                trace!(source = evicted.source, "History full, evicted oldest entry");
            }
        }
    }

    // ===== Queries =====

    /// Nodes heard so far, ordered by address
    pub fn known_nodes(&self) -> Vec<KnownNode> {
        self.known_nodes_at(Utc::now())
    }

    /// Nodes heard so far, aged relative to `now`
    pub fn known_nodes_at(&self, now: DateTime<Utc>) -> Vec<KnownNode> {
        let tables = self.tables.lock();
        tables
            .nodes
            .iter()
            .filter_map(|(&address, record)| {
                record.presence.map(|presence| KnownNode {
                    address,
                    last_seen: presence.last_seen,
                    seconds_ago: seconds_between(presence.last_seen, now),
                    ttl: presence.ttl,
                })
            })
            .collect()
    }

    /// Neighbor reports received within the topology window
    pub fn topology(&self) -> Vec<TopologyEntry> {
        self.topology_at(Utc::now())
    }

    /// Neighbor reports received within the topology window before `now`
    pub fn topology_at(&self, now: DateTime<Utc>) -> Vec<TopologyEntry> {
        let window_ms = i64::try_from(self.topology_window.as_millis()).unwrap_or(i64::MAX);
        let tables = self.tables.lock();
        tables
            .nodes
            .iter()
            .filter_map(|(&address, record)| {
                let status = record.status.as_ref()?;
                let age = now.signed_duration_since(status.received_at);
                if age.num_milliseconds() >= window_ms {
                    return None;
                }
                Some(TopologyEntry {
                    address,
                    timestamp: status.received_at,
                    seconds_ago: age.num_seconds(),
                    neighbors: status.neighbors.clone(),
                    weather: status.weather.clone(),
                })
            })
            .collect()
    }

    /// BLE devices seen by `node`, ordered by device ID
    ///
    /// Querying a node that was never heard creates an empty record for it.
    pub fn ble_sightings(&self, node: u8) -> Vec<BleSighting> {
        self.ble_sightings_at(node, Utc::now())
    }

    /// BLE devices seen by `node`, aged relative to `now`
    pub fn ble_sightings_at(&self, node: u8, now: DateTime<Utc>) -> Vec<BleSighting> {
        let mut tables = self.tables.lock();
        tables
            .nodes
            .entry(node)
            .or_default()
            .ble_sightings
            .iter()
            .map(|(&id, &seen)| BleSighting {
                id,
                seconds_ago: seconds_between(seen, now),
            })
            .collect()
    }

    /// History, oldest first
    pub fn history(&self) -> Vec<HistoryRecord> {
        self.history_at(Utc::now())
    }

    /// History, oldest first, aged relative to `now`
    pub fn history_at(&self, now: DateTime<Utc>) -> Vec<HistoryRecord> {
        let tables = self.tables.lock();
        tables
            .history
            .iter()
            .map(|entry| HistoryRecord {
                timestamp: entry.timestamp,
                seconds_ago: seconds_between(entry.timestamp, now),
                source: entry.source,
                dest: entry.dest,
                direction: entry.direction,
                content: entry.content.clone(),
            })
            .collect()
    }

    /// Number of node records, including empty ones created by queries
    pub fn node_count(&self) -> usize {
        self.tables.lock().nodes.len()
    }

    /// Number of history entries
    pub fn history_len(&self) -> usize {
        self.tables.lock().history.len()
    }
}
