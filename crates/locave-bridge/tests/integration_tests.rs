//! Integration tests for the LoCave bridge
//!
//! These tests drive a complete [`BridgeService`] through a mock UART link:
//! - Inbound frame handling and BASE_CONFIRM replies
//! - Registry state built from a realistic mix of traffic
//! - Chat relay in both directions
//! - Link loss and recovery
//! - Sequence persistence across restarts

use bytes::Bytes;
use locave_bridge::test_utils::inbound_frame;
use locave_bridge::{
    BridgeConfig, BridgeConfigBuilder, BridgeService, ChatRelay, ConnectionState, Direction,
    MessageType, MockController, MockInterface, RelayQueue, BROADCAST_ADDRESS, RELAY_ADDRESS,
};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// Helpers
// ============================================================================

fn quiet_config(sequence: &Path) -> BridgeConfig {
    BridgeConfigBuilder::new()
        .sequence_path(sequence)
        .keepalive(false)
        .weather(false)
        .relay(false)
        .build()
}

async fn start(config: BridgeConfig) -> (BridgeService, MockController, Arc<RelayQueue>) {
    let interface = MockInterface::new();
    let link = interface.controller();
    let relay = Arc::new(RelayQueue::new());
    let service = BridgeService::start(interface, config, relay.clone(), None).unwrap();
    assert!(link.wait_connected(Duration::from_secs(1)).await);
    (service, link, relay)
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(300)).await;
}

// ============================================================================
// Integration Tests: Receive Path
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_data_message_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let (service, link, relay) = start(quiet_config(&dir.path().join(".sequence"))).await;

    link.push_frame(&inbound_frame(21, 140, MessageType::Data, b"water level rising"));
    let frames = link.wait_for_frames(1, Duration::from_secs(2)).await;

    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].header.msg_type, MessageType::BaseConfirm);
    assert_eq!(frames[0].header.dest, 21);
    assert_eq!(frames[0].header.link_sender, 0);
    assert_eq!(frames[0].payload.as_ref(), b"140");

    assert_eq!(relay.drain_outbound(), vec!["21: water level rising"]);

    let history = service.handle().history();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].direction, Direction::Received);
    assert_eq!(history[0].content, "water level rising");

    service.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_mixed_traffic_builds_registry() {
    let dir = tempfile::tempdir().unwrap();
    let (service, link, _relay) = start(quiet_config(&dir.path().join(".sequence"))).await;

    // Several frames in one read, plus line noise in between
    let mut burst = Vec::new();
    burst.extend_from_slice(&locave_bridge::slip::encode(&inbound_frame(
        2,
        1,
        MessageType::Status,
        b"3:0:-48,bad-entry,4:2:-91;6.5,97",
    )));
    burst.extend_from_slice(&[0x13, 0x37]);
    burst.extend_from_slice(&locave_bridge::slip::encode(&inbound_frame(
        3,
        9,
        MessageType::BleScanResult,
        &[0xBE, 0xEF, 0x00, 0x01, 0x7F],
    )));
    burst.extend_from_slice(&locave_bridge::slip::encode(&inbound_frame(
        4,
        2,
        MessageType::PingResponse,
        b"",
    )));
    link.push_bytes(Bytes::from(burst));
    settle().await;

    let handle = service.handle();
    let nodes = handle.known_nodes();
    assert_eq!(
        nodes.iter().map(|n| n.address).collect::<Vec<_>>(),
        vec![2, 3, 4]
    );

    let topology = handle.topology();
    assert_eq!(topology.len(), 1);
    assert_eq!(topology[0].address, 2);
    assert_eq!(topology[0].neighbors.len(), 2);
    assert_eq!(topology[0].neighbors[1].interface, "RF");
    assert_eq!(
        topology[0].weather,
        Some(vec!["6.5".to_string(), "97".to_string()])
    );

    let ids: Vec<u16> = handle.ble_sightings(3).iter().map(|s| s.id).collect();
    assert_eq!(ids, vec![0x0001, 0xBEEF]);
    assert!(handle.ble_sightings(99).is_empty());

    // Nothing in this burst asks for a reply
    assert!(link.written_frames().is_empty());
    service.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_history_is_bounded() {
    let dir = tempfile::tempdir().unwrap();
    let (service, link, _relay) = start(quiet_config(&dir.path().join(".sequence"))).await;

    for i in 0..201u32 {
        link.push_frame(&inbound_frame(5, i as u8, MessageType::Data, format!("m{}", i).as_bytes()));
    }
    link.wait_for_frames(201, Duration::from_secs(10)).await;

    let history = service.handle().history();
    assert_eq!(history.len(), 200);
    assert_eq!(history[0].content, "m1");
    assert_eq!(history[199].content, "m200");
    service.shutdown().await;
}

// ============================================================================
// Integration Tests: Chat Relay
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_relay_both_directions() {
    let dir = tempfile::tempdir().unwrap();
    let config = BridgeConfigBuilder::new()
        .sequence_path(dir.path().join(".sequence"))
        .keepalive(false)
        .weather(false)
        .build();
    let (service, link, relay) = start(config).await;

    relay.push_inbound("surface team: all clear");
    let frames = link.wait_for_frames(1, Duration::from_secs(3)).await;
    assert_eq!(frames[0].header.source, RELAY_ADDRESS);
    assert_eq!(frames[0].header.dest, BROADCAST_ADDRESS);
    assert_eq!(frames[0].payload.as_ref(), b"surface team: all clear");
    assert!(relay.is_receive_queue_empty());

    service.handle().broadcast("base online").unwrap();
    link.push_frame(&inbound_frame(8, 3, MessageType::Data, b"ack from 8"));
    link.wait_for_frames(3, Duration::from_secs(3)).await;

    assert_eq!(relay.drain_outbound(), vec!["0 : base online", "8: ack from 8"]);

    let directions: Vec<Direction> = service
        .handle()
        .history()
        .iter()
        .map(|h| h.direction)
        .collect();
    assert_eq!(
        directions,
        vec![Direction::Received, Direction::Sent, Direction::Received]
    );
    service.shutdown().await;
}

// ============================================================================
// Integration Tests: Link Recovery
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_link_loss_and_recovery() {
    let dir = tempfile::tempdir().unwrap();
    let (service, link, _relay) = start(quiet_config(&dir.path().join(".sequence"))).await;
    let handle = service.handle().clone();

    link.fail_next_connects(3);
    link.fail_next_read();
    settle().await;
    assert_eq!(handle.link_state(), ConnectionState::Reconnecting);

    // Sends while the link is down are queued, not lost
    handle.ping(6).unwrap();

    assert!(link.wait_connected(Duration::from_secs(30)).await);
    assert_eq!(handle.link_state(), ConnectionState::Connected);
    assert_eq!(link.connect_attempts().len(), 5);

    let frames = link.wait_for_frames(1, Duration::from_secs(1)).await;
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].header.msg_type, MessageType::Hello);
    assert_eq!(frames[0].header.dest, 6);

    // And inbound traffic is processed again
    link.push_frame(&inbound_frame(6, 1, MessageType::PingResponse, b""));
    settle().await;
    assert_eq!(handle.known_nodes().len(), 1);

    service.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_partial_frame_dropped_on_link_loss() {
    let dir = tempfile::tempdir().unwrap();
    let (service, link, _relay) = start(quiet_config(&dir.path().join(".sequence"))).await;

    let wire = locave_bridge::slip::encode(&inbound_frame(4, 1, MessageType::Hello, b""));
    link.push_bytes(Bytes::copy_from_slice(&wire[..6]));
    settle().await;
    link.fail_next_read();
    assert!(link.wait_connected(Duration::from_secs(5)).await);
    settle().await;

    // Tail of the old frame alone must not produce a node
    link.push_bytes(Bytes::copy_from_slice(&wire[6..]));
    settle().await;
    assert!(service.handle().known_nodes().is_empty());

    service.shutdown().await;
}

// ============================================================================
// Integration Tests: Sequence Persistence
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_sequence_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(".sequence");
    std::fs::write(&path, "253").unwrap();

    let (service, link, _relay) = start(quiet_config(&path)).await;
    service.handle().ping(1).unwrap();
    service.handle().ping(2).unwrap();
    service.handle().ping(3).unwrap();
    let frames = link.wait_for_frames(3, Duration::from_secs(1)).await;
    let seqs: Vec<u8> = frames.iter().map(|f| f.header.seq).collect();
    assert_eq!(seqs, vec![254, 255, 0]);
    service.shutdown().await;

    assert_eq!(std::fs::read_to_string(&path).unwrap(), "0");

    let (service, link, _relay) = start(quiet_config(&path)).await;
    service.handle().ping(1).unwrap();
    let frames = link.wait_for_frames(1, Duration::from_secs(1)).await;
    assert_eq!(frames[0].header.seq, 1);
    service.shutdown().await;
}
