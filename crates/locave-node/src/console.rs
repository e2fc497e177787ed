//! Operator console
//!
//! Line-oriented commands read from stdin while the bridge runs. Queries print
//! JSON so the output can be piped into other tools.

use anyhow::{bail, Context};
use serde::Serialize;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use locave_bridge::{BridgeHandle, RelayQueue, VERSION};

const HELP: &str = "\
commands:
  ping <node>        send HELLO to a node (255 = everyone)
  broadcast <text>   broadcast DATA to all nodes
  nodes              known nodes with last-seen age
  messages           message history
  topology           neighbor reports from the last 10 minutes
  ble <node>         BLE devices seen by a node
  relay <text>       inject a chat relay message
  outbox             drain text queued for the chat relay
  status             link and engine status
  exit               stop the bridge";

/// A parsed console command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// HELLO to a node
    Ping(u8),
    /// DATA to every node
    Broadcast(String),
    /// List known nodes
    Nodes,
    /// List history
    Messages,
    /// List topology
    Topology,
    /// List BLE sightings of a node
    Ble(u8),
    /// Inject an inbound chat relay message
    Relay(String),
    /// Drain outbound chat relay text
    Outbox,
    /// Engine status
    Status,
    /// Command list
    Help,
    /// Stop
    Exit,
}

fn parse_node(arg: &str) -> anyhow::Result<u8> {
    arg.parse::<u8>()
        .with_context(|| format!("node must be 0-255, got '{}'", arg))
}

impl FromStr for Command {
    type Err = anyhow::Error;

    fn from_str(line: &str) -> anyhow::Result<Self> {
        let line = line.trim();
        let (word, rest) = match line.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, rest.trim()),
            None => (line, ""),
        };

        let command = match word.to_ascii_lowercase().as_str() {
            "ping" => Command::Ping(parse_node(rest)?),
            "ble" => Command::Ble(parse_node(rest)?),
            "broadcast" if !rest.is_empty() => Command::Broadcast(rest.to_string()),
            "relay" if !rest.is_empty() => Command::Relay(rest.to_string()),
            "broadcast" | "relay" => bail!("{} needs some text", word),
            "nodes" => Command::Nodes,
            "messages" => Command::Messages,
            "topology" => Command::Topology,
            "outbox" => Command::Outbox,
            "status" => Command::Status,
            "help" | "?" => Command::Help,
            "exit" | "quit" => Command::Exit,
            other => bail!("unknown command '{}', try 'help'", other),
        };
        Ok(command)
    }
}

/// Result of one console command
#[derive(Debug, PartialEq, Eq)]
pub enum Outcome {
    /// Print this and keep going
    Continue(String),
    /// Stop the bridge
    Exit,
}

#[derive(Debug, Serialize)]
struct BridgeStatus {
    version: &'static str,
    link_state: String,
    sequence: u8,
    known_nodes: usize,
    history_len: usize,
    relay_outbox: usize,
    uptime_seconds: u64,
}

/// Executes console commands against a running bridge
pub struct Console {
    handle: BridgeHandle,
    relay: Arc<RelayQueue>,
    started: Instant,
}

impl Console {
    /// Create a console for `handle`
    pub fn new(handle: BridgeHandle, relay: Arc<RelayQueue>) -> Self {
        Self {
            handle,
            relay,
            started: Instant::now(),
        }
    }

    /// Run one command
    pub fn execute(&self, command: Command) -> anyhow::Result<Outcome> {
        let output = match command {
            Command::Ping(node) => {
                self.handle.ping(node)?;
                format!("ping queued for node {}", node)
            }
            Command::Broadcast(text) => {
                self.handle.broadcast(&text)?;
                "broadcast queued".to_string()
            }
            Command::Nodes => serde_json::to_string_pretty(&self.handle.known_nodes())?,
            Command::Messages => serde_json::to_string_pretty(&self.handle.history())?,
            Command::Topology => serde_json::to_string_pretty(&self.handle.topology())?,
            Command::Ble(node) => serde_json::to_string_pretty(&self.handle.ble_sightings(node))?,
            Command::Relay(text) => {
                self.relay.push_inbound(text);
                "queued for the mesh".to_string()
            }
            Command::Outbox => serde_json::to_string_pretty(&self.relay.drain_outbound())?,
            Command::Status => serde_json::to_string_pretty(&self.status())?,
            Command::Help => HELP.to_string(),
            Command::Exit => return Ok(Outcome::Exit),
        };
        Ok(Outcome::Continue(output))
    }

    fn status(&self) -> BridgeStatus {
        let registry = self.handle.registry();
        BridgeStatus {
            version: VERSION,
            link_state: self.handle.link_state().to_string(),
            sequence: self.handle.sequence(),
            known_nodes: registry.known_nodes().len(),
            history_len: registry.history_len(),
            relay_outbox: self.relay.outbound_len(),
            uptime_seconds: self.started.elapsed().as_secs(),
        }
    }

    /// Read commands until `exit` or end of input
    pub async fn run(self, mut lines: mpsc::UnboundedReceiver<String>) {
        println!("{}", HELP);
        while let Some(line) = lines.recv().await {
            if line.trim().is_empty() {
                continue;
            }
            debug!(line = %line, "Console command");
            let outcome = line.parse::<Command>().and_then(|command| self.execute(command));
            match outcome {
                Ok(Outcome::Continue(output)) => println!("{}", output),
                Ok(Outcome::Exit) => break,
                Err(e) => {
                    warn!(error = %e, "Console command failed");
                    println!("error: {:#}", e);
                }
            }
        }
    }
}

/// Forward stdin lines from a dedicated thread
///
/// Blocking stdin reads cannot be cancelled, so they stay off the runtime;
/// the thread simply dies with the process.
pub fn stdin_lines() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        for line in std::io::stdin().lines() {
            match line {
                Ok(line) => {
                    if tx.send(line).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!(error = %e, "Stdin read failed");
                    break;
                }
            }
        }
    });
    rx
}

#[cfg(test)]
mod tests {
    use super::*;
    use locave_bridge::{
        BridgeConfigBuilder, BridgeService, ChatRelay, MessageType, MockInterface,
        BROADCAST_ADDRESS,
    };
    use std::time::Duration;

    #[test]
    fn test_parse_commands() {
        assert_eq!("ping 12".parse::<Command>().unwrap(), Command::Ping(12));
        assert_eq!("PING 255".parse::<Command>().unwrap(), Command::Ping(255));
        assert_eq!(
            "broadcast  hello cave  ".parse::<Command>().unwrap(),
            Command::Broadcast("hello cave".to_string())
        );
        assert_eq!("ble 4".parse::<Command>().unwrap(), Command::Ble(4));
        assert_eq!("nodes".parse::<Command>().unwrap(), Command::Nodes);
        assert_eq!("messages".parse::<Command>().unwrap(), Command::Messages);
        assert_eq!("topology".parse::<Command>().unwrap(), Command::Topology);
        assert_eq!("outbox".parse::<Command>().unwrap(), Command::Outbox);
        assert_eq!("status".parse::<Command>().unwrap(), Command::Status);
        assert_eq!("quit".parse::<Command>().unwrap(), Command::Exit);
    }

    #[test]
    fn test_parse_errors() {
        assert!("ping".parse::<Command>().is_err());
        assert!("ping 256".parse::<Command>().is_err());
        assert!("ble x".parse::<Command>().is_err());
        assert!("broadcast".parse::<Command>().is_err());
        assert!("relay   ".parse::<Command>().is_err());
        assert!("dance".parse::<Command>().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_execute_against_bridge() {
        let dir = tempfile::tempdir().unwrap();
        let interface = MockInterface::new();
        let link = interface.controller();
        let relay = Arc::new(RelayQueue::new());
        let config = BridgeConfigBuilder::new()
            .sequence_path(dir.path().join(".sequence"))
            .keepalive(false)
            .relay(false)
            .build();
        let service = BridgeService::start(interface, config, relay.clone(), None).unwrap();
        assert!(link.wait_connected(Duration::from_secs(1)).await);

        let console = Console::new(service.handle().clone(), relay.clone());

        console.execute(Command::Broadcast("hi".to_string())).unwrap();
        let frames = link.wait_for_frames(1, Duration::from_secs(1)).await;
        assert_eq!(frames[0].header.dest, BROADCAST_ADDRESS);
        assert_eq!(frames[0].header.msg_type, MessageType::Data);

        let Outcome::Continue(outbox) = console.execute(Command::Outbox).unwrap() else {
            panic!("outbox should not exit");
        };
        let outbox: Vec<String> = serde_json::from_str(&outbox).unwrap();
        assert_eq!(outbox, vec!["0 : hi"]);

        let Outcome::Continue(history) = console.execute(Command::Messages).unwrap() else {
            panic!("messages should not exit");
        };
        let history: serde_json::Value = serde_json::from_str(&history).unwrap();
        assert_eq!(history[0]["type"], "sent");
        assert_eq!(history[0]["content"], "hi");

        let Outcome::Continue(status) = console.execute(Command::Status).unwrap() else {
            panic!("status should not exit");
        };
        let status: serde_json::Value = serde_json::from_str(&status).unwrap();
        assert_eq!(status["link_state"], "connected");
        assert_eq!(status["sequence"], 1);

        console.execute(Command::Relay("from chat".to_string())).unwrap();
        assert!(!relay.is_receive_queue_empty());

        assert_eq!(console.execute(Command::Exit).unwrap(), Outcome::Exit);
        service.shutdown().await;
    }
}
