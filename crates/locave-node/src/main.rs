//! LoCave Node - UART bridge daemon for the cave mesh
//!
//! This binary runs the bridge engine against a serial port with:
//! - Automatic reconnect when the adapter drops off
//! - Keepalive pings and chat relay forwarding
//! - An interactive operator console (disable with `--service`)
//! - Clean shutdown on ctrl-c or SIGTERM
//!
//! The daemon has no weather source, so weather broadcasts only run when the
//! bridge library is embedded with a `WeatherSource` implementation.

mod console;

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use locave_bridge::{BridgeConfig, BridgeService, RelayQueue};

use console::Console;

#[derive(Parser)]
#[command(name = "locave-node")]
#[command(about = "UART bridge between the LoCave mesh and the surface")]
#[command(
    long_about = "UART bridge between the LoCave mesh and the surface.\n\n\
                  Weather broadcasts are not available from this binary; they need a \
                  weather source supplied by an application embedding locave-bridge."
)]
struct Args {
    /// Serial port of the attached mesh node
    #[arg(long, short)]
    port: Option<PathBuf>,

    /// Serial baud rate
    #[arg(long, short)]
    baud: Option<u32>,

    /// File holding the persisted sequence number
    #[arg(long)]
    sequence_file: Option<PathBuf>,

    /// JSON configuration file; command-line flags take precedence
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Run without the interactive console
    #[arg(long)]
    service: bool,

    /// Enable verbose logging
    #[arg(long, short)]
    verbose: bool,
}

fn load_config(args: &Args) -> anyhow::Result<BridgeConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading config {}", path.display()))?;
            serde_json::from_str::<BridgeConfig>(&text)
                .with_context(|| format!("parsing config {}", path.display()))?
        }
        None => BridgeConfig::default(),
    };

    if let Some(port) = &args.port {
        config.link.port = port.clone();
    }
    if let Some(baud) = args.baud {
        config.link.baud_rate = baud;
    }
    if let Some(path) = &args.sequence_file {
        config.sequence_path = path.clone();
    }

    config.validate()?;
    Ok(config)
}

/// Process signals that stop the bridge
struct ShutdownSignal {
    #[cfg(unix)]
    terminate: tokio::signal::unix::Signal,
}

impl ShutdownSignal {
    /// Register handlers; call before anything can send a signal
    fn install() -> anyhow::Result<Self> {
        Ok(Self {
            #[cfg(unix)]
            terminate: tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .context("installing SIGTERM handler")?,
        })
    }

    /// Wait for the next stop request and name it
    #[cfg(unix)]
    async fn recv(&mut self) -> anyhow::Result<&'static str> {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal?;
                Ok("SIGINT")
            }
            _ = self.terminate.recv() => Ok("SIGTERM"),
        }
    }

    /// Wait for the next stop request and name it
    #[cfg(not(unix))]
    async fn recv(&mut self) -> anyhow::Result<&'static str> {
        tokio::signal::ctrl_c().await?;
        Ok("ctrl-c")
    }
}

#[cfg(feature = "serial")]
fn start_bridge(config: BridgeConfig, relay: Arc<RelayQueue>) -> anyhow::Result<BridgeService> {
    let interface = locave_bridge::SerialInterface::from_config(&config.link);
    Ok(BridgeService::start(interface, config, relay, None)?)
}

#[cfg(not(feature = "serial"))]
fn start_bridge(_config: BridgeConfig, _relay: Arc<RelayQueue>) -> anyhow::Result<BridgeService> {
    anyhow::bail!("built without the `serial` feature, no link available")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = load_config(&args)?;
    info!(
        port = %config.link.port.display(),
        baud = config.link.baud_rate,
        sequence_file = %config.sequence_path.display(),
        "Starting LoCave bridge v{}",
        locave_bridge::VERSION
    );

    let mut signals = ShutdownSignal::install()?;
    let relay = Arc::new(RelayQueue::new());
    let service = start_bridge(config, relay.clone())?;
    info!("Weather broadcast off: no weather source in this binary");

    if args.service {
        let signal = signals.recv().await?;
        info!(signal, "Stop requested");
    } else {
        let console = Console::new(service.handle().clone(), relay);
        tokio::select! {
            _ = console.run(console::stdin_lines()) => {}
            signal = signals.recv() => {
                let signal = signal?;
                info!(signal, "Stop requested");
            }
        }
    }

    service.shutdown().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_flags_override_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bridge.json");
        std::fs::write(
            &path,
            r#"{ "link": { "port": "/dev/ttyS3", "baud_rate": 9600 },
                 "schedule": { "keepalive_interval": "30s" } }"#,
        )
        .unwrap();

        let args = Args::parse_from([
            "locave-node",
            "--config",
            path.to_str().unwrap(),
            "--port",
            "/dev/ttyUSB1",
            "--sequence-file",
            "/tmp/seq",
        ]);
        let config = load_config(&args).unwrap();
        assert_eq!(config.link.port, PathBuf::from("/dev/ttyUSB1"));
        assert_eq!(config.link.baud_rate, 9600);
        assert_eq!(config.sequence_path, PathBuf::from("/tmp/seq"));
        assert_eq!(config.schedule.keepalive_interval, Duration::from_secs(30));
    }

    #[test]
    fn test_defaults_without_config() {
        let args = Args::parse_from(["locave-node", "--service", "-b", "57600"]);
        assert!(args.service);
        let config = load_config(&args).unwrap();
        assert_eq!(config.link.baud_rate, 57600);
        assert_eq!(config.sequence_path, PathBuf::from(".sequence"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_sigterm_requests_stop() {
        let mut signals = ShutdownSignal::install().unwrap();
        let status = std::process::Command::new("kill")
            .args(["-TERM", &std::process::id().to_string()])
            .status()
            .unwrap();
        assert!(status.success());

        let signal = tokio::time::timeout(Duration::from_secs(5), signals.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(signal, "SIGTERM");
    }

    #[test]
    fn test_help_explains_missing_weather() {
        use clap::CommandFactory;
        let help = Args::command().render_long_help().to_string();
        assert!(help.contains("Weather broadcasts are not available"));
    }

    #[test]
    fn test_bad_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bridge.json");
        std::fs::write(&path, "{ not json").unwrap();
        let args = Args::parse_from(["locave-node", "-c", path.to_str().unwrap()]);
        assert!(load_config(&args).is_err());
    }
}
