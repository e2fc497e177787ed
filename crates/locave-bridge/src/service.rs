//! Bridge service
//!
//! Wires the engine together once: sequence store, registry, transmitter,
//! receive pipeline, link manager and the schedulers, all sharing one
//! shutdown signal. The returned [`BridgeService`] owns the tasks; its
//! [`BridgeHandle`] is what the outside world uses.

use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::bridge::{BridgeHandle, LinkManager};
use crate::config::BridgeConfig;
use crate::error::Result;
use crate::interface::LinkInterface;
use crate::pipeline::ReceivePipeline;
use crate::registry::NodeRegistry;
use crate::relay::ChatRelay;
use crate::scheduler;
use crate::sequence::SequenceStore;
use crate::transmit::Transmitter;
use crate::weather::WeatherSource;

/// Running bridge engine
pub struct BridgeService {
    handle: BridgeHandle,
    shutdown_tx: watch::Sender<bool>,
    tasks: Vec<(&'static str, JoinHandle<()>)>,
}

impl std::fmt::Debug for BridgeService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeService")
            .field("handle", &self.handle)
            .field(
                "tasks",
                &self.tasks.iter().map(|(name, _)| *name).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl BridgeService {
    /// Build the engine and spawn its tasks
    ///
    /// Must be called from within a Tokio runtime. The weather scheduler only
    /// runs when a `weather` source is supplied.
    pub fn start<I>(
        interface: I,
        config: BridgeConfig,
        relay: Arc<dyn ChatRelay>,
        weather: Option<Arc<dyn WeatherSource>>,
    ) -> Result<Self>
    where
        I: LinkInterface + 'static,
    {
        config.validate()?;

        let sequence = Arc::new(SequenceStore::load(&config.sequence_path));
        let registry = Arc::new(NodeRegistry::new(&config.registry));
        let transmitter = Arc::new(Transmitter::new(
            sequence.clone(),
            registry.clone(),
            config.transmit.default_ttl,
        ));
        let pipeline = ReceivePipeline::new(registry.clone(), relay.clone());

        let (manager, handle) = LinkManager::new(
            interface,
            pipeline,
            transmitter,
            registry,
            relay.clone(),
            config.transmit.queue_size,
            config.link.reconnect_interval,
        );

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut tasks = vec![("link", tokio::spawn(manager.run(shutdown_rx.clone())))];

        let schedule = &config.schedule;
        if schedule.keepalive_enabled {
            tasks.push((
                "keepalive",
                tokio::spawn(scheduler::run_keepalive(
                    handle.clone(),
                    schedule.keepalive_interval,
                    shutdown_rx.clone(),
                )),
            ));
        }
        match weather {
            Some(source) if schedule.weather_enabled => {
                tasks.push((
                    "weather",
                    tokio::spawn(scheduler::run_weather(
                        handle.clone(),
                        source,
                        schedule.weather_interval,
                        shutdown_rx.clone(),
                    )),
                ));
            }
            _ => {}
        }
        if schedule.relay_enabled {
            tasks.push((
                "relay",
                tokio::spawn(scheduler::run_relay_forward(
                    handle.clone(),
                    relay,
                    schedule.relay_poll_interval,
                    schedule.relay_spacing,
                    shutdown_rx,
                )),
            ));
        }

        info!(
            sequence = sequence.current(),
            tasks = tasks.len(),
            "Bridge service started"
        );

        Ok(Self {
            handle,
            shutdown_tx,
            tasks,
        })
    }

    /// Handle for sending and queries
    pub fn handle(&self) -> &BridgeHandle {
        &self.handle
    }

    /// Signal every task to stop and wait for them
    ///
    /// Pending reads and weather fetches are abandoned; a link write already
    /// in progress finishes first.
    pub async fn shutdown(self) {
        info!("Shutting down bridge service");
        self.shutdown_tx.send_replace(true);
        for (name, task) in self.tasks {
            if let Err(e) = task.await {
                warn!(task = name, error = %e, "Task ended abnormally");
            }
        }
        info!("Bridge service stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BridgeConfigBuilder;
    use crate::error::BridgeError;
    use crate::relay::RelayQueue;
    use crate::test_utils::MockInterface;
    use std::time::Duration;

    #[tokio::test]
    async fn test_rejects_invalid_config() {
        let config = BridgeConfigBuilder::new()
            .reconnect_interval(Duration::ZERO)
            .build();
        let err = BridgeService::start(MockInterface::new(), config, Arc::new(RelayQueue::new()), None)
            .unwrap_err();
        assert!(matches!(err, BridgeError::InvalidConfig(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_and_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".sequence");
        std::fs::write(&path, "17").unwrap();

        let interface = MockInterface::new();
        let link = interface.controller();
        let config = BridgeConfigBuilder::new().sequence_path(&path).build();
        let service =
            BridgeService::start(interface, config, Arc::new(RelayQueue::new()), None).unwrap();

        // link, keepalive, relay; no weather source
        assert_eq!(service.tasks.len(), 3);
        assert_eq!(service.handle().sequence(), 17);
        assert!(link.wait_connected(Duration::from_secs(1)).await);

        let handle = service.handle().clone();
        service.shutdown().await;
        assert!(!link.is_connected());
        assert!(handle.ping(1).is_err());
    }
}
