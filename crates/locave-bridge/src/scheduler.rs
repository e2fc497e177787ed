//! Periodic activities
//!
//! Three independent loops feed the transmit path: a keepalive HELLO to the
//! broadcast address, a weather broadcast, and forwarding of chat relay
//! messages into the mesh. Each stops at the next boundary once the shared
//! shutdown signal flips.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::bridge::BridgeHandle;
use crate::config::{BROADCAST_ADDRESS, RELAY_ADDRESS};
use crate::relay::ChatRelay;
use crate::transmit::OutboundMessage;
use crate::weather::WeatherSource;

/// Sleep for `duration` unless shutdown comes first
///
/// Returns false when shutdown was signalled.
async fn pause(duration: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        changed = shutdown.changed() => !(changed.is_err() || *shutdown.borrow()),
        _ = tokio::time::sleep(duration) => true,
    }
}

/// Ping the broadcast address every `interval`
pub async fn run_keepalive(
    handle: BridgeHandle,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    info!(?interval, "Starting keepalive");
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            _ = ticker.tick() => {
                if let Err(e) = handle.ping(BROADCAST_ADDRESS) {
                    warn!(error = %e, "Keepalive ping failed");
                }
            }
        }
    }
    debug!("Keepalive stopped");
}

/// Broadcast current weather every `interval`
///
/// A failed fetch is skipped; the next attempt waits the full interval.
pub async fn run_weather(
    handle: BridgeHandle,
    source: Arc<dyn WeatherSource>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    info!(?interval, "Starting weather broadcast");
    loop {
        if *shutdown.borrow() {
            break;
        }

        let fetched = tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
                continue;
            }
            fetched = source.fetch_current() => fetched,
        };

        match fetched {
            Ok(conditions) => {
                debug!(%conditions, "Broadcasting weather");
                if let Err(e) = handle.broadcast(&conditions.to_string()) {
                    warn!(error = %e, "Weather broadcast failed");
                }
            }
            Err(e) => warn!(error = %e, code = e.error_code(), "Weather fetch failed"),
        }

        if !pause(interval, &mut shutdown).await {
            break;
        }
    }
    debug!("Weather broadcast stopped");
}

/// Forward chat relay messages into the mesh
///
/// Messages go to the broadcast address from the relay's virtual source,
/// `spacing` apart. The queue is polled every `poll_interval` while empty.
pub async fn run_relay_forward(
    handle: BridgeHandle,
    relay: Arc<dyn ChatRelay>,
    poll_interval: Duration,
    spacing: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    info!(?poll_interval, "Starting relay forwarding");
    'outer: loop {
        while !relay.is_receive_queue_empty() {
            if *shutdown.borrow() {
                break 'outer;
            }
            let Some(text) = relay.pop_received() else {
                break;
            };
            let message =
                OutboundMessage::data(BROADCAST_ADDRESS, &text).with_source(RELAY_ADDRESS);
            if let Err(e) = handle.send(message) {
                warn!(error = %e, "Relay message not forwarded");
            }
            if !pause(spacing, &mut shutdown).await {
                break 'outer;
            }
        }

        if !pause(poll_interval, &mut shutdown).await {
            break;
        }
    }
    debug!("Relay forwarding stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{BridgeError, Result};
    use crate::header::MessageType;
    use crate::test_utils::{MockController, MockInterface};
    use crate::weather::CurrentConditions;
    use crate::{BridgeConfigBuilder, BridgeService, RelayQueue};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FlakyWeather {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl WeatherSource for FlakyWeather {
        async fn fetch_current(&self) -> Result<CurrentConditions> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call == 0 {
                return Err(BridgeError::WeatherFailed("timeout".to_string()));
            }
            Ok(CurrentConditions {
                time: format!("t{}", call),
                temperature_2m: 8.5,
                wind_speed_10m: 2.0,
            })
        }
    }

    fn base_config(dir: &tempfile::TempDir) -> BridgeConfigBuilder {
        BridgeConfigBuilder::new()
            .sequence_path(dir.path().join(".sequence"))
            .keepalive(false)
            .weather(false)
            .relay(false)
    }

    async fn started(link: &MockController) {
        assert!(link.wait_connected(Duration::from_secs(1)).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_keepalive_every_five_seconds() {
        let dir = tempfile::tempdir().unwrap();
        let interface = MockInterface::new();
        let link = interface.controller();
        let service = BridgeService::start(
            interface,
            base_config(&dir).keepalive(true).build(),
            Arc::new(RelayQueue::new()),
            None,
        )
        .unwrap();
        started(&link).await;

        tokio::time::sleep(Duration::from_millis(12_500)).await;
        let frames = link.written_frames();
        assert_eq!(frames.len(), 3);
        for frame in &frames {
            assert_eq!(frame.header.msg_type, MessageType::Hello);
            assert_eq!(frame.header.dest, BROADCAST_ADDRESS);
        }
        service.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_weather_skips_failed_fetch() {
        let dir = tempfile::tempdir().unwrap();
        let interface = MockInterface::new();
        let link = interface.controller();
        let relay = Arc::new(RelayQueue::new());
        let weather = Arc::new(FlakyWeather {
            calls: AtomicUsize::new(0),
        });
        let service = BridgeService::start(
            interface,
            base_config(&dir).weather(true).build(),
            relay.clone(),
            Some(weather.clone() as Arc<dyn WeatherSource>),
        )
        .unwrap();
        started(&link).await;

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(link.written_frames().is_empty());

        tokio::time::sleep(Duration::from_secs(300)).await;
        let frames = link.written_frames();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].header.msg_type, MessageType::Data);
        assert_eq!(
            frames[0].payload.as_ref(),
            b"{'time': 't1', 'temperature_2m': 8.5, 'wind_speed_10m': 2.0}"
        );
        assert_eq!(relay.drain_outbound().len(), 1);
        assert_eq!(weather.calls.load(Ordering::SeqCst), 2);
        service.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_relay_forwarding() {
        let dir = tempfile::tempdir().unwrap();
        let interface = MockInterface::new();
        let link = interface.controller();
        let relay = Arc::new(RelayQueue::new());
        let service = BridgeService::start(
            interface,
            base_config(&dir).relay(true).build(),
            relay.clone(),
            None,
        )
        .unwrap();
        started(&link).await;

        relay.push_inbound("from chat one");
        relay.push_inbound("from chat two");
        let frames = link.wait_for_frames(2, Duration::from_secs(5)).await;

        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].payload.as_ref(), b"from chat one");
        assert_eq!(frames[1].payload.as_ref(), b"from chat two");
        for frame in &frames {
            assert_eq!(frame.header.source, RELAY_ADDRESS);
            assert_eq!(frame.header.dest, BROADCAST_ADDRESS);
        }
        assert!(relay.is_receive_queue_empty());

        let history = service.handle().history();
        assert_eq!(history.len(), 2);
        assert!(history
            .iter()
            .all(|h| h.direction == crate::registry::Direction::Received));
        service.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_returns_false_on_shutdown() {
        let (tx, mut rx) = watch::channel(false);
        let waiter = tokio::spawn(async move { pause(Duration::from_secs(60), &mut rx).await });
        tx.send(true).unwrap();
        assert!(!waiter.await.unwrap());

        let (_tx, mut rx) = watch::channel(false);
        assert!(pause(Duration::from_millis(10), &mut rx).await);
    }
}
