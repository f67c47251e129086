// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/quakewatch

//! Source manager - runs exactly one telemetry producer at a time

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::{CommandSink, LineSource, SourceMode};
use crate::core::Engine;
use crate::error::Error;

struct Producer {
    name: String,
    shutdown: broadcast::Sender<()>,
    handle: JoinHandle<()>,
}

/// Owns the active producer task.
///
/// Switching sources stops the previous producer and waits for it before the
/// next one starts, so two producers never feed the engine together.
pub struct SourceManager {
    engine: Arc<Engine>,
    active: Mutex<Option<Producer>>,
}

impl SourceManager {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self {
            engine,
            active: Mutex::new(None),
        }
    }

    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    /// Name of the running producer, if any
    pub async fn active_name(&self) -> Option<String> {
        self.active
            .lock()
            .await
            .as_ref()
            .filter(|p| !p.handle.is_finished())
            .map(|p| p.name.clone())
    }

    /// Switch to the synthetic signal model
    pub async fn start_simulation(&self) {
        let mut active = self.active.lock().await;
        Self::stop_producer(active.take()).await;

        self.engine.detach_commands();
        self.engine.set_mode(SourceMode::Simulation);

        let period = Duration::from_millis(self.engine.config().signal.tick_period_ms.max(1));
        let (shutdown, mut shutdown_rx) = broadcast::channel(1);
        let engine = self.engine.clone();

        let handle = tokio::spawn(async move {
            info!("Synthetic source running every {:?}", period);
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match engine.tick(Utc::now()) {
                            Ok(_) => {}
                            Err(Error::SimulationInactive) => {
                                debug!("Synthetic source no longer active");
                                break;
                            }
                            Err(e) => warn!("Tick failed: {}", e),
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        info!("Synthetic source stopping...");
                        break;
                    }
                }
            }
        });

        *active = Some(Producer {
            name: "simulation".to_string(),
            shutdown,
            handle,
        });
    }

    /// Switch to a line-oriented hardware link
    pub async fn start_source<S>(&self, mut source: S, commands: Option<Arc<dyn CommandSink>>)
    where
        S: LineSource + 'static,
    {
        let mut active = self.active.lock().await;
        Self::stop_producer(active.take()).await;

        self.engine.set_mode(SourceMode::Hardware);
        match commands {
            Some(sink) => self.engine.attach_commands(sink),
            None => self.engine.detach_commands(),
        }

        let name = source.name().to_string();
        self.engine.connection_changed(&name, true, Utc::now());

        let (shutdown, mut shutdown_rx) = broadcast::channel(1);
        let engine = self.engine.clone();
        let service = name.clone();

        let handle = tokio::spawn(async move {
            info!("Reading hardware link {}", service);
            loop {
                tokio::select! {
                    line = source.next_line() => match line {
                        Some(Ok(text)) => {
                            engine.ingest_line(&text, Utc::now());
                        }
                        Some(Err(e)) => {
                            engine.ingest_fault(&format!("{}: {}", service, e), Utc::now());
                        }
                        None => {
                            info!("Hardware link {} closed", service);
                            engine.detach_commands();
                            engine.connection_changed(&service, false, Utc::now());
                            break;
                        }
                    },
                    _ = shutdown_rx.recv() => {
                        info!("Hardware link {} stopping...", service);
                        break;
                    }
                }
            }
        });

        *active = Some(Producer { name, shutdown, handle });
    }

    /// Stop whatever is running
    pub async fn stop(&self) {
        let producer = self.active.lock().await.take();
        Self::stop_producer(producer).await;
    }

    async fn stop_producer(producer: Option<Producer>) {
        if let Some(producer) = producer {
            let _ = producer.shutdown.send(());
            if let Err(e) = producer.handle.await {
                warn!("Producer {} ended abnormally: {}", producer.name, e);
            }
            debug!("Producer {} stopped", producer.name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::core::{AlarmStatus, Event};
    use crate::sensors::{ChannelCommandSink, ReaderSource};
    use std::io::Cursor;

    fn engine(mode: SourceMode, tick_ms: u64) -> Arc<Engine> {
        let mut config = Config::default();
        config.source.mode = mode;
        config.signal.tick_period_ms = tick_ms;
        config.signal.seed = Some(11);
        Arc::new(Engine::new(config))
    }

    async fn wait_for_disconnect(sub: &mut crate::core::Subscription) {
        loop {
            let envelope = tokio::time::timeout(std::time::Duration::from_secs(2), sub.recv())
                .await
                .expect("no disconnect event")
                .expect("subscription open");
            if let Event::ConnectionStatus { connected: false, .. } = envelope.event.as_ref() {
                return;
            }
        }
    }

    #[tokio::test]
    async fn test_line_source_feeds_engine_until_closed() {
        let engine = engine(SourceMode::Simulation, 1000);
        let manager = SourceManager::new(engine.clone());
        let mut sub = engine.subscribe();

        let script = "MPU6050 Found!\n\
                      Acceleration X: 0.01\nAcceleration Y: 0.02\nAcceleration Z: 9.81\n---\n\
                      Acceleration X: 0.02\nAcceleration Y: 0.01\nAcceleration Z: 9.80\n---\n";
        let source = ReaderSource::new("fixture", Cursor::new(script.as_bytes().to_vec()));
        manager.start_source(source, None).await;

        wait_for_disconnect(&mut sub).await;

        assert_eq!(engine.mode(), SourceMode::Hardware);
        assert_eq!(engine.latest_samples(10).len(), 2);
        assert_eq!(engine.stats().lines, 9);
    }

    #[tokio::test]
    async fn test_closed_link_detaches_commands() {
        let engine = engine(SourceMode::Hardware, 1000);
        let manager = SourceManager::new(engine.clone());
        let mut sub = engine.subscribe();

        let (sink, _rx) = ChannelCommandSink::channel(4);
        let source = ReaderSource::new("fixture", Cursor::new(b"Alarm ON\n".to_vec()));
        manager.start_source(source, Some(Arc::new(sink))).await;
        wait_for_disconnect(&mut sub).await;

        // The device's last word on the alarm stands
        assert_eq!(engine.alarm_snapshot().status, AlarmStatus::On);
        assert!(!engine.has_commands());
        assert!(engine.manual_alarm(AlarmStatus::Off, Utc::now()).is_err());
    }

    #[tokio::test]
    async fn test_unreadable_line_becomes_fault_event() {
        let engine = engine(SourceMode::Hardware, 1000);
        let manager = SourceManager::new(engine.clone());
        let mut sub = engine.subscribe();

        let script = b"Alarm ON\n\xff\xfe\nMPU6050 Found!\n".to_vec();
        manager.start_source(ReaderSource::new("fixture", Cursor::new(script)), None).await;

        let mut received = Vec::new();
        loop {
            let envelope = tokio::time::timeout(std::time::Duration::from_secs(2), sub.recv())
                .await
                .expect("no disconnect event")
                .expect("subscription open");
            let closed = matches!(envelope.event.as_ref(), Event::ConnectionStatus { connected: false, .. });
            received.push(envelope);
            if closed {
                break;
            }
        }

        let faults: Vec<&str> = received
            .iter()
            .filter_map(|e| match e.event.as_ref() {
                Event::Fault { message, .. } => Some(message.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(faults.len(), 1);
        assert!(faults[0].starts_with("fixture:"));

        // The fault neither counts as a line nor touches the alarm
        assert_eq!(engine.stats().lines, 2);
        assert_eq!(engine.alarm_snapshot().status, AlarmStatus::On);
        assert!(engine.log_tail(10).iter().any(|e| e.event.kind() == "fault"));
    }

    #[tokio::test]
    async fn test_simulation_ticks_and_stops() {
        let engine = engine(SourceMode::Hardware, 5);
        let manager = SourceManager::new(engine.clone());

        manager.start_simulation().await;
        assert_eq!(engine.mode(), SourceMode::Simulation);
        assert_eq!(manager.active_name().await.as_deref(), Some("simulation"));

        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        manager.stop().await;

        let produced = engine.latest_samples(1000).len();
        assert!(produced > 0);
        tokio::time::sleep(std::time::Duration::from_millis(30)).await;
        assert_eq!(engine.latest_samples(1000).len(), produced);
        assert!(manager.active_name().await.is_none());
    }

    #[tokio::test]
    async fn test_switching_source_stops_previous_producer() {
        let engine = engine(SourceMode::Simulation, 5);
        let manager = SourceManager::new(engine.clone());
        manager.start_simulation().await;
        tokio::time::sleep(std::time::Duration::from_millis(30)).await;

        let (reader, _writer) = tokio::io::duplex(64);
        let source = ReaderSource::new("idle-link", tokio::io::BufReader::new(reader));
        manager.start_source(source, None).await;

        let before = engine.latest_samples(1000).len();
        tokio::time::sleep(std::time::Duration::from_millis(30)).await;
        assert_eq!(engine.latest_samples(1000).len(), before);
        assert_eq!(manager.active_name().await.as_deref(), Some("idle-link"));
        assert!(matches!(engine.simulate_event(Utc::now()), Err(Error::SimulationInactive)));

        manager.stop().await;
    }
}
