// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/quakewatch

//! Pipeline engine - the one context object every component is handed

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tracing::{debug, info, warn};

use super::event::{AlarmStatus, Envelope, Event, SeismicActivity};
use super::event_bus::{EventHub, HubStats, SubscriberId, Subscription};
use super::history::HistoryBuffer;
use crate::config::Config;
use crate::detection::{AlarmEngine, AlarmSnapshot, AlarmUpdate, IntensityEstimator};
use crate::error::{Error, Result};
use crate::sensors::{classify, AccumulatingSample, Command, CommandSink, Sample, SignalModel, SourceMode};

/// Writer-side state; every mutation goes through this one lock
struct PipelineState {
    mode: SourceMode,
    latch: AccumulatingSample,
    alarm: AlarmEngine,
    estimator: IntensityEstimator,
    model: SignalModel,
    last_stamp: Option<DateTime<Utc>>,
    lines: u64,
    samples: u64,
    rejected_samples: u64,
}

impl PipelineState {
    /// Clamp `now` so stamps never run backwards
    fn stamp(&mut self, now: DateTime<Utc>) -> DateTime<Utc> {
        let stamp = match self.last_stamp {
            Some(last) if now < last => last,
            _ => now,
        };
        self.last_stamp = Some(stamp);
        stamp
    }
}

/// Pipeline counters
#[derive(Debug, Clone, Copy, Serialize)]
pub struct EngineStats {
    pub mode: SourceMode,
    pub lines: u64,
    pub samples: u64,
    pub rejected_samples: u64,
    pub hub: HubStats,
}

/// Telemetry pipeline.
///
/// Owns the history buffers, the alarm engine, the signal model and the hub.
/// Built once at startup and shared behind an `Arc`; queries read snapshots
/// and never wait on the writer for longer than a buffer copy.
pub struct Engine {
    config: Arc<Config>,
    hub: EventHub,
    log: Arc<HistoryBuffer<Envelope>>,
    samples: Arc<HistoryBuffer<Sample>>,
    activities: Arc<HistoryBuffer<SeismicActivity>>,
    state: Mutex<PipelineState>,
    alarm_view: RwLock<AlarmSnapshot>,
    commands: RwLock<Option<Arc<dyn CommandSink>>>,
}

impl Engine {
    pub fn new(config: Config) -> Self {
        let config = Arc::new(config);
        let history = &config.history;

        let log = Arc::new(HistoryBuffer::new(history.log_capacity));
        let samples = Arc::new(HistoryBuffer::new(history.sample_capacity));
        let activities = Arc::new(HistoryBuffer::new(history.activity_capacity));
        let hub = EventHub::new(&config.hub, log.clone());

        let alarm = AlarmEngine::new(config.alarm.clone());
        let alarm_view = RwLock::new(alarm.snapshot());

        let state = PipelineState {
            mode: config.source.mode,
            latch: AccumulatingSample::new(),
            alarm,
            estimator: IntensityEstimator::from_config(&config.alarm),
            model: SignalModel::new(config.signal.clone()),
            last_stamp: None,
            lines: 0,
            samples: 0,
            rejected_samples: 0,
        };

        info!(
            "Engine ready: log {} / samples {} / replay {}",
            history.log_capacity, history.sample_capacity, config.hub.replay_len
        );

        Self {
            config,
            hub,
            log,
            samples,
            activities,
            state: Mutex::new(state),
            alarm_view,
            commands: RwLock::new(None),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn mode(&self) -> SourceMode {
        self.state.lock().mode
    }

    /// Switch between synthetic and hardware input.
    ///
    /// Stopping the previous producer is the caller's job (see
    /// `SourceManager`). The latch and the hardware baseline start over;
    /// alarm state and history carry across.
    pub fn set_mode(&self, mode: SourceMode) {
        let mut state = self.state.lock();
        if state.mode != mode {
            info!("Source mode {:?} -> {:?}", state.mode, mode);
            state.mode = mode;
            state.latch = AccumulatingSample::new();
            state.estimator.reset();
        }
    }

    pub fn attach_commands(&self, sink: Arc<dyn CommandSink>) {
        *self.commands.write() = Some(sink);
    }

    pub fn detach_commands(&self) {
        *self.commands.write() = None;
    }

    pub fn has_commands(&self) -> bool {
        self.commands.read().is_some()
    }

    /// Ingest one line from the hardware link
    pub fn ingest_line(&self, text: &str, now: DateTime<Utc>) -> Vec<Envelope> {
        let mut state = self.state.lock();
        let now = state.stamp(now);
        state.lines += 1;

        let mut published = vec![self.hub.publish(Event::raw_line(now, text))];
        let events = classify(text, now, &mut state.latch);

        for event in events {
            match event {
                Event::Sample(sample) => {
                    let intensity = if sample.is_complete() {
                        state.samples += 1;
                        self.samples.append(sample.clone());
                        state.estimator.estimate(&sample)
                    } else {
                        state.rejected_samples += 1;
                        debug!("Incomplete sample kept out of history");
                        None
                    };

                    published.push(self.hub.publish(Event::Sample(sample)));
                    if let Some(intensity) = intensity {
                        let update = state.alarm.update(intensity, now);
                        self.publish_alarm_update(update, &mut published);
                    }
                }
                Event::AlarmTransition(reported) => {
                    // The device is authoritative for its own alarm
                    let transition =
                        state
                            .alarm
                            .force(reported.state, reported.cause, reported.source.clone(), now);
                    published.push(self.hub.publish(Event::AlarmTransition(transition)));
                }
                other => published.push(self.hub.publish(other)),
            }
        }

        *self.alarm_view.write() = state.alarm.snapshot();
        published
    }

    /// Record a transport failure; nothing else changes
    pub fn ingest_fault(&self, message: &str, now: DateTime<Utc>) -> Envelope {
        let mut state = self.state.lock();
        let now = state.stamp(now);
        warn!("Source fault: {}", message);
        self.hub.publish(Event::fault(now, message))
    }

    /// Record a transport connect/disconnect
    pub fn connection_changed(&self, service: &str, connected: bool, now: DateTime<Utc>) -> Envelope {
        let mut state = self.state.lock();
        let now = state.stamp(now);
        info!("{} {}", service, if connected { "connected" } else { "disconnected" });
        self.hub.publish(Event::connection(now, service, connected))
    }

    /// Advance the synthetic source by one tick
    pub fn tick(&self, now: DateTime<Utc>) -> Result<Vec<Envelope>> {
        let mut state = self.state.lock();
        if state.mode != SourceMode::Simulation {
            return Err(Error::SimulationInactive);
        }
        let now = state.stamp(now);

        let tick = state.model.tick(now);
        state.samples += 1;
        self.samples.append(tick.sample.clone());

        let mut published = vec![self.hub.publish(Event::Sample(tick.sample))];
        let update = state.alarm.update(tick.intensity, now);
        self.publish_alarm_update(update, &mut published);

        *self.alarm_view.write() = state.alarm.snapshot();
        Ok(published)
    }

    /// Inject a strong synthetic event right away
    pub fn simulate_event(&self, now: DateTime<Utc>) -> Result<Vec<Envelope>> {
        let mut state = self.state.lock();
        if state.mode != SourceMode::Simulation {
            return Err(Error::SimulationInactive);
        }
        let now = state.stamp(now);

        let intensity = state.model.trigger_event();
        let mut published = Vec::new();
        let update = state.alarm.update(intensity, now);
        self.publish_alarm_update(update, &mut published);

        *self.alarm_view.write() = state.alarm.snapshot();
        Ok(published)
    }

    /// Operator alarm request.
    ///
    /// In hardware mode the request is also forwarded to the device, and is
    /// rejected when no transport is attached. A sink that refuses the
    /// command produces a `Fault` event rather than an error.
    pub fn manual_alarm(&self, status: AlarmStatus, now: DateTime<Utc>) -> Result<Vec<Envelope>> {
        let mut state = self.state.lock();
        let sink = match state.mode {
            SourceMode::Simulation => None,
            SourceMode::Hardware => match self.commands.read().clone() {
                Some(sink) => Some(sink),
                None => {
                    return Err(Error::InvalidCommand(format!(
                        "alarm {} requested with no transport attached",
                        status.label()
                    )))
                }
            },
        };
        let now = state.stamp(now);

        let transition = state.alarm.manual_set(status, now);
        let mut published = vec![self.hub.publish(Event::AlarmTransition(transition))];

        if let Some(sink) = sink {
            if let Err(e) = sink.submit(Command::manual_alarm(status)) {
                warn!("Command delivery failed: {}", e);
                published.push(self.hub.publish(Event::fault(now, &e.to_string())));
            }
        }

        *self.alarm_view.write() = state.alarm.snapshot();
        Ok(published)
    }

    pub fn reset_peak(&self) {
        let mut state = self.state.lock();
        state.alarm.reset_peak();
        *self.alarm_view.write() = state.alarm.snapshot();
    }

    /// Current `{status, intensity, peak}` without touching the writer lock
    pub fn alarm_snapshot(&self) -> AlarmSnapshot {
        *self.alarm_view.read()
    }

    pub fn subscribe(&self) -> Subscription {
        self.hub.subscribe()
    }

    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        self.hub.unsubscribe(id)
    }

    pub fn hub(&self) -> &EventHub {
        &self.hub
    }

    /// Samples inside the viewing window ending at `now`
    pub fn sample_window(&self, window: Duration, now: DateTime<Utc>) -> Vec<Sample> {
        self.samples.window(window, now)
    }

    pub fn latest_samples(&self, n: usize) -> Vec<Sample> {
        self.samples.latest(n)
    }

    pub fn latest_sample(&self) -> Option<Sample> {
        self.samples.newest()
    }

    pub fn log_tail(&self, n: usize) -> Vec<Envelope> {
        self.log.latest(n)
    }

    /// Finished seismic events, oldest first
    pub fn activities(&self) -> Vec<SeismicActivity> {
        self.activities.snapshot()
    }

    pub fn sample_history(&self) -> &Arc<HistoryBuffer<Sample>> {
        &self.samples
    }

    pub fn stats(&self) -> EngineStats {
        let state = self.state.lock();
        EngineStats {
            mode: state.mode,
            lines: state.lines,
            samples: state.samples,
            rejected_samples: state.rejected_samples,
            hub: self.hub.stats(),
        }
    }

    fn publish_alarm_update(&self, update: AlarmUpdate, published: &mut Vec<Envelope>) {
        if let Some(transition) = update.transition {
            published.push(self.hub.publish(Event::AlarmTransition(transition)));
        }
        if let Some(activity) = update.ended {
            self.activities.append(activity.clone());
            published.push(self.hub.publish(Event::ActivityEnded(activity)));
        }
    }
}
