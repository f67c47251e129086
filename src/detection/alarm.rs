// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/quakewatch

//! Seismic alarm state machine
//!
//! ```text
//!              i >= T_on                     i < T_on
//!   ┌──────┐ ───────────► ┌──────────┐ ─────────────────► ┌─────────┐
//!   │ Idle │              │ Alarming │                    │ Latched │
//!   └──────┘ ◄─────────── └──────────┘ ◄───────────────── └─────────┘
//!      ▲      i < floor                     i >= T_on          │
//!      └───────────────────────────────────────────────────────┘
//!                       i < T_clear  (latch released)
//! ```
//!
//! `LatchedAlarming` is only reachable through a manual or external override
//! while latched: the alarm is on, but threshold logic will not switch it
//! off again until the latch releases.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::AlarmConfig;
use crate::core::{AlarmCause, AlarmStatus, AlarmTransition, SeismicActivity};

/// Hysteresis state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlarmState {
    /// Off, no latch
    Idle,
    /// On, no latch
    Alarming,
    /// Off after intensity fell under the trigger during a decaying event
    Latched,
    /// On by override while latched
    LatchedAlarming,
}

impl AlarmState {
    pub fn status(&self) -> AlarmStatus {
        match self {
            AlarmState::Idle | AlarmState::Latched => AlarmStatus::Off,
            AlarmState::Alarming | AlarmState::LatchedAlarming => AlarmStatus::On,
        }
    }

    pub fn is_latched(&self) -> bool {
        matches!(self, AlarmState::Latched | AlarmState::LatchedAlarming)
    }

    fn forced(self, status: AlarmStatus) -> Self {
        match (status, self.is_latched()) {
            (AlarmStatus::On, false) => AlarmState::Alarming,
            (AlarmStatus::On, true) => AlarmState::LatchedAlarming,
            (AlarmStatus::Off, false) => AlarmState::Idle,
            (AlarmStatus::Off, true) => AlarmState::Latched,
        }
    }
}

/// Read-only view handed to dashboards and exporters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AlarmSnapshot {
    pub status: AlarmStatus,
    pub state: AlarmState,
    pub intensity: f64,
    pub peak: f64,
    pub latched: bool,
}

/// Result of feeding one intensity value
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AlarmUpdate {
    pub transition: Option<AlarmTransition>,
    pub ended: Option<SeismicActivity>,
}

#[derive(Debug, Clone, Copy)]
struct Activity {
    started: DateTime<Utc>,
    peak: f64,
    alarm_triggered: bool,
}

/// Alarm hysteresis engine
pub struct AlarmEngine {
    config: AlarmConfig,
    state: AlarmState,
    intensity: f64,
    peak: f64,
    activity: Option<Activity>,
}

impl AlarmEngine {
    pub fn new(config: AlarmConfig) -> Self {
        Self {
            config,
            state: AlarmState::Idle,
            intensity: 0.0,
            peak: 0.0,
            activity: None,
        }
    }

    pub fn state(&self) -> AlarmState {
        self.state
    }

    pub fn status(&self) -> AlarmStatus {
        self.state.status()
    }

    pub fn peak(&self) -> f64 {
        self.peak
    }

    pub fn snapshot(&self) -> AlarmSnapshot {
        AlarmSnapshot {
            status: self.state.status(),
            state: self.state,
            intensity: self.intensity,
            peak: self.peak,
            latched: self.state.is_latched(),
        }
    }

    /// Feed the current seismic intensity
    pub fn update(&mut self, intensity: f64, now: DateTime<Utc>) -> AlarmUpdate {
        let intensity = if intensity.is_finite() { intensity.max(0.0) } else { 0.0 };
        self.intensity = intensity;
        self.peak = self.peak.max(intensity);

        if intensity < self.config.end_floor {
            return self.end_activity(now);
        }

        let activity = self.activity.get_or_insert(Activity {
            started: now,
            peak: intensity,
            alarm_triggered: false,
        });
        activity.peak = activity.peak.max(intensity);

        let next = if intensity >= self.config.trigger_threshold {
            AlarmState::Alarming
        } else if intensity < self.config.clear_threshold {
            match self.state {
                AlarmState::Alarming => AlarmState::Latched,
                AlarmState::Latched => AlarmState::Idle,
                AlarmState::LatchedAlarming => AlarmState::Alarming,
                AlarmState::Idle => AlarmState::Idle,
            }
        } else {
            match self.state {
                AlarmState::Alarming => AlarmState::Latched,
                other => other,
            }
        };

        if next.status().is_on() {
            activity.alarm_triggered = true;
        }

        let transition = self.enter(next, AlarmCause::Threshold, None, intensity, now);
        AlarmUpdate { transition, ended: None }
    }

    /// Operator override; always recorded as a transition
    pub fn manual_set(&mut self, status: AlarmStatus, now: DateTime<Utc>) -> AlarmTransition {
        self.force(status, AlarmCause::Manual, None, now)
    }

    /// Override the status without touching latch or peak bookkeeping
    pub fn force(
        &mut self,
        status: AlarmStatus,
        cause: AlarmCause,
        source: Option<String>,
        now: DateTime<Utc>,
    ) -> AlarmTransition {
        let next = self.state.forced(status);
        if next != self.state {
            debug!("Alarm {:?} -> {:?} ({:?})", self.state, next, cause);
        }
        self.state = next;
        if let (AlarmStatus::On, Some(activity)) = (status, self.activity.as_mut()) {
            activity.alarm_triggered = true;
        }
        info!("Alarm forced {} ({:?})", status.label(), cause);

        AlarmTransition {
            timestamp: now,
            state: status,
            cause,
            magnitude: (self.intensity > 0.0).then_some(self.intensity),
            source,
        }
    }

    /// Clear the peak; status is left alone
    pub fn reset_peak(&mut self) {
        self.peak = 0.0;
        info!("Peak intensity reset");
    }

    fn end_activity(&mut self, now: DateTime<Utc>) -> AlarmUpdate {
        let Some(activity) = self.activity.take() else {
            // Quiet with nothing running: an override stands, only the latch goes
            self.state = match self.state.status() {
                AlarmStatus::On => AlarmState::Alarming,
                AlarmStatus::Off => AlarmState::Idle,
            };
            return AlarmUpdate::default();
        };

        let transition = self.enter(AlarmState::Idle, AlarmCause::Threshold, None, self.intensity, now);

        let record = SeismicActivity {
            started: activity.started,
            ended: now,
            peak_magnitude: activity.peak,
            alarm_triggered: activity.alarm_triggered,
        };
        info!(
            "Seismic activity ended after {:.1}s, peak {:.2}",
            record.duration_secs(),
            record.peak_magnitude
        );

        AlarmUpdate {
            transition,
            ended: Some(record),
        }
    }

    /// Move to `next`, emitting a transition only when the status flips
    fn enter(
        &mut self,
        next: AlarmState,
        cause: AlarmCause,
        source: Option<String>,
        intensity: f64,
        now: DateTime<Utc>,
    ) -> Option<AlarmTransition> {
        let previous = std::mem::replace(&mut self.state, next);
        if previous != next {
            debug!("Alarm {:?} -> {:?} at intensity {:.2}", previous, next, intensity);
        }
        if previous.status() == next.status() {
            return None;
        }

        info!("Alarm {} (intensity {:.2})", next.status().label(), intensity);
        Some(AlarmTransition {
            timestamp: now,
            state: next.status(),
            cause,
            magnitude: Some(intensity),
            source,
        })
    }
}
