// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/quakewatch

//! Typed pipeline events

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::history::Timestamped;
use crate::sensors::Sample;

/// Alarm on/off
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlarmStatus {
    Off,
    On,
}

impl AlarmStatus {
    pub fn label(&self) -> &'static str {
        match self {
            AlarmStatus::Off => "OFF",
            AlarmStatus::On => "ON",
        }
    }

    pub fn is_on(&self) -> bool {
        matches!(self, AlarmStatus::On)
    }
}

/// What drove an alarm transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlarmCause {
    /// Intensity crossed a threshold
    Threshold,
    /// Operator request, or a device-side button
    Manual,
    /// Reported by the device
    External,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlarmTransition {
    pub timestamp: DateTime<Utc>,
    pub state: AlarmStatus,
    pub cause: AlarmCause,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub magnitude: Option<f64>,
    /// Who stopped the alarm, for `Alarm stopped by <source>` lines
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

/// A finished seismic event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeismicActivity {
    pub started: DateTime<Utc>,
    pub ended: DateTime<Utc>,
    pub peak_magnitude: f64,
    pub alarm_triggered: bool,
}

impl SeismicActivity {
    pub fn duration_secs(&self) -> f64 {
        (self.ended - self.started).num_milliseconds() as f64 / 1000.0
    }
}

impl Timestamped for SeismicActivity {
    fn timestamp(&self) -> DateTime<Utc> {
        self.ended
    }
}

/// Classified pipeline output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    RawLine {
        timestamp: DateTime<Utc>,
        text: String,
    },
    Sample(Sample),
    AlarmTransition(AlarmTransition),
    ConnectionStatus {
        timestamp: DateTime<Utc>,
        service: String,
        connected: bool,
    },
    Fault {
        timestamp: DateTime<Utc>,
        message: String,
    },
    ActivityEnded(SeismicActivity),
}

impl Event {
    pub fn raw_line(timestamp: DateTime<Utc>, text: &str) -> Self {
        Event::RawLine { timestamp, text: text.to_string() }
    }

    pub fn fault(timestamp: DateTime<Utc>, message: &str) -> Self {
        Event::Fault { timestamp, message: message.to_string() }
    }

    pub fn connection(timestamp: DateTime<Utc>, service: &str, connected: bool) -> Self {
        Event::ConnectionStatus {
            timestamp,
            service: service.to_string(),
            connected,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Event::RawLine { timestamp, .. }
            | Event::ConnectionStatus { timestamp, .. }
            | Event::Fault { timestamp, .. } => *timestamp,
            Event::Sample(sample) => sample.timestamp,
            Event::AlarmTransition(transition) => transition.timestamp,
            Event::ActivityEnded(activity) => activity.ended,
        }
    }

    /// Entries kept in the operational log and replayed to new subscribers
    pub fn is_log_entry(&self) -> bool {
        matches!(self, Event::RawLine { .. } | Event::Fault { .. })
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Event::RawLine { .. } => "raw_line",
            Event::Sample(_) => "sample",
            Event::AlarmTransition(_) => "alarm_transition",
            Event::ConnectionStatus { .. } => "connection_status",
            Event::Fault { .. } => "fault",
            Event::ActivityEnded(_) => "activity_ended",
        }
    }
}

/// A published event with its hub-wide sequence number.
///
/// The event itself is shared between every subscriber queue and the log.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Envelope {
    pub seq: u64,
    pub event: Arc<Event>,
}

impl Timestamped for Envelope {
    fn timestamp(&self) -> DateTime<Utc> {
        self.event.timestamp()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_tagging() {
        let event = Event::connection(Utc::now(), "WiFi", true);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "connection_status");
        assert_eq!(json["service"], "WiFi");

        let event = Event::AlarmTransition(AlarmTransition {
            timestamp: Utc::now(),
            state: AlarmStatus::On,
            cause: AlarmCause::External,
            magnitude: None,
            source: None,
        });
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "alarm_transition");
        assert_eq!(json["state"], "on");
        assert_eq!(json["cause"], "external");
        assert!(json.get("magnitude").is_none());
    }

    #[test]
    fn test_log_entries() {
        let now = Utc::now();
        assert!(Event::raw_line(now, "---").is_log_entry());
        assert!(Event::fault(now, "port closed").is_log_entry());
        assert!(!Event::connection(now, "WiFi", true).is_log_entry());
    }
}
