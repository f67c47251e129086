// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/quakewatch

//! Line protocol classifier for the ESP32/MPU6050 serial output
//!
//! The firmware prints one reading per line, e.g.
//!
//! ```text
//! Acceleration X: 0.12 m/s^2
//! Gyro Z: -0.0031 rad/s
//! Temperature: 24.61 °C
//! ---
//! Publishing to AWS IoT: {"accelX":0.12,"accelY":0.03,"accelZ":9.79,...}
//! ```
//!
//! Axis lines feed the caller's latch, `---` flushes it as a sample, and the
//! other markers map to alarm, connection and structured-sample events.
//! Nothing here fails: unreadable numbers and payloads are ignored.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use tracing::trace;

use super::{AccumulatingSample, Axis, Sample};
use crate::core::{AlarmCause, AlarmStatus, AlarmTransition, Event};

const BOUNDARY_MARKER: &str = "---";
const PAYLOAD_MARKER: &str = "Publishing to AWS IoT:";
const ALARM_STOPPED_MARKER: &str = "Alarm stopped by";

static NUMBER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(-?\d+(?:\.\d+)?)").expect("numeric pattern is valid")
});

const AXIS_MARKERS: [(&str, Axis); 7] = [
    ("Acceleration X:", Axis::AccelX),
    ("Acceleration Y:", Axis::AccelY),
    ("Acceleration Z:", Axis::AccelZ),
    ("Gyro X:", Axis::GyroX),
    ("Gyro Y:", Axis::GyroY),
    ("Gyro Z:", Axis::GyroZ),
    ("Temperature:", Axis::Temperature),
];

/// Aggregate record printed before an MQTT publish
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SamplePayload {
    accel_x: f64,
    accel_y: f64,
    accel_z: f64,
    gyro_x: Option<f64>,
    gyro_y: Option<f64>,
    gyro_z: Option<f64>,
    temperature: Option<f64>,
}

impl SamplePayload {
    fn into_sample(self, timestamp: DateTime<Utc>) -> Sample {
        Sample {
            timestamp,
            accel_x: Some(self.accel_x),
            accel_y: Some(self.accel_y),
            accel_z: Some(self.accel_z),
            gyro_x: self.gyro_x,
            gyro_y: self.gyro_y,
            gyro_z: self.gyro_z,
            temperature: self.temperature,
        }
    }
}

/// Classify one line.
///
/// Rules are checked independently, so a degenerate line carrying several
/// markers may yield several events. The raw line itself is not returned;
/// retaining it is up to the caller.
pub fn classify(text: &str, now: DateTime<Utc>, latch: &mut AccumulatingSample) -> Vec<Event> {
    let mut events = Vec::new();

    for (marker, axis) in AXIS_MARKERS {
        if let Some(value) = value_after(text, marker) {
            latch.set(axis, value);
        }
    }

    if text.contains(BOUNDARY_MARKER) && !latch.is_empty() {
        events.push(Event::Sample(latch.snapshot(now)));
    }

    if let Some(sample) = structured_sample(text, now) {
        events.push(Event::Sample(sample));
    }

    if let Some(transition) = alarm_marker(text, now) {
        events.push(Event::AlarmTransition(transition));
    }

    if let Some((service, connected)) = connection_marker(text) {
        events.push(Event::connection(now, service, connected));
    }

    events
}

/// Signed decimal following `marker`, if the marker is present and the
/// number is readable
fn value_after(text: &str, marker: &str) -> Option<f64> {
    let start = text.find(marker)? + marker.len();
    let captures = NUMBER.captures(&text[start..])?;
    captures.get(1)?.as_str().parse().ok()
}

fn structured_sample(text: &str, now: DateTime<Utc>) -> Option<Sample> {
    let start = text.find(PAYLOAD_MARKER)?;
    let rest = &text[start + PAYLOAD_MARKER.len()..];
    let json = &rest[rest.find('{')?..];

    match serde_json::from_str::<SamplePayload>(json.trim_end()) {
        Ok(payload) => Some(payload.into_sample(now)),
        Err(e) => {
            trace!("Dropping unreadable payload: {}", e);
            None
        }
    }
}

fn alarm_marker(text: &str, now: DateTime<Utc>) -> Option<AlarmTransition> {
    let (state, cause, source) = if let Some(pos) = text.find(ALARM_STOPPED_MARKER) {
        let source = text[pos + ALARM_STOPPED_MARKER.len()..].trim();
        let source = (!source.is_empty()).then(|| source.to_string());
        (AlarmStatus::Off, AlarmCause::Manual, source)
    } else if text.contains("Alarm ON") {
        (AlarmStatus::On, AlarmCause::External, None)
    } else if text.contains("Alarm OFF") {
        (AlarmStatus::Off, AlarmCause::External, None)
    } else {
        return None;
    };

    Some(AlarmTransition {
        timestamp: now,
        state,
        cause,
        magnitude: None,
        source,
    })
}

fn connection_marker(text: &str) -> Option<(&'static str, bool)> {
    if text.contains("Connected to AWS IoT") {
        Some(("AWS IoT", true))
    } else if text.contains("Connected!") && text.contains("WiFi") {
        Some(("WiFi", true))
    } else if text.contains("MQTT not connected") {
        Some(("MQTT", false))
    } else if text.contains("Connection failed") {
        Some(("AWS IoT", false))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn samples(events: &[Event]) -> Vec<&Sample> {
        events
            .iter()
            .filter_map(|e| match e {
                Event::Sample(s) => Some(s),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_reading_block_yields_one_sample() {
        let now = Utc::now();
        let mut latch = AccumulatingSample::new();
        let block = [
            "=== MPU6050 Sensor Readings ===",
            "Acceleration X: 0.12 m/s^2",
            "Acceleration Y: -0.30 m/s^2",
            "Acceleration Z: 9.79 m/s^2",
            "Gyro X: 0.0012 rad/s",
            "Gyro Y: -0.0040 rad/s",
            "Gyro Z: 0.0000 rad/s",
            "Temperature: 24.61 °C",
        ];
        for line in block {
            assert!(classify(line, now, &mut latch).is_empty(), "{line}");
        }

        let events = classify("---", now, &mut latch);
        let found = samples(&events);
        assert_eq!(found.len(), 1);
        let sample = found[0];
        assert!(sample.is_complete());
        assert_eq!(sample.accel_y, Some(-0.30));
        assert_eq!(sample.gyro_y, Some(-0.004));
        assert_eq!(sample.temperature, Some(24.61));
    }

    #[test]
    fn test_boundary_without_readings_is_silent() {
        let mut latch = AccumulatingSample::new();
        assert!(classify("---", Utc::now(), &mut latch).is_empty());
    }

    #[test]
    fn test_stale_axes_keep_last_value() {
        let now = Utc::now();
        let mut latch = AccumulatingSample::new();
        classify("Acceleration X: 1.00", now, &mut latch);
        classify("Gyro Z: 0.50", now, &mut latch);
        classify("---", now, &mut latch);

        classify("Acceleration X: 2.00", now, &mut latch);
        let events = classify("---", now, &mut latch);
        let sample = samples(&events)[0];
        assert_eq!(sample.accel_x, Some(2.0));
        assert_eq!(sample.gyro_z, Some(0.5));
    }

    #[test]
    fn test_malformed_number_is_no_update() {
        let now = Utc::now();
        let mut latch = AccumulatingSample::new();
        classify("Acceleration X: 1.50", now, &mut latch);
        classify("Acceleration X: nan", now, &mut latch);
        classify("Acceleration X: -", now, &mut latch);
        assert_eq!(latch.get(Axis::AccelX), Some(1.5));
    }

    #[test]
    fn test_structured_payload_bypasses_latch() {
        let now = Utc::now();
        let mut latch = AccumulatingSample::new();
        let line = r#"Publishing to AWS IoT: {"accelX":0.5,"accelY":0.25,"accelZ":9.7,"gyroX":0.01,"gyroY":0.02,"gyroZ":0.03,"temperature":25.5}"#;
        let events = classify(line, now, &mut latch);

        let found = samples(&events);
        assert_eq!(found.len(), 1);
        assert!(found[0].is_complete());
        assert_eq!(found[0].temperature, Some(25.5));
        assert!(latch.is_empty());
    }

    #[test]
    fn test_invalid_payload_is_dropped() {
        let mut latch = AccumulatingSample::new();
        let now = Utc::now();
        assert!(classify("Publishing to AWS IoT: {\"accelX\":", now, &mut latch).is_empty());
        assert!(classify("Publishing to AWS IoT: {\"accelX\":1.0}", now, &mut latch).is_empty());
        assert!(classify("Publishing to AWS IoT: no json here", now, &mut latch).is_empty());
    }

    #[test]
    fn test_alarm_markers() {
        let mut latch = AccumulatingSample::new();
        let now = Utc::now();

        let events = classify("Alarm ON", now, &mut latch);
        assert!(matches!(
            &events[..],
            [Event::AlarmTransition(AlarmTransition { state: AlarmStatus::On, cause: AlarmCause::External, .. })]
        ));

        let events = classify("Alarm OFF", now, &mut latch);
        assert!(matches!(
            &events[..],
            [Event::AlarmTransition(AlarmTransition { state: AlarmStatus::Off, cause: AlarmCause::External, .. })]
        ));

        let events = classify("Alarm stopped by button", now, &mut latch);
        match &events[..] {
            [Event::AlarmTransition(t)] => {
                assert_eq!(t.state, AlarmStatus::Off);
                assert_eq!(t.cause, AlarmCause::Manual);
                assert_eq!(t.source.as_deref(), Some("button"));
            }
            other => panic!("unexpected events: {other:?}"),
        }
    }

    #[test]
    fn test_connection_markers() {
        let mut latch = AccumulatingSample::new();
        let now = Utc::now();

        let cases = [
            ("Connecting to WiFi.... Connected!", "WiFi", true),
            ("Connected to AWS IoT!", "AWS IoT", true),
            ("MQTT not connected, skipping publish.", "MQTT", false),
            (" Connection failed (timeout).", "AWS IoT", false),
        ];
        for (line, expected_service, expected_connected) in cases {
            match &classify(line, now, &mut latch)[..] {
                [Event::ConnectionStatus { service, connected, .. }] => {
                    assert_eq!(service, expected_service);
                    assert_eq!(*connected, expected_connected);
                }
                other => panic!("unexpected events for {line:?}: {other:?}"),
            }
        }
    }

    #[test]
    fn test_unmarked_lines_yield_nothing() {
        let mut latch = AccumulatingSample::new();
        for line in ["", "MPU6050 Found!", "Configuring certificates...", "Message published successfully!"] {
            assert!(classify(line, Utc::now(), &mut latch).is_empty());
        }
    }

    fn axis_line(axis: Axis, value: f64) -> String {
        let marker = AXIS_MARKERS
            .iter()
            .find(|(_, a)| *a == axis)
            .map(|(m, _)| *m)
            .unwrap();
        format!("{marker} {value:.4}")
    }

    proptest! {
        #[test]
        fn boundary_sample_reflects_latest_value_per_axis(
            readings in proptest::collection::vec((0usize..7, -1000.0f64..1000.0), 1..40),
        ) {
            let now = Utc::now();
            let mut latch = AccumulatingSample::new();
            let mut expected: [Option<f64>; 7] = [None; 7];

            for (index, value) in &readings {
                let axis = Axis::ALL[*index];
                let line = axis_line(axis, *value);
                classify(&line, now, &mut latch);
                expected[*index] = line.rsplit(' ').next().and_then(|v| v.parse().ok());
            }

            let events = classify("---", now, &mut latch);
            let found = samples(&events);
            prop_assert_eq!(found.len(), 1);
            for axis in Axis::ALL {
                prop_assert_eq!(found[0].get(axis), expected[axis as usize]);
            }
        }
    }
}
