// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/quakewatch

//! Sensor sample types and source/sink traits

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::core::{AlarmStatus, Timestamped};
use crate::error::Result;

/// Sensor axes reported by the MPU6050 link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Axis {
    AccelX,
    AccelY,
    AccelZ,
    GyroX,
    GyroY,
    GyroZ,
    Temperature,
}

impl Axis {
    pub const ALL: [Axis; 7] = [
        Axis::AccelX,
        Axis::AccelY,
        Axis::AccelZ,
        Axis::GyroX,
        Axis::GyroY,
        Axis::GyroZ,
        Axis::Temperature,
    ];
}

/// A sensor snapshot.
///
/// Every field is optional: a snapshot taken from the latch before all axes
/// have reported is still a sample, just not a complete one.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sample {
    pub timestamp: DateTime<Utc>,
    pub accel_x: Option<f64>,
    pub accel_y: Option<f64>,
    pub accel_z: Option<f64>,
    pub gyro_x: Option<f64>,
    pub gyro_y: Option<f64>,
    pub gyro_z: Option<f64>,
    pub temperature: Option<f64>,
}

impl Sample {
    /// A sample is complete once all three acceleration axes are present
    pub fn is_complete(&self) -> bool {
        self.accel_x.is_some() && self.accel_y.is_some() && self.accel_z.is_some()
    }

    pub fn get(&self, axis: Axis) -> Option<f64> {
        match axis {
            Axis::AccelX => self.accel_x,
            Axis::AccelY => self.accel_y,
            Axis::AccelZ => self.accel_z,
            Axis::GyroX => self.gyro_x,
            Axis::GyroY => self.gyro_y,
            Axis::GyroZ => self.gyro_z,
            Axis::Temperature => self.temperature,
        }
    }

    /// Acceleration vector in m/s², if complete
    pub fn acceleration(&self) -> Option<Vector3<f64>> {
        Some(Vector3::new(self.accel_x?, self.accel_y?, self.accel_z?))
    }

    /// Rotation rate vector; missing gyro axes count as zero
    pub fn rotation(&self) -> Vector3<f64> {
        Vector3::new(
            self.gyro_x.unwrap_or(0.0),
            self.gyro_y.unwrap_or(0.0),
            self.gyro_z.unwrap_or(0.0),
        )
    }
}

impl Timestamped for Sample {
    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// Last-seen value per axis.
///
/// Updated field by field as axis lines arrive and snapshotted on a boundary
/// marker. A boundary never clears it: an axis that stops reporting keeps
/// its last value, the way a stale sensor register would.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AccumulatingSample {
    values: [Option<f64>; 7],
}

impl AccumulatingSample {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, axis: Axis, value: f64) {
        self.values[axis as usize] = Some(value);
    }

    pub fn get(&self, axis: Axis) -> Option<f64> {
        self.values[axis as usize]
    }

    pub fn is_empty(&self) -> bool {
        self.values.iter().all(Option::is_none)
    }

    /// Copy the latch into an immutable sample
    pub fn snapshot(&self, timestamp: DateTime<Utc>) -> Sample {
        Sample {
            timestamp,
            accel_x: self.get(Axis::AccelX),
            accel_y: self.get(Axis::AccelY),
            accel_z: self.get(Axis::AccelZ),
            gyro_x: self.get(Axis::GyroX),
            gyro_y: self.get(Axis::GyroY),
            gyro_z: self.get(Axis::GyroZ),
            temperature: self.get(Axis::Temperature),
        }
    }
}

/// Where telemetry is currently coming from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceMode {
    /// Synthetic signal model
    Simulation,
    /// Line-oriented hardware link
    Hardware,
}

/// Outbound command for the device.
///
/// Serialized as one JSON object per line, e.g.
/// `{"message":"Manual alarm ON","earthquake":"on"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    pub message: String,
    #[serde(rename = "earthquake")]
    pub alarm: AlarmStatus,
}

impl Command {
    pub fn manual_alarm(status: AlarmStatus) -> Self {
        Self {
            message: format!("Manual alarm {}", status.label()),
            alarm: status,
        }
    }

    pub fn to_line(&self) -> Result<String> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }
}

/// A newline-delimited text source that may fail or close at any time
#[async_trait]
pub trait LineSource: Send {
    /// Human readable name, used as the `service` of connection events
    fn name(&self) -> &str;

    /// Next line without its terminator.
    ///
    /// `None` means the source closed; `Some(Err(_))` is a transport fault
    /// after which the source may keep producing lines.
    async fn next_line(&mut self) -> Option<std::io::Result<String>>;
}

/// Accepts outbound commands without blocking the caller
pub trait CommandSink: Send + Sync {
    fn submit(&self, command: Command) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_completeness() {
        let mut latch = AccumulatingSample::new();
        assert!(latch.is_empty());

        latch.set(Axis::AccelX, 0.1);
        latch.set(Axis::AccelY, -0.2);
        assert!(!latch.snapshot(Utc::now()).is_complete());

        latch.set(Axis::AccelZ, 9.8);
        let sample = latch.snapshot(Utc::now());
        assert!(sample.is_complete());
        assert_eq!(sample.gyro_x, None);
        assert_eq!(sample.acceleration(), Some(Vector3::new(0.1, -0.2, 9.8)));
    }

    #[test]
    fn test_sample_uses_device_field_names() {
        let sample = Sample {
            accel_x: Some(1.5),
            gyro_z: Some(0.25),
            ..Default::default()
        };
        let json = serde_json::to_value(&sample).unwrap();
        assert_eq!(json["accelX"], 1.5);
        assert_eq!(json["gyroZ"], 0.25);
    }

    #[test]
    fn test_command_wire_line() {
        let line = Command::manual_alarm(AlarmStatus::On).to_line().unwrap();
        assert_eq!(line, "{\"message\":\"Manual alarm ON\",\"earthquake\":\"on\"}\n");
    }
}
