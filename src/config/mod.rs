// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/quakewatch

//! Configuration module

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::sensors::SourceMode;
use crate::streaming::StreamingConfig;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Application name
    pub app_name: String,

    /// Log level
    pub log_level: String,

    /// Telemetry source configuration
    pub source: SourceConfig,

    /// Synthetic signal configuration
    pub signal: SignalConfig,

    /// Alarm configuration
    pub alarm: AlarmConfig,

    /// History buffer sizes
    pub history: HistoryConfig,

    /// Event hub configuration
    pub hub: HubConfig,

    /// Streaming configuration
    pub streaming: StreamingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            app_name: "QuakeWatch".to_string(),
            log_level: "info".to_string(),
            source: SourceConfig::default(),
            signal: SignalConfig::default(),
            alarm: AlarmConfig::default(),
            history: HistoryConfig::default(),
            hub: HubConfig::default(),
            streaming: StreamingConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Load or create default configuration
    pub fn load_or_create(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            let config = Self::default();

            // Create parent directories
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            config.save(path)?;
            Ok(config)
        }
    }

    /// Reject settings the pipeline cannot honour
    pub fn validate(&self) -> Result<()> {
        let alarm = &self.alarm;
        let signal = &self.signal;

        let numbers = [
            ("alarm.trigger_threshold", alarm.trigger_threshold),
            ("alarm.clear_threshold", alarm.clear_threshold),
            ("alarm.end_floor", alarm.end_floor),
            ("alarm.baseline_smoothing", alarm.baseline_smoothing),
            ("alarm.rotation_gain", alarm.rotation_gain),
            ("signal.event_probability", signal.event_probability),
            ("signal.magnitude_range", signal.magnitude_range.0),
            ("signal.magnitude_range", signal.magnitude_range.1),
            ("signal.decay_range", signal.decay_range.0),
            ("signal.decay_range", signal.decay_range.1),
            ("signal.manual_magnitude_range", signal.manual_magnitude_range.0),
            ("signal.manual_magnitude_range", signal.manual_magnitude_range.1),
            ("signal.manual_decay", signal.manual_decay),
            ("signal.end_floor", signal.end_floor),
            ("signal.tilt_step", signal.tilt_step),
            ("signal.tilt_limit", signal.tilt_limit),
            ("signal.accel_noise", signal.accel_noise),
            ("signal.gyro_noise", signal.gyro_noise),
            ("signal.temperature_base", signal.temperature_base),
            ("signal.temperature_swing", signal.temperature_swing),
            ("signal.temperature_period_ms", signal.temperature_period_ms),
            ("signal.temperature_noise", signal.temperature_noise),
        ];
        if let Some((name, value)) = numbers.iter().find(|(_, v)| !v.is_finite()) {
            return Err(anyhow!("{} must be a finite number, got {}", name, value));
        }

        if alarm.clear_threshold > alarm.trigger_threshold {
            return Err(anyhow!(
                "alarm.clear_threshold ({}) must not exceed alarm.trigger_threshold ({})",
                alarm.clear_threshold,
                alarm.trigger_threshold
            ));
        }
        if alarm.end_floor < 0.0 || alarm.end_floor >= alarm.clear_threshold {
            return Err(anyhow!("alarm.end_floor must lie in [0, clear_threshold)"));
        }
        if !(0.0..=1.0).contains(&signal.event_probability) {
            return Err(anyhow!("signal.event_probability must lie in [0, 1]"));
        }
        let (low, high) = signal.decay_range;
        if !(low > 0.0 && high < 1.0 && low <= high) || !(0.0..1.0).contains(&signal.manual_decay) {
            return Err(anyhow!("signal decay rates must lie in (0, 1)"));
        }
        if self.signal.tick_period_ms == 0 {
            return Err(anyhow!("signal.tick_period_ms must be positive"));
        }
        for (name, (low, high)) in [
            ("signal.magnitude_range", signal.magnitude_range),
            ("signal.manual_magnitude_range", signal.manual_magnitude_range),
        ] {
            if low < 0.0 || low > high {
                return Err(anyhow!("{} must satisfy 0 <= low <= high, got ({}, {})", name, low, high));
            }
        }
        if signal.tilt_step < 0.0 || signal.tilt_limit < 0.0 {
            return Err(anyhow!("signal.tilt_step and signal.tilt_limit must not be negative"));
        }
        if signal.accel_noise < 0.0 || signal.gyro_noise < 0.0 || signal.temperature_noise < 0.0 {
            return Err(anyhow!("signal noise widths must not be negative"));
        }
        if signal.end_floor < 0.0 {
            return Err(anyhow!("signal.end_floor must not be negative"));
        }
        if signal.temperature_period_ms <= 0.0 {
            return Err(anyhow!("signal.temperature_period_ms must be positive"));
        }
        if !(0.0..=1.0).contains(&alarm.baseline_smoothing) || alarm.rotation_gain <= 0.0 {
            return Err(anyhow!(
                "alarm.baseline_smoothing must lie in [0, 1] and alarm.rotation_gain must be positive"
            ));
        }
        Ok(())
    }

    /// Get configuration directory
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .map(|d| d.join("quakewatch"))
            .unwrap_or_else(|| PathBuf::from("./config"))
    }

    /// Get default configuration path
    pub fn default_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }
}

/// Telemetry source configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Source used at startup
    pub mode: SourceMode,

    /// Serial port of the hardware link
    pub serial_port: Option<String>,

    /// Serial baud rate
    pub baud_rate: u32,

    /// Outbound command queue depth
    pub command_queue: usize,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            mode: SourceMode::Simulation,
            serial_port: None,
            baud_rate: 115_200,
            command_queue: 16,
        }
    }
}

/// Synthetic signal configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalConfig {
    /// Tick period in milliseconds
    pub tick_period_ms: u64,

    /// RNG seed; random when unset
    pub seed: Option<u64>,

    /// Per-tick chance of a spontaneous event
    pub event_probability: f64,

    /// Spontaneous event magnitude range
    pub magnitude_range: (f64, f64),

    /// Spontaneous event decay rate range
    pub decay_range: (f64, f64),

    /// Magnitude range of operator-triggered events
    pub manual_magnitude_range: (f64, f64),

    /// Decay rate of operator-triggered events
    pub manual_decay: f64,

    /// Intensity below which an event is over
    pub end_floor: f64,

    /// Tilt random walk step width
    pub tilt_step: f64,

    /// Tilt clamp
    pub tilt_limit: f64,

    /// Accelerometer noise width (m/s²)
    pub accel_noise: f64,

    /// Gyroscope noise width
    pub gyro_noise: f64,

    /// Mean temperature (°C)
    pub temperature_base: f64,

    /// Temperature drift amplitude (°C)
    pub temperature_swing: f64,

    /// Temperature drift time constant (ms per radian)
    pub temperature_period_ms: f64,

    /// Temperature noise width (°C)
    pub temperature_noise: f64,
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            tick_period_ms: 1000,
            seed: None,
            event_probability: 0.02,
            magnitude_range: (1.0, 10.0),
            decay_range: (0.85, 0.95),
            manual_magnitude_range: (5.0, 10.0),
            manual_decay: 0.92,
            end_floor: 0.1,
            tilt_step: 0.02,
            tilt_limit: 0.5,
            accel_noise: 0.05,
            gyro_noise: 0.5,
            temperature_base: 24.5,
            temperature_swing: 2.0,
            temperature_period_ms: 30_000.0,
            temperature_noise: 0.2,
        }
    }
}

/// Alarm configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlarmConfig {
    /// Magnitude at which the alarm fires
    pub trigger_threshold: f64,

    /// Magnitude below which a latched alarm is released
    pub clear_threshold: f64,

    /// Magnitude below which activity has ended
    pub end_floor: f64,

    /// Gravity baseline smoothing for hardware samples
    pub baseline_smoothing: f64,

    /// Rotation rate divisor for hardware intensity
    pub rotation_gain: f64,
}

impl Default for AlarmConfig {
    fn default() -> Self {
        Self {
            trigger_threshold: 3.0,
            clear_threshold: 3.0,
            end_floor: 0.1,
            baseline_smoothing: 0.05,
            rotation_gain: 10.0,
        }
    }
}

/// History buffer capacities
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Raw line and fault log
    pub log_capacity: usize,

    /// Complete samples, one day at 1 Hz by default
    pub sample_capacity: usize,

    /// Finished seismic events
    pub activity_capacity: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            log_capacity: 1000,
            sample_capacity: 86_400,
            activity_capacity: 50,
        }
    }
}

/// Event hub configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    /// Log entries replayed to a new subscriber
    pub replay_len: usize,

    /// Per-subscriber queue depth
    pub queue_capacity: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            replay_len: 100,
            queue_capacity: 1024,
        }
    }
}
