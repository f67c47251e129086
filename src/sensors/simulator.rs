// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/quakewatch

//! Synthetic MPU6050 signal with decaying seismic events

use chrono::{DateTime, Utc};
use nalgebra::{Vector2, Vector3};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use rand_distr::Uniform;
use tracing::{debug, info};

use super::Sample;
use crate::config::SignalConfig;

/// Standard gravity in m/s²
pub const STANDARD_GRAVITY: f64 = 9.80665;

/// Current seismic event state
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SeismicState {
    pub intensity: f64,
    pub decay_rate: f64,
    pub phase: f64,
}

impl SeismicState {
    pub fn is_active(&self) -> bool {
        self.intensity > 0.0
    }
}

/// Output of one generator tick
#[derive(Debug, Clone, PartialEq)]
pub struct SignalTick {
    pub sample: Sample,
    /// Intensity that shaped this tick, before decay
    pub intensity: f64,
    /// Magnitude of an event spawned on this tick
    pub spawned: Option<f64>,
}

/// Periodic synthetic source.
///
/// A slow tilt random walk sets the gravity direction; seismic events add
/// P-wave (vertical), S-wave (horizontal) and rotational motion that decays
/// geometrically every tick.
pub struct SignalModel {
    config: SignalConfig,
    rng: ChaCha8Rng,
    tilt: Vector2<f64>,
    seismic: SeismicState,
    ticks: u64,
}

impl SignalModel {
    pub fn new(config: SignalConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };

        Self {
            config,
            rng,
            tilt: Vector2::zeros(),
            seismic: SeismicState::default(),
            ticks: 0,
        }
    }

    pub fn seismic(&self) -> SeismicState {
        self.seismic
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Produce the next sample
    pub fn tick(&mut self, now: DateTime<Utc>) -> SignalTick {
        self.ticks += 1;
        let gravity = self.step_tilt();

        let spawned = if !self.seismic.is_active() && self.rng.gen_bool(self.config.event_probability) {
            let intensity = self.sample_range(self.config.magnitude_range);
            let decay_rate = self.sample_range(self.config.decay_range);
            self.seismic = SeismicState { intensity, decay_rate, phase: 0.0 };
            info!("Synthetic seismic event, magnitude {:.1}", intensity);
            Some(intensity)
        } else {
            None
        };

        let intensity = self.seismic.intensity;
        let (quake_accel, quake_gyro) = self.step_seismic();

        let accel = gravity + quake_accel + self.noise3(self.config.accel_noise);
        let gyro = quake_gyro + self.noise3(self.config.gyro_noise);
        let temperature = self.temperature(now);

        SignalTick {
            sample: Sample {
                timestamp: now,
                accel_x: Some(accel.x),
                accel_y: Some(accel.y),
                accel_z: Some(accel.z),
                gyro_x: Some(gyro.x),
                gyro_y: Some(gyro.y),
                gyro_z: Some(gyro.z),
                temperature: Some(temperature),
            },
            intensity,
            spawned,
        }
    }

    /// Replace whatever is going on with a strong, slow-decaying event
    pub fn trigger_event(&mut self) -> f64 {
        let intensity = self.sample_range(self.config.manual_magnitude_range);
        self.seismic = SeismicState {
            intensity,
            decay_rate: self.config.manual_decay,
            phase: 0.0,
        };
        info!("Simulated seismic event, magnitude {:.1}", intensity);
        intensity
    }

    /// Random walk the tilt and derive a gravity vector of constant norm
    fn step_tilt(&mut self) -> Vector3<f64> {
        let step = self.config.tilt_step / 2.0;
        let limit = self.config.tilt_limit;
        let delta = Vector2::new(self.rng.gen_range(-step..=step), self.rng.gen_range(-step..=step));
        self.tilt = (self.tilt + delta).map(|v| v.clamp(-limit, limit));

        Vector3::new(-self.tilt.y, self.tilt.x, 1.0).normalize() * STANDARD_GRAVITY
    }

    /// Kinematic response of the current event; decays the intensity
    fn step_seismic(&mut self) -> (Vector3<f64>, Vector3<f64>) {
        if self.seismic.intensity <= self.config.end_floor {
            self.seismic = SeismicState::default();
            return (Vector3::zeros(), Vector3::zeros());
        }

        self.seismic.phase += self.rng.gen_range(0.5..1.0);
        let phase = self.seismic.phase;
        let i = self.seismic.intensity;

        let accel = Vector3::new(
            (phase * 2.5).sin() * i,
            (phase * 2.8).cos() * i * 0.8,
            (phase * 3.14).sin() * i * 0.7,
        );
        let gyro = Vector3::new(
            (phase * 4.0).sin() * i * 10.0,
            (phase * 3.5).cos() * i * 8.0,
            (phase * 3.0).sin() * i * 5.0,
        );

        self.seismic.intensity *= self.seismic.decay_rate;
        if self.seismic.intensity < self.config.end_floor {
            debug!("Synthetic seismic event decayed out");
            self.seismic = SeismicState::default();
        }

        (accel, gyro)
    }

    fn temperature(&mut self, now: DateTime<Utc>) -> f64 {
        let t = now.timestamp_millis() as f64 / self.config.temperature_period_ms;
        self.config.temperature_base
            + t.sin() * self.config.temperature_swing
            + self.noise(self.config.temperature_noise)
    }

    fn noise(&mut self, width: f64) -> f64 {
        if width <= 0.0 {
            return 0.0;
        }
        self.rng.sample(Uniform::new_inclusive(-width / 2.0, width / 2.0))
    }

    fn noise3(&mut self, width: f64) -> Vector3<f64> {
        Vector3::new(self.noise(width), self.noise(width), self.noise(width))
    }

    fn sample_range(&mut self, (low, high): (f64, f64)) -> f64 {
        if high > low {
            self.rng.gen_range(low..high)
        } else {
            low
        }
    }
}
