// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/quakewatch

//! Shaking intensity estimate for samples coming off a hardware link

use nalgebra::Vector3;

use crate::config::AlarmConfig;
use crate::sensors::Sample;

/// Tracks the gravity baseline and reports how far a sample deviates from it.
///
/// Intensity is the larger of the dynamic acceleration norm (m/s²) and the
/// rotation rate norm divided by `rotation_gain`.
pub struct IntensityEstimator {
    baseline: Option<Vector3<f64>>,
    smoothing: f64,
    rotation_gain: f64,
}

impl IntensityEstimator {
    pub fn new(smoothing: f64, rotation_gain: f64) -> Self {
        Self {
            baseline: None,
            smoothing: smoothing.clamp(0.0, 1.0),
            rotation_gain: if rotation_gain > 0.0 { rotation_gain } else { 1.0 },
        }
    }

    pub fn from_config(config: &AlarmConfig) -> Self {
        Self::new(config.baseline_smoothing, config.rotation_gain)
    }

    /// Estimate the intensity of `sample`; `None` for incomplete samples
    pub fn estimate(&mut self, sample: &Sample) -> Option<f64> {
        let accel = sample.acceleration()?;
        let baseline = *self.baseline.get_or_insert(accel);

        let linear = (accel - baseline).norm();
        let rotational = sample.rotation().norm() / self.rotation_gain;

        self.baseline = Some(baseline.lerp(&accel, self.smoothing));

        Some(linear.max(rotational))
    }

    pub fn baseline(&self) -> Option<Vector3<f64>> {
        self.baseline
    }

    pub fn reset(&mut self) {
        self.baseline = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn sample(accel: [f64; 3], gyro: [f64; 3]) -> Sample {
        Sample {
            timestamp: Utc::now(),
            accel_x: Some(accel[0]),
            accel_y: Some(accel[1]),
            accel_z: Some(accel[2]),
            gyro_x: Some(gyro[0]),
            gyro_y: Some(gyro[1]),
            gyro_z: Some(gyro[2]),
            temperature: None,
        }
    }

    #[test]
    fn test_resting_device_reads_zero() {
        let mut estimator = IntensityEstimator::new(0.05, 10.0);
        for _ in 0..10 {
            let intensity = estimator.estimate(&sample([0.0, 0.0, 9.81], [0.0; 3])).unwrap();
            assert!(intensity < 1e-9);
        }
    }

    #[test]
    fn test_jolt_reads_deviation_from_baseline() {
        let mut estimator = IntensityEstimator::new(0.0, 10.0);
        estimator.estimate(&sample([0.0, 0.0, 9.81], [0.0; 3]));

        let intensity = estimator.estimate(&sample([3.0, 4.0, 9.81], [0.0; 3])).unwrap();
        assert!((intensity - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_rotation_dominates_when_larger() {
        let mut estimator = IntensityEstimator::new(0.0, 10.0);
        estimator.estimate(&sample([0.0, 0.0, 9.81], [0.0; 3]));

        let intensity = estimator.estimate(&sample([0.0, 0.0, 9.81], [40.0, 0.0, 30.0])).unwrap();
        assert!((intensity - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_incomplete_sample_is_rejected() {
        let mut estimator = IntensityEstimator::new(0.05, 10.0);
        let partial = Sample { accel_x: Some(1.0), ..Default::default() };
        assert!(estimator.estimate(&partial).is_none());
        assert!(estimator.baseline().is_none());
    }
}
