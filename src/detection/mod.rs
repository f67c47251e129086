// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/quakewatch

//! Detection module - intensity estimation and the seismic alarm

mod alarm;
mod intensity;

pub use alarm::{AlarmEngine, AlarmSnapshot, AlarmState, AlarmUpdate};
pub use intensity::IntensityEstimator;
