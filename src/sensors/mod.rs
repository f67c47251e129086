// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/quakewatch

//! Sensor module - sample model, line protocol, sources and transports

mod classifier;
mod link;
mod manager;
mod simulator;
mod traits;

pub use classifier::classify;
pub use link::{write_commands, ChannelCommandSink, ReaderSource};
#[cfg(feature = "serial")]
pub use link::{open_serial, SerialSource};
pub use manager::SourceManager;
pub use simulator::{SeismicState, SignalModel, SignalTick, STANDARD_GRAVITY};
pub use traits::{AccumulatingSample, Axis, Command, CommandSink, LineSource, Sample, SourceMode};
