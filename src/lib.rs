// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/quakewatch

//! QuakeWatch - Seismic Telemetry Bridge
//!
//! Turns the line-oriented output of an ESP32/MPU6050 seismic node (or a
//! synthetic stand-in) into typed events:
//! - line protocol classification with a per-axis latch
//! - synthetic tilt and decaying seismic event model
//! - alarm hysteresis with peak tracking and an activity log
//! - bounded history with time-window queries
//! - sequenced fan-out with log replay for late subscribers
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                       QuakeWatch Engine                       │
//! ├───────────────────────────────────────────────────────────────┤
//! │  ┌────────────┐   ┌────────────┐   ┌──────────────────────┐   │
//! │  │ LineSource │ → │ Classifier │ → │                      │   │
//! │  └────────────┘   └────────────┘   │  Alarm  +  History   │   │
//! │  ┌────────────┐                    │                      │   │
//! │  │ SignalModel│ ─────────────────→ │                      │   │
//! │  └────────────┘                    └──────────────────────┘   │
//! │        ↑                                      ↓               │
//! │  ┌────────────┐   ┌───────────────────────────────────────┐   │
//! │  │  Source    │   │               Event Hub               │   │
//! │  │  Manager   │   └───────────────────────────────────────┘   │
//! │  └────────────┘          ↓              ↓            ↓        │
//! │                    ┌───────────┐  ┌──────────┐  ┌─────────┐   │
//! │                    │ WebSocket │  │Dashboard │  │   ...   │   │
//! │                    └───────────┘  └──────────┘  └─────────┘   │
//! └───────────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod core;
pub mod detection;
pub mod error;
pub mod sensors;
pub mod streaming;

// Re-exports for convenience
pub use config::Config;
pub use crate::core::{AlarmStatus, Engine, Envelope, Event, EventHub, Subscription};
pub use detection::{AlarmEngine, AlarmSnapshot};
pub use error::{Error, Result};
pub use sensors::{Command, LineSource, Sample, SignalModel, SourceManager, SourceMode};

#[cfg(feature = "websocket")]
pub use streaming::WebSocketServer;

/// QuakeWatch version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// QuakeWatch name
pub const NAME: &str = "QuakeWatch";

/// Build info
pub fn build_info() -> BuildInfo {
    BuildInfo {
        version: VERSION.to_string(),
        target: std::env::consts::ARCH.to_string(),
        os: std::env::consts::OS.to_string(),
        features: enabled_features(),
    }
}

/// Build information
#[derive(Debug, Clone)]
pub struct BuildInfo {
    /// Version string
    pub version: String,
    /// Target architecture
    pub target: String,
    /// Operating system
    pub os: String,
    /// Enabled features
    pub features: Vec<String>,
}

fn enabled_features() -> Vec<String> {
    let mut features = vec![];

    #[cfg(feature = "websocket")]
    features.push("websocket".to_string());

    #[cfg(feature = "serial")]
    features.push("serial".to_string());

    features
}
