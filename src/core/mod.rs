// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/quakewatch

//! Core pipeline - events, bounded history, the hub and the engine

mod engine;
mod event;
mod event_bus;
mod history;

pub use engine::{Engine, EngineStats};
pub use event::{AlarmCause, AlarmStatus, AlarmTransition, Envelope, Event, SeismicActivity};
pub use event_bus::{EventHub, HubStats, SubscriberId, Subscription};
pub use history::{HistoryBuffer, Timestamped};
