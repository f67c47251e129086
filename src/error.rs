// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/quakewatch

//! Error types for the telemetry pipeline

use thiserror::Error;

/// Pipeline errors.
///
/// Malformed telemetry never shows up here: unparsable lines and payloads are
/// tolerated by the classifier, and transport failures travel as `Fault`
/// events. Only requests that cannot be honoured are rejected synchronously.
#[derive(Debug, Error)]
pub enum Error {
    /// Manual command issued while no transport is attached.
    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    /// Operation requires the synthetic source to be active.
    #[error("Synthetic source is not active")]
    SimulationInactive,

    /// The command channel to the transport is full or closed.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Configuration could not be loaded or stored.
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Crate result alias
pub type Result<T> = std::result::Result<T, Error>;
