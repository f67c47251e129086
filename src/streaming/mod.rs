// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/quakewatch

//! Streaming module - live event feed for dashboards

#[cfg(feature = "websocket")]
mod websocket;

#[cfg(feature = "websocket")]
pub use websocket::*;

use serde::{Deserialize, Serialize};

/// Streaming configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamingConfig {
    /// Enable WebSocket server
    pub websocket_enabled: bool,
    pub websocket_bind: String,
    pub websocket_port: u16,
    pub websocket_max_clients: usize,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            websocket_enabled: true,
            websocket_bind: "0.0.0.0".to_string(),
            websocket_port: 8765,
            websocket_max_clients: 10,
        }
    }
}

impl StreamingConfig {
    pub fn websocket_addr(&self) -> String {
        format!("{}:{}", self.websocket_bind, self.websocket_port)
    }
}
