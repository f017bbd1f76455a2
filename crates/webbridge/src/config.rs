//! Bridge configuration. Every field has a default so an empty config works
//! out of the box.

use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Reject a pending call after this many milliseconds. `None` (the
    /// default) leaves an unanswered call pending until a response arrives
    /// or the transport fails, matching the original bridge behavior.
    pub call_timeout_ms: Option<u64>,

    /// Buffer capacity of the inbound pump channel.
    pub inbound_capacity: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            call_timeout_ms: None,
            inbound_capacity: 64,
        }
    }
}

impl BridgeConfig {
    pub fn call_timeout(&self) -> Option<Duration> {
        self.call_timeout_ms.map(Duration::from_millis)
    }
}
