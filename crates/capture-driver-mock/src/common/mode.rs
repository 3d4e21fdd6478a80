//! Operational modes for the mock device.
//!
//! - **Instant**: frames are produced only when the test asks for them
//! - **Realistic**: frames are produced on a timer by a background task
//! - **Chaos**: instant stepping plus randomly failed frames

use serde::{Deserialize, Serialize};

/// Operational modes for the mock device
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MockMode {
    /// Manual stepping, no delays - for unit tests
    #[default]
    Instant,
    /// Timer-driven frames and round-trip delays - for demos and soak tests
    Realistic,
    /// Manual stepping with injected frame failures - for resilience testing
    Chaos,
}

impl MockMode {
    /// True when frames are produced by a background task.
    pub fn is_timed(self) -> bool {
        self == MockMode::Realistic
    }
}
