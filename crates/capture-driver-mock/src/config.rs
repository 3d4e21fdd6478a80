//! Mock device configuration.

use serde::{Deserialize, Serialize};

use crate::common::{MockMode, TimingConfig};

/// Configuration for [`crate::MockRemoteDevice`], usually the `[mock]` table of
/// the application config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MockDeviceConfig {
    /// Operational mode (default: instant)
    #[serde(default)]
    pub mode: MockMode,

    /// Time between frames in realistic mode (default: 33)
    #[serde(default = "default_frame_interval_ms")]
    pub frame_interval_ms: u64,

    /// Emit one partial result ahead of every final result (default: false)
    #[serde(default)]
    pub partial_results: bool,

    /// First request id the device hands out (default: 0)
    #[serde(default)]
    pub first_request_id: i32,

    /// Probability that a frame fails in chaos mode (default: 0.05)
    #[serde(default = "default_frame_error_rate")]
    pub frame_error_rate: f64,

    /// RNG seed for reproducible chaos runs (default: entropy)
    #[serde(default)]
    pub seed: Option<u64>,
}

fn default_frame_interval_ms() -> u64 {
    33
}
fn default_frame_error_rate() -> f64 {
    0.05
}

impl Default for MockDeviceConfig {
    fn default() -> Self {
        Self {
            mode: MockMode::default(),
            frame_interval_ms: default_frame_interval_ms(),
            partial_results: false,
            first_request_id: 0,
            frame_error_rate: default_frame_error_rate(),
            seed: None,
        }
    }
}

impl MockDeviceConfig {
    /// Timing derived from the configured mode and frame interval.
    pub fn timing(&self) -> TimingConfig {
        if self.mode.is_timed() {
            TimingConfig::with_frame_interval(self.frame_interval_ms)
        } else {
            TimingConfig {
                frame_interval_ms: self.frame_interval_ms,
                ..TimingConfig::default()
            }
        }
    }

    /// Frame failure probability actually applied; zero outside chaos mode.
    pub fn effective_frame_error_rate(&self) -> f64 {
        if self.mode == MockMode::Chaos {
            self.frame_error_rate
        } else {
            0.0
        }
    }

    /// Check ranges.
    pub fn validate(&self) -> Result<(), String> {
        if !(0.0..=1.0).contains(&self.frame_error_rate) {
            return Err(format!(
                "mock.frame_error_rate must be within [0.0, 1.0], got {}",
                self.frame_error_rate
            ));
        }
        if self.mode.is_timed() && self.frame_interval_ms == 0 {
            return Err("mock.frame_interval_ms must be positive in realistic mode".to_string());
        }
        if self.first_request_id < 0 {
            return Err(format!(
                "mock.first_request_id must not be negative, got {}",
                self.first_request_id
            ));
        }
        Ok(())
    }
}
