//! Timing configuration for realistic mode.

use std::time::Duration;

/// Frame cadence and proxy round-trip delay
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimingConfig {
    /// Time between produced frames in milliseconds
    pub frame_interval_ms: u64,
    /// Delay added to every proxy call in milliseconds
    pub communication_delay_ms: u64,
    /// Upper bound of random jitter added to each frame interval
    pub jitter_ms: u64,
}

impl TimingConfig {
    /// Viewfinder cadence (30 fps)
    pub fn preview() -> Self {
        Self {
            frame_interval_ms: 33,
            communication_delay_ms: 2,
            jitter_ms: 3,
        }
    }

    /// Long-exposure still capture
    pub fn still_capture() -> Self {
        Self {
            frame_interval_ms: 200,
            communication_delay_ms: 2,
            jitter_ms: 10,
        }
    }

    /// Preview round-trip delays with a custom frame interval
    pub fn with_frame_interval(frame_interval_ms: u64) -> Self {
        Self {
            frame_interval_ms,
            ..Self::preview()
        }
    }

    /// Frame interval as a duration
    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms)
    }

    /// Round-trip delay as a duration
    pub fn communication_delay(&self) -> Duration {
        Duration::from_millis(self.communication_delay_ms)
    }

    /// Frame interval in nanoseconds, used for sensor timestamps
    pub fn frame_interval_ns(&self) -> i64 {
        i64::try_from(self.frame_interval_ms)
            .unwrap_or(i64::MAX)
            .saturating_mul(1_000_000)
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            frame_interval_ms: 0,
            communication_delay_ms: 0,
            jitter_ms: 0,
        }
    }
}
