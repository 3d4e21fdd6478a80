//! capture-session application crate
//!
//! Wires a [`capture_core::CaptureSession`] to the mock device for command-line
//! runs:
//!
//! - [`config`]: Figment-based configuration (TOML file plus environment)
//! - [`logging`]: `tracing-subscriber` initialization
//! - [`listener`]: a listener that logs notifications and keeps totals
//! - [`runner`]: burst and repeating runs against [`capture_driver_mock::MockRemoteDevice`]

pub mod config;
pub mod listener;
pub mod logging;
pub mod runner;

pub use config::AppConfig;
pub use listener::{LoggingListener, RunStats};
pub use runner::{RunSummary, SessionRunner};
