//! Mock remote capture device for capture-session
//!
//! This crate provides a simulated [`capture_core::RemoteDevice`] for exercising a
//! [`capture_core::CaptureSession`] without hardware.
//!
//! # Modes
//!
//! - **Instant**: frames are produced by [`MockRemoteDevice::step`] or
//!   [`MockRemoteDevice::complete_queued`] and delivered by
//!   [`MockRemoteDevice::deliver`], so tests control every interleaving
//! - **Realistic**: [`MockRemoteDevice::start`] spawns a producer that emits a frame
//!   every `frame_interval_ms` and a task that delivers events as they appear
//! - **Chaos**: like instant, with frames failing at `frame_error_rate`
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use capture_core::{CaptureRequest, ManualDispatchQueue, Metadata};
//! use capture_driver_mock::{MockDeviceConfig, MockRemoteDevice, RecordingListener};
//!
//! # async fn example() -> capture_core::SessionResult<()> {
//! let device = MockRemoteDevice::new(MockDeviceConfig::default());
//! let queue = ManualDispatchQueue::new();
//! let recorder = Arc::new(RecordingListener::new());
//! let session = device.open_session("0", recorder.clone(), queue.clone());
//!
//! let request = CaptureRequest::builder(Metadata::new()).build();
//! session.capture(request, Some(recorder.clone()), Some(queue.clone())).await?;
//! device.run_until_idle().await;
//! queue.run_pending();
//! assert_eq!(recorder.sequence_completions().len(), 1);
//! # Ok(())
//! # }
//! ```

pub mod common;
pub mod config;
mod mock_device;
mod recorder;

pub use common::{ErrorConfig, ErrorScenario, MockMode, MockRng, TimingConfig};
pub use config::MockDeviceConfig;
pub use mock_device::{DeviceEvent, MockRemoteDevice};
pub use recorder::{RecordedEvent, RecordingListener};
