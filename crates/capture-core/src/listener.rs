//! Listener capability sets.
//!
//! Listener code never runs under the session lock: every notification is posted
//! to a [`crate::DispatchQueue`] and invoked later, in posting order for that queue.
//! All methods have empty default bodies so implementors only override what they
//! care about.

use crate::types::{CaptureRequest, CaptureResult, ErrorCode, RequestId};

/// Per-request notifications for a submitted capture batch.
///
/// There is no sequence-aborted callback: no session path aborts a sequence.
/// Each registered batch ends in `on_capture_sequence_completed`, or is dropped
/// without notice when the session closes.
pub trait CaptureListener: Send + Sync {
    /// The device began exposing the frame for `request`.
    fn on_capture_started(&self, request: &CaptureRequest, timestamp: i64) {
        let _ = (request, timestamp);
    }

    /// Part of the result for `request` is available.
    fn on_capture_partial(&self, request: &CaptureRequest, result: &CaptureResult) {
        let _ = (request, result);
    }

    /// The final result for `request` is available.
    fn on_capture_completed(&self, request: &CaptureRequest, result: &CaptureResult) {
        let _ = (request, result);
    }

    /// Every frame of the batch `request_id` has been resolved.
    ///
    /// Fired at most once per request id. `last_frame` is `0` when the batch was
    /// retired before any of its frames reached the device.
    fn on_capture_sequence_completed(&self, request_id: RequestId, last_frame: i32) {
        let _ = (request_id, last_frame);
    }
}

/// Session-level lifecycle notifications.
///
/// `on_closed` and `on_disconnected` are delivered even though the session is
/// closed by the time they run; everything else is suppressed once closed.
pub trait DeviceStateListener: Send + Sync {
    /// The session is connected to its remote device.
    fn on_opened(&self, camera_id: &str) {
        let _ = camera_id;
    }

    /// No outputs are configured.
    fn on_unconfigured(&self, camera_id: &str) {
        let _ = camera_id;
    }

    /// Outputs are configured and no requests are in flight.
    fn on_idle(&self, camera_id: &str) {
        let _ = camera_id;
    }

    /// Requests have been submitted.
    fn on_active(&self, camera_id: &str) {
        let _ = camera_id;
    }

    /// The session is reconfiguring or flushing.
    fn on_busy(&self, camera_id: &str) {
        let _ = camera_id;
    }

    /// The session was closed.
    fn on_closed(&self, camera_id: &str) {
        let _ = camera_id;
    }

    /// The remote device went away.
    fn on_disconnected(&self, camera_id: &str) {
        let _ = camera_id;
    }

    /// The remote device or service reported an error.
    fn on_error(&self, camera_id: &str, code: ErrorCode) {
        let _ = (camera_id, code);
    }
}
