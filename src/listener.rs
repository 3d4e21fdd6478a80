//! Listener that logs every notification and keeps running totals.

use capture_core::{
    CaptureListener, CaptureRequest, CaptureResult, DeviceStateListener, ErrorCode, RequestId,
};
use serde::Serialize;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Totals observed by a [`LoggingListener`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunStats {
    /// `on_capture_started` count
    pub started: usize,
    /// Partial results received
    pub partials: usize,
    /// Final results received
    pub completed: usize,
    /// Frame or device errors reported to the state listener
    pub errors: usize,
    /// `(request_id, last_frame)` per finished sequence, in arrival order
    pub sequences: Vec<(RequestId, i32)>,
    /// True once the session reported closed or disconnected
    pub closed: bool,
}

impl RunStats {
    /// Last frame reported for `request_id`, if its sequence has finished.
    pub fn sequence(&self, request_id: RequestId) -> Option<i32> {
        self.sequences
            .iter()
            .find(|(id, _)| *id == request_id)
            .map(|(_, last)| *last)
    }
}

/// Logs capture and state notifications through `tracing`.
#[derive(Debug)]
pub struct LoggingListener {
    stats: watch::Sender<RunStats>,
}

impl Default for LoggingListener {
    fn default() -> Self {
        Self::new()
    }
}

impl LoggingListener {
    /// Listener with zeroed totals.
    pub fn new() -> Self {
        let (stats, _) = watch::channel(RunStats::default());
        Self { stats }
    }

    /// Snapshot of the totals.
    pub fn stats(&self) -> RunStats {
        self.stats.borrow().clone()
    }

    /// Wait until `done` holds for the totals, or `timeout` elapses.
    ///
    /// Returns the totals that satisfied `done`, or `None` on timeout.
    pub async fn wait_for<F>(&self, timeout: Duration, mut done: F) -> Option<RunStats>
    where
        F: FnMut(&RunStats) -> bool,
    {
        let mut rx = self.stats.subscribe();
        let waited = tokio::time::timeout(timeout, rx.wait_for(|s| done(s))).await;
        match waited {
            Ok(Ok(stats)) => Some(stats.clone()),
            _ => None,
        }
    }

    fn update(&self, f: impl FnOnce(&mut RunStats)) {
        self.stats.send_modify(f);
    }
}

impl CaptureListener for LoggingListener {
    fn on_capture_started(&self, request: &CaptureRequest, timestamp: i64) {
        debug!(tag = request.tag(), timestamp, "Capture started");
        self.update(|s| s.started += 1);
    }

    fn on_capture_partial(&self, _request: &CaptureRequest, result: &CaptureResult) {
        debug!(
            request_id = %result.request_id(),
            frame_number = %result.frame_number(),
            "Partial result"
        );
        self.update(|s| s.partials += 1);
    }

    fn on_capture_completed(&self, request: &CaptureRequest, result: &CaptureResult) {
        info!(
            request_id = %result.request_id(),
            frame_number = %result.frame_number(),
            tag = request.tag(),
            entries = result.metadata().len(),
            "Capture completed"
        );
        self.update(|s| s.completed += 1);
    }

    fn on_capture_sequence_completed(&self, request_id: RequestId, last_frame: i32) {
        info!(%request_id, last_frame, "Capture sequence completed");
        self.update(|s| s.sequences.push((request_id, last_frame)));
    }
}

impl DeviceStateListener for LoggingListener {
    fn on_opened(&self, camera_id: &str) {
        info!(camera_id, "Camera opened");
    }

    fn on_unconfigured(&self, camera_id: &str) {
        debug!(camera_id, "Camera unconfigured");
    }

    fn on_idle(&self, camera_id: &str) {
        debug!(camera_id, "Camera idle");
    }

    fn on_active(&self, camera_id: &str) {
        debug!(camera_id, "Camera active");
    }

    fn on_busy(&self, camera_id: &str) {
        debug!(camera_id, "Camera busy");
    }

    fn on_closed(&self, camera_id: &str) {
        info!(camera_id, "Camera closed");
        self.update(|s| s.closed = true);
    }

    fn on_disconnected(&self, camera_id: &str) {
        warn!(camera_id, "Camera disconnected");
        self.update(|s| s.closed = true);
    }

    fn on_error(&self, camera_id: &str, code: ErrorCode) {
        warn!(camera_id, code = code.raw(), "Camera error");
        self.update(|s| s.errors += 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_wait_for_sees_later_updates() {
        let listener = std::sync::Arc::new(LoggingListener::new());
        let notifier = listener.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            notifier.on_capture_sequence_completed(RequestId(3), 7);
        });

        let stats = listener
            .wait_for(Duration::from_secs(5), |s| s.sequence(RequestId(3)).is_some())
            .await
            .unwrap();
        assert_eq!(stats.sequence(RequestId(3)), Some(7));
    }

    #[tokio::test]
    async fn test_wait_for_times_out() {
        let listener = LoggingListener::new();
        let stats = listener
            .wait_for(Duration::from_millis(10), |s| s.completed > 0)
            .await;
        assert!(stats.is_none());
    }

    #[test]
    fn test_state_errors_are_counted() {
        let listener = LoggingListener::new();
        listener.on_error("0", ErrorCode::Device);
        listener.on_disconnected("0");
        let stats = listener.stats();
        assert_eq!(stats.errors, 1);
        assert!(stats.closed);
    }
}
