//! Listeners that record what they are told, for assertions in tests and demos.

use capture_core::{
    CaptureListener, CaptureRequest, CaptureResult, DeviceStateListener, ErrorCode, FrameNumber,
    RequestId,
};
use parking_lot::Mutex;

/// A notification observed by a [`RecordingListener`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordedEvent {
    /// `on_capture_started`
    Started {
        /// Request tag
        tag: Option<String>,
        /// Sensor timestamp
        timestamp: i64,
    },
    /// `on_capture_partial`
    Partial {
        /// Batch id
        request_id: RequestId,
        /// Frame number
        frame: FrameNumber,
    },
    /// `on_capture_completed`
    Completed {
        /// Batch id
        request_id: RequestId,
        /// Request tag
        tag: Option<String>,
        /// Frame number
        frame: FrameNumber,
    },
    /// `on_capture_sequence_completed`
    SequenceCompleted {
        /// Batch id
        request_id: RequestId,
        /// Last frame of the batch
        last_frame: i32,
    },
    /// `on_opened`
    Opened,
    /// `on_unconfigured`
    Unconfigured,
    /// `on_idle`
    Idle,
    /// `on_active`
    Active,
    /// `on_busy`
    Busy,
    /// `on_closed`
    Closed,
    /// `on_disconnected`
    Disconnected,
    /// `on_error`
    Error(ErrorCode),
}

/// Records every notification in arrival order.
///
/// Implements both listener capability sets so one recorder can observe a whole
/// session.
#[derive(Debug, Default)]
pub struct RecordingListener {
    events: Mutex<Vec<RecordedEvent>>,
}

impl RecordingListener {
    /// Empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, event: RecordedEvent) {
        self.events.lock().push(event);
    }

    /// Snapshot of everything recorded so far.
    pub fn events(&self) -> Vec<RecordedEvent> {
        self.events.lock().clone()
    }

    /// Remove and return everything recorded so far.
    pub fn take(&self) -> Vec<RecordedEvent> {
        std::mem::take(&mut *self.events.lock())
    }

    /// Sequence completions, in order.
    pub fn sequence_completions(&self) -> Vec<(RequestId, i32)> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                RecordedEvent::SequenceCompleted {
                    request_id,
                    last_frame,
                } => Some((*request_id, *last_frame)),
                _ => None,
            })
            .collect()
    }

    /// Frame numbers of completed results, in order.
    pub fn completed_frames(&self) -> Vec<FrameNumber> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                RecordedEvent::Completed { frame, .. } => Some(*frame),
                _ => None,
            })
            .collect()
    }
}

impl CaptureListener for RecordingListener {
    fn on_capture_started(&self, request: &CaptureRequest, timestamp: i64) {
        self.record(RecordedEvent::Started {
            tag: request.tag().map(str::to_owned),
            timestamp,
        });
    }

    fn on_capture_partial(&self, _request: &CaptureRequest, result: &CaptureResult) {
        self.record(RecordedEvent::Partial {
            request_id: result.request_id(),
            frame: result.frame_number(),
        });
    }

    fn on_capture_completed(&self, request: &CaptureRequest, result: &CaptureResult) {
        self.record(RecordedEvent::Completed {
            request_id: result.request_id(),
            tag: request.tag().map(str::to_owned),
            frame: result.frame_number(),
        });
    }

    fn on_capture_sequence_completed(&self, request_id: RequestId, last_frame: i32) {
        self.record(RecordedEvent::SequenceCompleted {
            request_id,
            last_frame,
        });
    }
}

impl DeviceStateListener for RecordingListener {
    fn on_opened(&self, _camera_id: &str) {
        self.record(RecordedEvent::Opened);
    }

    fn on_unconfigured(&self, _camera_id: &str) {
        self.record(RecordedEvent::Unconfigured);
    }

    fn on_idle(&self, _camera_id: &str) {
        self.record(RecordedEvent::Idle);
    }

    fn on_active(&self, _camera_id: &str) {
        self.record(RecordedEvent::Active);
    }

    fn on_busy(&self, _camera_id: &str) {
        self.record(RecordedEvent::Busy);
    }

    fn on_closed(&self, _camera_id: &str) {
        self.record(RecordedEvent::Closed);
    }

    fn on_disconnected(&self, _camera_id: &str) {
        self.record(RecordedEvent::Disconnected);
    }

    fn on_error(&self, _camera_id: &str, code: ErrorCode) {
        self.record(RecordedEvent::Error(code));
    }
}
