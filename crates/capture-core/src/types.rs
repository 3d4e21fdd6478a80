//! Value types shared by the session, the remote device proxy and listeners.
//!
//! The metadata carried by requests and results is opaque to the session: it is
//! a string-keyed map of JSON values that is passed through untouched.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::error::CaptureError;

// =============================================================================
// Identifiers
// =============================================================================

/// Handle assigned by the remote device to a submitted request batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RequestId(pub i32);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Monotonically assigned number of one captured frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FrameNumber(pub u64);

impl FrameNumber {
    /// The frame after this one.
    pub fn next(self) -> Self {
        FrameNumber(self.0 + 1)
    }

    /// Narrow to the 32-bit range listeners receive.
    pub fn to_listener_value(self) -> Result<i32, CaptureError> {
        i32::try_from(self.0).map_err(|_| CaptureError::FrameNumberOverflow(self.0))
    }
}

impl fmt::Display for FrameNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Last frame a request batch will produce, as reported by the remote device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LastFrame {
    /// The request never reached the device.
    NoFramesCaptured,
    /// The request's final frame.
    Frame(FrameNumber),
}

impl LastFrame {
    /// The frame number, if any frame was captured.
    pub fn frame(self) -> Option<FrameNumber> {
        match self {
            LastFrame::NoFramesCaptured => None,
            LastFrame::Frame(frame) => Some(frame),
        }
    }
}

impl fmt::Display for LastFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LastFrame::NoFramesCaptured => write!(f, "none"),
            LastFrame::Frame(frame) => write!(f, "{}", frame),
        }
    }
}

/// Identifier of a configured output stream on the remote device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StreamId(pub i32);

/// An output target that frames are written to.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Surface {
    name: String,
}

impl Surface {
    /// Create a surface identified by name.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    /// Surface name
    pub fn name(&self) -> &str {
        &self.name
    }
}

// =============================================================================
// Metadata
// =============================================================================

/// Opaque key/value settings carried by requests and results.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metadata(BTreeMap<String, serde_json::Value>);

impl Metadata {
    /// Empty metadata.
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up one entry.
    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.0.get(key)
    }

    /// Insert or replace one entry.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) {
        self.0.insert(key.into(), value.into());
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when there are no entries.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Predefined request templates the remote device can fill with defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestTemplate {
    /// Viewfinder preview: high frame rate over quality
    Preview,
    /// Still image capture: quality over frame rate
    StillCapture,
    /// Video recording: stable frame rate
    Record,
    /// Still image while recording
    VideoSnapshot,
    /// Zero shutter lag still capture
    ZeroShutterLag,
    /// Manual control, no automatic processing
    Manual,
}

impl RequestTemplate {
    /// Wire code understood by the remote device.
    pub fn code(self) -> i32 {
        match self {
            RequestTemplate::Preview => 1,
            RequestTemplate::StillCapture => 2,
            RequestTemplate::Record => 3,
            RequestTemplate::VideoSnapshot => 4,
            RequestTemplate::ZeroShutterLag => 5,
            RequestTemplate::Manual => 6,
        }
    }
}

// =============================================================================
// Requests and Results
// =============================================================================

/// One immutable capture request: settings plus the surfaces to fill.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureRequest {
    settings: Metadata,
    targets: Vec<Surface>,
    tag: Option<String>,
}

impl CaptureRequest {
    /// Start a request from template defaults.
    pub fn builder(settings: Metadata) -> CaptureRequestBuilder {
        CaptureRequestBuilder {
            settings,
            targets: Vec::new(),
            tag: None,
        }
    }

    /// Request settings
    pub fn settings(&self) -> &Metadata {
        &self.settings
    }

    /// Output surfaces this request writes to
    pub fn targets(&self) -> &[Surface] {
        &self.targets
    }

    /// Caller supplied tag
    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }
}

/// Builder for [`CaptureRequest`].
#[derive(Debug, Clone)]
pub struct CaptureRequestBuilder {
    settings: Metadata,
    targets: Vec<Surface>,
    tag: Option<String>,
}

impl CaptureRequestBuilder {
    /// Override one setting.
    pub fn set(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.settings.set(key, value);
        self
    }

    /// Add an output surface; adding the same surface twice has no effect.
    pub fn add_target(mut self, surface: Surface) -> Self {
        if !self.targets.contains(&surface) {
            self.targets.push(surface);
        }
        self
    }

    /// Attach a tag that comes back with the request in listener callbacks.
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    /// Finish the request.
    pub fn build(self) -> CaptureRequest {
        CaptureRequest {
            settings: self.settings,
            targets: self.targets,
            tag: self.tag,
        }
    }
}

/// Per-frame bookkeeping attached to every result the device streams back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResultExtras {
    /// Request batch the frame belongs to
    pub request_id: RequestId,
    /// Index of the request inside its batch
    pub subsequence_id: i32,
    /// Frame number
    pub frame_number: FrameNumber,
}

/// A (partial or final) capture result delivered to a listener.
#[derive(Debug, Clone)]
pub struct CaptureResult {
    request: Arc<CaptureRequest>,
    request_id: RequestId,
    frame_number: FrameNumber,
    metadata: Metadata,
}

impl CaptureResult {
    /// Pair result metadata with the request that produced it.
    pub fn new(
        request: Arc<CaptureRequest>,
        request_id: RequestId,
        frame_number: FrameNumber,
        metadata: Metadata,
    ) -> Self {
        Self {
            request,
            request_id,
            frame_number,
            metadata,
        }
    }

    /// The request that produced this result
    pub fn request(&self) -> &CaptureRequest {
        &self.request
    }

    /// Request batch id
    pub fn request_id(&self) -> RequestId {
        self.request_id
    }

    /// Frame number
    pub fn frame_number(&self) -> FrameNumber {
        self.frame_number
    }

    /// Result metadata
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }
}

/// What the remote device returns for an accepted request batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Submission {
    /// Assigned request id
    pub request_id: RequestId,
    /// Last frame of the batch; only meaningful for non-repeating batches
    pub last_frame: LastFrame,
}

// =============================================================================
// Device Errors and State
// =============================================================================

/// Asynchronous error codes streamed back by the remote device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// The device has been disconnected
    Disconnected,
    /// The device encountered a device-level error
    Device,
    /// The remote service encountered an error
    Service,
    /// A code this session does not know
    Unknown(i32),
}

impl ErrorCode {
    /// Decode a raw wire code.
    pub fn from_raw(code: i32) -> Self {
        match code {
            0 => ErrorCode::Disconnected,
            1 => ErrorCode::Device,
            2 => ErrorCode::Service,
            other => ErrorCode::Unknown(other),
        }
    }

    /// Raw wire code.
    pub fn raw(self) -> i32 {
        match self {
            ErrorCode::Disconnected => 0,
            ErrorCode::Device => 1,
            ErrorCode::Service => 2,
            ErrorCode::Unknown(code) => code,
        }
    }
}

/// Session lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionState {
    /// No outputs configured
    Unconfigured,
    /// Outputs configured, no work in flight
    Idle,
    /// Requests in flight
    Active,
    /// Configuring, flushing or stopping a repeating request
    Busy,
    /// Terminal
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SessionState::Unconfigured => "unconfigured",
            SessionState::Idle => "idle",
            SessionState::Active => "active",
            SessionState::Busy => "busy",
            SessionState::Closed => "closed",
        };
        write!(f, "{}", label)
    }
}
