//! Error types for the capture session.
//!
//! This module defines the primary error type, `CaptureError`, returned by every
//! synchronous session operation and by the callback ingress. Using the `thiserror`
//! crate, it provides a centralized way to tell apart the different failure classes
//! a caller has to react to differently.
//!
//! ## Error Hierarchy
//!
//! - **Precondition errors** (`SessionClosed`, `EmptyRequestList`, `MissingDispatchQueue`,
//!   `SubsequenceOutOfRange`, `RepeatingRequestActive`): the operation was invoked in a
//!   state or with arguments that can never succeed. No state is mutated.
//! - **Contention** (`DeviceBusy`): the remote device is in use by an outstanding
//!   operation. The caller may retry once that operation completes.
//! - **Device errors** (`Device`): any other failure reported by the remote device proxy,
//!   propagated unchanged.
//! - **Invariant violations** (`FrameOutOfOrder`, `FrameNumberOverflow`): the remote side
//!   broke the frame-numbering protocol. These are fatal; the session is aborted when one
//!   is detected.
//!
//! The remote device proxy reports failures through [`DeviceError`], a structured error
//! carrying a [`DeviceErrorKind`] category.

use thiserror::Error;

// =============================================================================
// Device Errors
// =============================================================================

/// Category of a failure reported by the remote device proxy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceErrorKind {
    /// The device is in use by another outstanding operation.
    InUse,
    /// The device has been disconnected.
    Disconnected,
    /// Transport failure talking to the remote service.
    Communication,
    /// The device itself reported a fault.
    Hardware,
    /// The remote call did not complete in time.
    Timeout,
    /// The device rejected an argument.
    InvalidParameter,
    /// Anything else.
    Unknown,
}

impl std::fmt::Display for DeviceErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            DeviceErrorKind::InUse => "in_use",
            DeviceErrorKind::Disconnected => "disconnected",
            DeviceErrorKind::Communication => "communication",
            DeviceErrorKind::Hardware => "hardware",
            DeviceErrorKind::Timeout => "timeout",
            DeviceErrorKind::InvalidParameter => "invalid_parameter",
            DeviceErrorKind::Unknown => "unknown",
        };
        write!(f, "{}", label)
    }
}

/// Structured error returned by a [`crate::RemoteDevice`] call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Remote device {kind} error: {message}")]
pub struct DeviceError {
    /// Failure category
    pub kind: DeviceErrorKind,
    /// Human readable detail from the device
    pub message: String,
}

impl DeviceError {
    /// Create a device error of the given kind.
    pub fn new(kind: DeviceErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Shorthand for the "device busy" condition.
    pub fn in_use(message: impl Into<String>) -> Self {
        Self::new(DeviceErrorKind::InUse, message)
    }

    /// Shorthand for a disconnected device.
    pub fn disconnected(message: impl Into<String>) -> Self {
        Self::new(DeviceErrorKind::Disconnected, message)
    }

    /// True when the device reported it is busy with another operation.
    pub fn is_in_use(&self) -> bool {
        self.kind == DeviceErrorKind::InUse
    }
}

/// Result alias for remote device proxy calls.
pub type DeviceResult<T> = std::result::Result<T, DeviceError>;

// =============================================================================
// Session Errors
// =============================================================================

/// Convenience alias for results using the session error type.
pub type SessionResult<T> = std::result::Result<T, CaptureError>;

/// Primary error type for the capture session.
///
/// # Error Categories
///
/// 1. **Precondition Errors** - `SessionClosed`, `EmptyRequestList`, `MissingDispatchQueue`,
///    `SubsequenceOutOfRange`, `RepeatingRequestActive`
///    - Surfaced synchronously, nothing was changed
///    - Recovery: fix the calling code
///
/// 2. **Contention** - `DeviceBusy`
///    - The device was busy with another operation
///    - Recovery: retry after the current operation completes
///
/// 3. **Device Errors** - `Device`
///    - Propagated unchanged from the remote device proxy
///
/// 4. **Invariant Violations** - `FrameOutOfOrder`, `FrameNumberOverflow`
///    - The remote side broke the frame numbering protocol
///    - The session has already been aborted when one of these is returned
///
/// # Example
///
/// ```rust
/// use capture_core::{CaptureError, DeviceError};
///
/// let err: CaptureError = DeviceError::in_use("configure in progress").into();
/// assert!(err.is_retryable());
/// assert!(!err.is_fatal());
/// ```
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    /// Operation invoked after the session was closed.
    #[error("Capture session was already closed")]
    SessionClosed,

    /// A burst submission with no requests.
    #[error("Request list is empty")]
    EmptyRequestList,

    /// A listener was supplied without a dispatch queue to deliver on.
    #[error("A capture listener requires a dispatch queue")]
    MissingDispatchQueue,

    /// Subsequence index does not address a request in the submitted batch.
    ///
    /// Raised both for negative indices and for indices past the end of the batch.
    #[error("Subsequence index {index} is out of range for a batch of {len} request(s)")]
    SubsequenceOutOfRange {
        /// Requested index
        index: i32,
        /// Number of requests in the batch
        len: usize,
    },

    /// `wait_until_idle` invoked while a repeating request is still running.
    #[error("Active repeating request ongoing")]
    RepeatingRequestActive,

    /// The remote device is busy with an outstanding operation.
    ///
    /// **Error Type**: Transient - resolves when the current operation completes.
    ///
    /// **Recovery Strategy**: Wait for the operation to finish, then retry.
    #[error("The device is currently busy; retry once the previous operation completes")]
    DeviceBusy,

    /// Any other failure reported by the remote device.
    #[error("{0}")]
    Device(DeviceError),

    /// A non-error frame arrived that is not the next frame to resolve.
    ///
    /// The remote device guarantees non-error results are delivered in frame order, so
    /// this indicates a protocol bug. Fatal.
    #[error("Result frame number {received} arrived out of order, expected {expected}")]
    FrameOutOfOrder {
        /// Frame number delivered by the device
        received: u64,
        /// Frame number the tracker required
        expected: u64,
    },

    /// A last-frame bound does not fit the listener's 32-bit range. Fatal.
    #[error("Last frame number {0} cannot be represented as a 32-bit value")]
    FrameNumberOverflow(u64),
}

impl CaptureError {
    /// True for invariant violations that abort the session.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            CaptureError::FrameOutOfOrder { .. } | CaptureError::FrameNumberOverflow(_)
        )
    }

    /// True when the caller may retry the same operation later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CaptureError::DeviceBusy)
    }
}

impl From<DeviceError> for CaptureError {
    fn from(err: DeviceError) -> Self {
        if err.is_in_use() {
            CaptureError::DeviceBusy
        } else {
            CaptureError::Device(err)
        }
    }
}
