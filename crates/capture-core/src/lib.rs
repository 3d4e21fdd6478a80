//! `capture-core`
//!
//! Session coordination for an imaging device driven through an asynchronous remote
//! service. Callers submit single, burst and repeating capture requests; the remote
//! device streams back results, partial results, errors and idle signals in whatever
//! order it produces them; this crate turns that stream into ordered, exactly-once
//! listener notifications.
//!
//! ## Components
//!
//! - [`FrameNumberTracker`]: folds per-frame result/error signals into one monotonic
//!   "last completed frame" counter
//! - [`ListenerRegistry`]: in-flight request ids and the listeners waiting on them
//! - [`SequenceReconciler`]: decides when each batch's capture sequence is complete
//! - [`CaptureSession`]: the Unconfigured / Idle / Active / Busy / Closed state machine
//! - [`DeviceCallbacks`]: the ingress the remote device calls into
//! - [`RemoteDevice`]: the proxy trait a device implementation provides
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use capture_core::{
//!     CaptureListener, CaptureSession, DeviceStateListener, RemoteDevice, RequestId,
//!     RequestTemplate, SessionResult, Surface, TokioDispatchQueue,
//! };
//!
//! struct Printer;
//! impl CaptureListener for Printer {
//!     fn on_capture_sequence_completed(&self, request_id: RequestId, last_frame: i32) {
//!         println!("request {request_id} done at frame {last_frame}");
//!     }
//! }
//! impl DeviceStateListener for Printer {}
//!
//! # async fn example(remote: Arc<dyn RemoteDevice>) -> SessionResult<()> {
//! let queue = TokioDispatchQueue::spawn();
//! let session = CaptureSession::open("0", remote, Arc::new(Printer), queue.clone());
//! session.configure_outputs(vec![Surface::new("preview")]).await?;
//!
//! let request = session
//!     .create_capture_request(RequestTemplate::Preview)
//!     .await?
//!     .add_target(Surface::new("preview"))
//!     .build();
//! session.capture(request, Some(Arc::new(Printer)), Some(queue)).await?;
//! session.close().await;
//! # Ok(())
//! # }
//! ```

pub mod dispatch;
pub mod error;
pub mod ingress;
pub mod listener;
pub mod proxy;
pub mod reconciler;
pub mod registry;
pub mod session;
pub mod tracker;
pub mod types;

pub use dispatch::{DispatchQueue, Dispatcher, ManualDispatchQueue, Task, TokioDispatchQueue};
pub use error::{
    CaptureError, DeviceError, DeviceErrorKind, DeviceResult, SessionResult,
};
pub use ingress::DeviceCallbacks;
pub use listener::{CaptureListener, DeviceStateListener};
pub use proxy::RemoteDevice;
pub use reconciler::{PendingSequence, SequenceReconciler};
pub use registry::{CaptureListenerHolder, ListenerRegistry};
pub use session::CaptureSession;
pub use tracker::FrameNumberTracker;
pub use types::{
    CaptureRequest, CaptureRequestBuilder, CaptureResult, ErrorCode, FrameNumber, LastFrame,
    Metadata, RequestId, RequestTemplate, ResultExtras, SessionState, StreamId, Submission,
    Surface,
};
