//! Remote device proxy interface.
//!
//! The session never talks to hardware directly. Everything that crosses the
//! process or service boundary goes through [`RemoteDevice`]: stream lifecycle,
//! default request settings, request submission and cancellation, flushing and
//! disconnection. Asynchronous results come back the other way through
//! [`crate::DeviceCallbacks`].
//!
//! Every call fails with a [`DeviceError`]. The `InUse` kind is the distinguishable
//! "device busy" condition and surfaces to session callers as
//! [`crate::CaptureError::DeviceBusy`]; every other kind is propagated unchanged.

use async_trait::async_trait;

use crate::error::DeviceResult;
use crate::types::{
    CaptureRequest, LastFrame, Metadata, RequestId, RequestTemplate, StreamId, Submission,
    Surface,
};

//==============================================================================
// Remote Device Trait
//==============================================================================

/// Proxy to a remote capture device.
///
/// Implementations must stop delivering callbacks for a session once
/// [`disconnect`](RemoteDevice::disconnect) has returned.
#[async_trait]
pub trait RemoteDevice: Send + Sync {
    /// Create an output stream writing to `surface`.
    async fn create_stream(&self, surface: &Surface) -> DeviceResult<StreamId>;

    /// Tear down a previously created stream.
    async fn delete_stream(&self, stream: StreamId) -> DeviceResult<()>;

    /// Default settings for a request template.
    async fn create_default_request(&self, template: RequestTemplate) -> DeviceResult<Metadata>;

    /// Submit a batch of requests.
    ///
    /// The returned `last_frame` bound is only meaningful for non-repeating
    /// batches; a repeating batch is bounded when it is cancelled.
    async fn submit_request_list(
        &self,
        requests: &[CaptureRequest],
        repeating: bool,
    ) -> DeviceResult<Submission>;

    /// Cancel a repeating batch and return the last frame it will produce.
    async fn cancel_request(&self, request_id: RequestId) -> DeviceResult<LastFrame>;

    /// Drop all queued work as fast as possible and return the last frame that
    /// the repeating batch (if any) will produce.
    async fn flush(&self) -> DeviceResult<LastFrame>;

    /// Resolve once no repeating work is outstanding.
    async fn wait_until_idle(&self) -> DeviceResult<()>;

    /// Release the device.
    async fn disconnect(&self) -> DeviceResult<()>;
}
