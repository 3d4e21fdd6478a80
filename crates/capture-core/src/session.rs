//! Capture session state machine.
//!
//! [`CaptureSession`] is the caller-facing half of the coordinator. It owns the
//! connection to a [`RemoteDevice`] and all mutable bookkeeping: the
//! [`FrameNumberTracker`], the [`ListenerRegistry`], the [`SequenceReconciler`],
//! the configured outputs and the current repeating request.
//!
//! # Locking
//!
//! All of that state lives behind one `tokio::sync::Mutex`. Every public operation
//! and every [`DeviceCallbacks`] entry point holds it for its whole duration,
//! including the proxy round trip, so request registration and pending-entry
//! bookkeeping are atomic with the identifiers the proxy hands back. Listener code
//! never runs under the lock; notifications are posted to dispatch queues.
//!
//! # State Transitions
//!
//! ```text
//! Unconfigured --configure(>=1 output)--> Idle --submit--> Active --device idle--> Idle
//!      any --configure/flush/stop repeating--> Busy (transient)
//!      any --close/disconnect/fatal error--> Closed (terminal)
//! ```
//!
//! Closing is explicit. Dropping a session without calling [`CaptureSession::close`]
//! leaves the remote device connected.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::dispatch::{DispatchQueue, Dispatcher};
use crate::error::{CaptureError, SessionResult};
use crate::ingress::DeviceCallbacks;
use crate::listener::{CaptureListener, DeviceStateListener};
use crate::proxy::RemoteDevice;
use crate::reconciler::SequenceReconciler;
use crate::registry::{CaptureListenerHolder, ListenerRegistry};
use crate::tracker::FrameNumberTracker;
use crate::types::{
    CaptureRequest, CaptureRequestBuilder, LastFrame, RequestId, RequestTemplate, SessionState,
    StreamId, Surface,
};

// =============================================================================
// Shared State
// =============================================================================

/// Everything guarded by the session lock.
pub(crate) struct SessionCore {
    pub(crate) remote: Option<Arc<dyn RemoteDevice>>,
    pub(crate) state: SessionState,
    pub(crate) idle: bool,
    pub(crate) repeating: Option<RequestId>,
    pub(crate) outputs: BTreeMap<Surface, StreamId>,
    pub(crate) tracker: FrameNumberTracker,
    pub(crate) registry: ListenerRegistry,
    pub(crate) reconciler: SequenceReconciler,
}

impl SessionCore {
    fn new(remote: Arc<dyn RemoteDevice>) -> Self {
        Self {
            remote: Some(remote),
            state: SessionState::Unconfigured,
            idle: true,
            repeating: None,
            outputs: BTreeMap::new(),
            tracker: FrameNumberTracker::new(),
            registry: ListenerRegistry::new(),
            reconciler: SequenceReconciler::new(),
        }
    }

    /// Fire every pending sequence whose bound the tracker has reached.
    pub(crate) fn reconcile(&mut self, dispatcher: &Dispatcher) -> usize {
        let completed = self.tracker.completed_frame_number();
        self.reconciler
            .reconcile(completed, &mut self.registry, dispatcher)
    }

    /// Enqueue a bound for `request_id`, then reconcile against the current frame.
    fn retire_sequence(
        &mut self,
        last_frame: LastFrame,
        request_id: RequestId,
        dispatcher: &Dispatcher,
    ) -> SessionResult<()> {
        self.reconciler
            .enqueue(last_frame, request_id, &mut self.registry, dispatcher)?;
        self.reconcile(dispatcher);
        Ok(())
    }

    /// Drop all bookkeeping without notifying anyone.
    pub(crate) fn clear(&mut self) {
        self.registry.clear();
        self.reconciler.clear();
        self.repeating = None;
    }
}

pub(crate) struct SessionInner {
    pub(crate) camera_id: String,
    pub(crate) dispatcher: Dispatcher,
    pub(crate) state_listener: Arc<dyn DeviceStateListener>,
    pub(crate) device_queue: Arc<dyn DispatchQueue>,
    pub(crate) core: Mutex<SessionCore>,
}

impl SessionInner {
    /// Post a state notification, suppressed if the session closes first.
    pub(crate) fn notify_state<F>(&self, notify: F)
    where
        F: FnOnce(&dyn DeviceStateListener, &str) + Send + 'static,
    {
        let listener = Arc::clone(&self.state_listener);
        let camera_id = self.camera_id.clone();
        self.dispatcher.post(self.device_queue.as_ref(), move || {
            notify(listener.as_ref(), &camera_id)
        });
    }

    /// Post a state notification that is delivered even after close.
    pub(crate) fn notify_state_unguarded<F>(&self, notify: F)
    where
        F: FnOnce(&dyn DeviceStateListener, &str) + Send + 'static,
    {
        let listener = Arc::clone(&self.state_listener);
        let camera_id = self.camera_id.clone();
        self.dispatcher
            .post_unguarded(self.device_queue.as_ref(), move || {
                notify(listener.as_ref(), &camera_id)
            });
    }

    /// The remote device, or `SessionClosed`.
    fn remote(&self, core: &SessionCore) -> SessionResult<Arc<dyn RemoteDevice>> {
        if self.dispatcher.is_closed() {
            return Err(CaptureError::SessionClosed);
        }
        core.remote.clone().ok_or(CaptureError::SessionClosed)
    }

    /// Tear the session down after the frame protocol was violated.
    ///
    /// Returns `err` so callers can write `return Err(inner.abort(core, err).await)`.
    pub(crate) async fn abort(&self, core: &mut SessionCore, err: CaptureError) -> CaptureError {
        error!(camera_id = %self.camera_id, error = %err, "Aborting capture session");
        let first = self.dispatcher.mark_closed();
        core.state = SessionState::Closed;
        core.clear();
        if let Some(remote) = core.remote.take() {
            if let Err(e) = remote.disconnect().await {
                error!(camera_id = %self.camera_id, error = %e, "Failed to disconnect remote device during abort");
            }
        }
        if first {
            self.notify_state_unguarded(|l, id| l.on_closed(id));
        }
        err
    }

    /// Route an operation failure: fatal errors abort the session first.
    async fn fail(&self, core: &mut SessionCore, err: CaptureError) -> CaptureError {
        if err.is_fatal() {
            self.abort(core, err).await
        } else {
            err
        }
    }

    /// Cancel the active repeating request, if any, and retire its sequence.
    async fn stop_repeating_locked(
        &self,
        core: &mut SessionCore,
        remote: &Arc<dyn RemoteDevice>,
    ) -> SessionResult<()> {
        let Some(request_id) = core.repeating.take() else {
            return Ok(());
        };
        let previous = core.state;
        core.state = SessionState::Busy;
        let cancelled = remote.cancel_request(request_id).await;
        core.state = previous;
        match cancelled {
            Ok(last_frame) => {
                debug!(%request_id, %last_frame, "Stopped repeating request");
                core.retire_sequence(last_frame, request_id, &self.dispatcher)
            }
            Err(e) => {
                core.repeating = Some(request_id);
                Err(e.into())
            }
        }
    }

    async fn reconfigure(
        &self,
        core: &mut SessionCore,
        remote: &Arc<dyn RemoteDevice>,
        wanted: &BTreeSet<Surface>,
    ) -> SessionResult<()> {
        self.stop_repeating_locked(core, remote).await?;
        remote.wait_until_idle().await?;

        let stale: Vec<(Surface, StreamId)> = core
            .outputs
            .iter()
            .filter(|(surface, _)| !wanted.contains(*surface))
            .map(|(surface, stream)| (surface.clone(), *stream))
            .collect();
        for (surface, stream) in stale {
            remote.delete_stream(stream).await?;
            core.outputs.remove(&surface);
        }

        for surface in wanted {
            if core.outputs.contains_key(surface) {
                continue;
            }
            let stream = remote.create_stream(surface).await?;
            core.outputs.insert(surface.clone(), stream);
        }
        Ok(())
    }
}

// =============================================================================
// CaptureSession
// =============================================================================

/// Caller-facing handle to one open capture device.
///
/// Cheap to clone; all clones share the same session.
#[derive(Clone)]
pub struct CaptureSession {
    inner: Arc<SessionInner>,
}

impl CaptureSession {
    /// Open a session on an already connected remote device.
    ///
    /// State notifications go to `state_listener` on `device_queue`;
    /// `on_opened` and `on_unconfigured` are posted immediately.
    pub fn open(
        camera_id: impl Into<String>,
        remote: Arc<dyn RemoteDevice>,
        state_listener: Arc<dyn DeviceStateListener>,
        device_queue: Arc<dyn DispatchQueue>,
    ) -> Self {
        let inner = Arc::new(SessionInner {
            camera_id: camera_id.into(),
            dispatcher: Dispatcher::new(),
            state_listener,
            device_queue,
            core: Mutex::new(SessionCore::new(remote)),
        });
        info!(camera_id = %inner.camera_id, "Capture session opened");
        inner.notify_state(|l, id| l.on_opened(id));
        inner.notify_state(|l, id| l.on_unconfigured(id));
        Self { inner }
    }

    /// Ingress handle to give to the remote device for asynchronous signals.
    pub fn callbacks(&self) -> DeviceCallbacks {
        DeviceCallbacks::new(Arc::clone(&self.inner))
    }

    /// Camera identifier
    pub fn camera_id(&self) -> &str {
        &self.inner.camera_id
    }

    /// True once the session was closed, disconnected or aborted.
    pub fn is_closed(&self) -> bool {
        self.inner.dispatcher.is_closed()
    }

    /// Current lifecycle state.
    pub async fn state(&self) -> SessionState {
        if self.is_closed() {
            return SessionState::Closed;
        }
        self.inner.core.lock().await.state
    }

    /// Id of the active repeating request, if any.
    pub async fn repeating_request(&self) -> Option<RequestId> {
        self.inner.core.lock().await.repeating
    }

    /// Surfaces currently configured as outputs.
    pub async fn outputs(&self) -> Vec<Surface> {
        self.inner.core.lock().await.outputs.keys().cloned().collect()
    }

    /// Replace the configured output set.
    ///
    /// Any repeating request is stopped and the device drained before streams are
    /// deleted or created. Ends in `Idle` with at least one output, otherwise in
    /// `Unconfigured`.
    pub async fn configure_outputs(&self, outputs: Vec<Surface>) -> SessionResult<()> {
        let inner = &self.inner;
        let mut guard = inner.core.lock().await;
        let core = &mut *guard;
        let remote = inner.remote(core)?;
        let wanted: BTreeSet<Surface> = outputs.into_iter().collect();

        let previous = core.state;
        core.state = SessionState::Busy;
        inner.notify_state(|l, id| l.on_busy(id));

        if let Err(err) = inner.reconfigure(core, &remote, &wanted).await {
            if !err.is_fatal() {
                core.state = previous;
                warn!(camera_id = %inner.camera_id, error = %err, "Output configuration failed");
            }
            return Err(inner.fail(core, err).await);
        }

        core.idle = true;
        if core.outputs.is_empty() {
            core.state = SessionState::Unconfigured;
            inner.notify_state(|l, id| l.on_unconfigured(id));
        } else {
            core.state = SessionState::Idle;
            inner.notify_state(|l, id| l.on_idle(id));
        }
        info!(camera_id = %inner.camera_id, outputs = core.outputs.len(), "Outputs configured");
        Ok(())
    }

    /// Start a request from the device defaults for `template`.
    pub async fn create_capture_request(
        &self,
        template: RequestTemplate,
    ) -> SessionResult<CaptureRequestBuilder> {
        let guard = self.inner.core.lock().await;
        let remote = self.inner.remote(&guard)?;
        let settings = remote.create_default_request(template).await?;
        Ok(CaptureRequest::builder(settings))
    }

    /// Submit a batch of requests.
    ///
    /// Submitting a repeating batch first stops the current repeating request.
    /// Without a listener nothing is registered; a listener without a queue is
    /// rejected before anything is sent.
    pub async fn submit(
        &self,
        requests: Vec<CaptureRequest>,
        listener: Option<Arc<dyn CaptureListener>>,
        queue: Option<Arc<dyn DispatchQueue>>,
        repeating: bool,
    ) -> SessionResult<RequestId> {
        if requests.is_empty() {
            return Err(CaptureError::EmptyRequestList);
        }
        if listener.is_some() && queue.is_none() {
            return Err(CaptureError::MissingDispatchQueue);
        }

        let inner = &self.inner;
        let mut guard = inner.core.lock().await;
        let core = &mut *guard;
        let remote = inner.remote(core)?;

        if repeating {
            if let Err(err) = inner.stop_repeating_locked(core, &remote).await {
                return Err(inner.fail(core, err).await);
            }
        }

        let submission = remote.submit_request_list(&requests, repeating).await?;
        let request_id = submission.request_id;

        if let (Some(listener), Some(queue)) = (listener, queue) {
            let requests = requests.into_iter().map(Arc::new).collect();
            let holder = CaptureListenerHolder::new(listener, requests, queue, repeating)?;
            core.registry.register(request_id, holder);
        }

        if repeating {
            core.repeating = Some(request_id);
        } else if let Err(err) =
            core.retire_sequence(submission.last_frame, request_id, &inner.dispatcher)
        {
            return Err(inner.fail(core, err).await);
        }

        if core.idle {
            inner.notify_state(|l, id| l.on_active(id));
        }
        core.idle = false;
        if core.state == SessionState::Idle {
            core.state = SessionState::Active;
        }
        debug!(%request_id, last_frame = %submission.last_frame, repeating, "Submitted request batch");
        Ok(request_id)
    }

    /// Submit one request.
    pub async fn capture(
        &self,
        request: CaptureRequest,
        listener: Option<Arc<dyn CaptureListener>>,
        queue: Option<Arc<dyn DispatchQueue>>,
    ) -> SessionResult<RequestId> {
        self.submit(vec![request], listener, queue, false).await
    }

    /// Submit a burst of requests captured back to back.
    pub async fn capture_burst(
        &self,
        requests: Vec<CaptureRequest>,
        listener: Option<Arc<dyn CaptureListener>>,
        queue: Option<Arc<dyn DispatchQueue>>,
    ) -> SessionResult<RequestId> {
        self.submit(requests, listener, queue, false).await
    }

    /// Repeat one request until stopped or replaced.
    pub async fn set_repeating_request(
        &self,
        request: CaptureRequest,
        listener: Option<Arc<dyn CaptureListener>>,
        queue: Option<Arc<dyn DispatchQueue>>,
    ) -> SessionResult<RequestId> {
        self.submit(vec![request], listener, queue, true).await
    }

    /// Repeat a burst until stopped or replaced.
    pub async fn set_repeating_burst(
        &self,
        requests: Vec<CaptureRequest>,
        listener: Option<Arc<dyn CaptureListener>>,
        queue: Option<Arc<dyn DispatchQueue>>,
    ) -> SessionResult<RequestId> {
        self.submit(requests, listener, queue, true).await
    }

    /// Stop the repeating request. No-op when none is active.
    pub async fn stop_repeating(&self) -> SessionResult<()> {
        let inner = &self.inner;
        let mut guard = inner.core.lock().await;
        let core = &mut *guard;
        let remote = inner.remote(core)?;
        if let Err(err) = inner.stop_repeating_locked(core, &remote).await {
            return Err(inner.fail(core, err).await);
        }
        Ok(())
    }

    /// Discard in-flight work as fast as possible.
    ///
    /// With work in flight the session stays `Busy` until the device reports
    /// idle; an already idle session returns to its previous state.
    pub async fn flush(&self) -> SessionResult<()> {
        let inner = &self.inner;
        let mut guard = inner.core.lock().await;
        let core = &mut *guard;
        let remote = inner.remote(core)?;

        let previous = core.state;
        core.state = SessionState::Busy;
        inner.notify_state(|l, id| l.on_busy(id));

        let last_frame = match remote.flush().await {
            Ok(last_frame) => last_frame,
            Err(e) => {
                core.state = previous;
                return Err(e.into());
            }
        };
        if core.idle {
            core.state = previous;
            if previous == SessionState::Unconfigured {
                inner.notify_state(|l, id| l.on_unconfigured(id));
            } else {
                inner.notify_state(|l, id| l.on_idle(id));
            }
        }
        debug!(camera_id = %inner.camera_id, %last_frame, "Flushed device");

        if let Some(request_id) = core.repeating.take() {
            if let Err(err) = core.retire_sequence(last_frame, request_id, &inner.dispatcher) {
                return Err(inner.fail(core, err).await);
            }
        }
        Ok(())
    }

    /// Wait until the device has no outstanding work.
    ///
    /// Fails with [`CaptureError::RepeatingRequestActive`] while a repeating request
    /// is set, since that work never drains.
    pub async fn wait_until_idle(&self) -> SessionResult<()> {
        let guard = self.inner.core.lock().await;
        let remote = self.inner.remote(&guard)?;
        if guard.repeating.is_some() {
            return Err(CaptureError::RepeatingRequestActive);
        }
        remote.wait_until_idle().await?;
        Ok(())
    }

    /// Close the session.
    ///
    /// The closed flag is set and `on_closed` posted before anything else, so
    /// notifications still queued are suppressed and listeners learn of the close
    /// right away. Disconnecting the device waits for the session lock, which an
    /// in-progress operation may hold across a proxy round trip; the returned
    /// future completes only after that. Disconnect failures are logged, not
    /// returned. Calling `close` again does nothing.
    pub async fn close(&self) {
        let inner = &self.inner;
        if inner.dispatcher.mark_closed() {
            inner.notify_state_unguarded(|l, id| l.on_closed(id));
        }

        let mut guard = inner.core.lock().await;
        let core = &mut *guard;
        core.state = SessionState::Closed;
        core.clear();
        let Some(remote) = core.remote.take() else {
            return;
        };
        if let Err(e) = remote.disconnect().await {
            error!(camera_id = %inner.camera_id, error = %e, "Failed to disconnect remote device while closing");
        }
        info!(camera_id = %inner.camera_id, "Capture session closed");
    }
}

impl std::fmt::Debug for CaptureSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureSession")
            .field("camera_id", &self.inner.camera_id)
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::ManualDispatchQueue;
    use crate::error::{DeviceError, DeviceErrorKind, DeviceResult};
    use crate::types::{
        CaptureResult, ErrorCode, FrameNumber, Metadata, ResultExtras, Submission,
    };
    use async_trait::async_trait;
    use parking_lot::Mutex as SyncMutex;
    use tracing_test::traced_test;

    // -------------------------------------------------------------------------
    // Scripted remote device
    // -------------------------------------------------------------------------

    #[derive(Default)]
    struct ScriptState {
        next_request_id: i32,
        next_frame: u64,
        next_stream: i32,
        cancel_result: Option<LastFrame>,
        flush_result: Option<LastFrame>,
        fail_next: Option<DeviceError>,
        disconnect_error: Option<DeviceError>,
        idle_gate: Option<Arc<tokio::sync::Notify>>,
        calls: Vec<String>,
    }

    #[derive(Default)]
    struct ScriptedDevice {
        state: SyncMutex<ScriptState>,
    }

    impl ScriptedDevice {
        fn starting_at(request_id: i32, frame: u64) -> Arc<Self> {
            let device = Self::default();
            {
                let mut state = device.state.lock();
                state.next_request_id = request_id;
                state.next_frame = frame;
            }
            Arc::new(device)
        }

        fn call(&self, name: &str) -> DeviceResult<()> {
            let mut state = self.state.lock();
            state.calls.push(name.to_string());
            match state.fail_next.take() {
                Some(err) => Err(err),
                None => Ok(()),
            }
        }

        fn calls(&self) -> Vec<String> {
            self.state.lock().calls.clone()
        }
    }

    #[async_trait]
    impl RemoteDevice for ScriptedDevice {
        async fn create_stream(&self, surface: &Surface) -> DeviceResult<StreamId> {
            self.call(&format!("create_stream:{}", surface.name()))?;
            let mut state = self.state.lock();
            state.next_stream += 1;
            Ok(StreamId(state.next_stream))
        }

        async fn delete_stream(&self, stream: StreamId) -> DeviceResult<()> {
            self.call(&format!("delete_stream:{}", stream.0))
        }

        async fn create_default_request(&self, template: RequestTemplate) -> DeviceResult<Metadata> {
            self.call("create_default_request")?;
            let mut settings = Metadata::new();
            settings.set("template", template.code());
            Ok(settings)
        }

        async fn submit_request_list(
            &self,
            requests: &[CaptureRequest],
            repeating: bool,
        ) -> DeviceResult<Submission> {
            self.call("submit")?;
            let mut state = self.state.lock();
            let request_id = RequestId(state.next_request_id);
            state.next_request_id += 1;
            let last_frame = if repeating {
                LastFrame::NoFramesCaptured
            } else {
                state.next_frame += requests.len() as u64;
                LastFrame::Frame(FrameNumber(state.next_frame - 1))
            };
            Ok(Submission {
                request_id,
                last_frame,
            })
        }

        async fn cancel_request(&self, request_id: RequestId) -> DeviceResult<LastFrame> {
            self.call(&format!("cancel:{}", request_id))?;
            Ok(self
                .state
                .lock()
                .cancel_result
                .unwrap_or(LastFrame::NoFramesCaptured))
        }

        async fn flush(&self) -> DeviceResult<LastFrame> {
            self.call("flush")?;
            Ok(self
                .state
                .lock()
                .flush_result
                .unwrap_or(LastFrame::NoFramesCaptured))
        }

        async fn wait_until_idle(&self) -> DeviceResult<()> {
            self.call("wait_until_idle")?;
            let gate = self.state.lock().idle_gate.clone();
            if let Some(gate) = gate {
                gate.notified().await;
            }
            Ok(())
        }

        async fn disconnect(&self) -> DeviceResult<()> {
            self.call("disconnect")?;
            match self.state.lock().disconnect_error.take() {
                Some(err) => Err(err),
                None => Ok(()),
            }
        }
    }

    // -------------------------------------------------------------------------
    // Recording listeners
    // -------------------------------------------------------------------------

    #[derive(Default)]
    struct Recorder {
        events: SyncMutex<Vec<String>>,
    }

    impl Recorder {
        fn push(&self, event: String) {
            self.events.lock().push(event);
        }

        fn take(&self) -> Vec<String> {
            std::mem::take(&mut *self.events.lock())
        }
    }

    impl CaptureListener for Recorder {
        fn on_capture_started(&self, request: &CaptureRequest, timestamp: i64) {
            self.push(format!("started:{}:{}", request.tag().unwrap_or("-"), timestamp));
        }

        fn on_capture_partial(&self, _request: &CaptureRequest, result: &CaptureResult) {
            self.push(format!("partial:{}", result.frame_number()));
        }

        fn on_capture_completed(&self, request: &CaptureRequest, result: &CaptureResult) {
            self.push(format!(
                "completed:{}:{}",
                request.tag().unwrap_or("-"),
                result.frame_number()
            ));
        }

        fn on_capture_sequence_completed(&self, request_id: RequestId, last_frame: i32) {
            self.push(format!("sequence:{}:{}", request_id, last_frame));
        }
    }

    impl DeviceStateListener for Recorder {
        fn on_opened(&self, _camera_id: &str) {
            self.push("opened".into());
        }
        fn on_unconfigured(&self, _camera_id: &str) {
            self.push("unconfigured".into());
        }
        fn on_idle(&self, _camera_id: &str) {
            self.push("idle".into());
        }
        fn on_active(&self, _camera_id: &str) {
            self.push("active".into());
        }
        fn on_busy(&self, _camera_id: &str) {
            self.push("busy".into());
        }
        fn on_closed(&self, _camera_id: &str) {
            self.push("closed".into());
        }
        fn on_disconnected(&self, _camera_id: &str) {
            self.push("disconnected".into());
        }
        fn on_error(&self, _camera_id: &str, code: ErrorCode) {
            self.push(format!("error:{}", code.raw()));
        }
    }

    struct Harness {
        session: CaptureSession,
        device: Arc<ScriptedDevice>,
        queue: Arc<ManualDispatchQueue>,
        state: Arc<Recorder>,
        listener: Arc<Recorder>,
    }

    impl Harness {
        fn new(device: Arc<ScriptedDevice>) -> Self {
            let queue = ManualDispatchQueue::new();
            let state = Arc::new(Recorder::default());
            let session = CaptureSession::open("0", device.clone(), state.clone(), queue.clone());
            Self {
                session,
                device,
                queue,
                state,
                listener: Arc::new(Recorder::default()),
            }
        }

        fn listener(&self) -> Option<Arc<dyn CaptureListener>> {
            Some(self.listener.clone())
        }

        fn queue(&self) -> Option<Arc<dyn DispatchQueue>> {
            Some(self.queue.clone())
        }

        fn drain(&self) -> (Vec<String>, Vec<String>) {
            self.queue.run_pending();
            (self.state.take(), self.listener.take())
        }

        async fn result(&self, request_id: i32, subsequence_id: i32, frame: u64) -> SessionResult<()> {
            self.session
                .callbacks()
                .on_result_received(
                    ResultExtras {
                        request_id: RequestId(request_id),
                        subsequence_id,
                        frame_number: FrameNumber(frame),
                    },
                    false,
                    Metadata::new(),
                )
                .await
        }
    }

    fn tagged(tag: &str) -> CaptureRequest {
        CaptureRequest::builder(Metadata::new()).tag(tag).build()
    }

    // -------------------------------------------------------------------------
    // Tests
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_open_posts_opened_then_unconfigured() {
        let h = Harness::new(ScriptedDevice::starting_at(0, 0));
        assert_eq!(h.session.state().await, SessionState::Unconfigured);
        let (state, _) = h.drain();
        assert_eq!(state, vec!["opened", "unconfigured"]);
    }

    #[tokio::test]
    async fn test_burst_completes_once_after_last_frame() {
        let h = Harness::new(ScriptedDevice::starting_at(10, 3));
        h.session
            .configure_outputs(vec![Surface::new("preview")])
            .await
            .unwrap();
        let burst = vec![tagged("a"), tagged("b"), tagged("c")];
        let id = h
            .session
            .capture_burst(burst, h.listener(), h.queue())
            .await
            .unwrap();
        assert_eq!(id, RequestId(10));
        assert_eq!(h.session.state().await, SessionState::Active);

        // Frames 0..=2 belong to work this session never registered.
        for frame in 0..3 {
            h.result(99, 0, frame).await.unwrap();
        }
        h.result(10, 0, 3).await.unwrap();
        h.result(10, 1, 4).await.unwrap();
        let (_, events) = h.drain();
        assert_eq!(events, vec!["completed:a:3", "completed:b:4"]);

        h.result(10, 2, 5).await.unwrap();
        let (_, events) = h.drain();
        assert_eq!(events, vec!["completed:c:5", "sequence:10:5"]);

        h.result(99, 0, 6).await.unwrap();
        let (_, events) = h.drain();
        assert!(events.is_empty());
    }

    #[tokio::test]
    async fn test_replacing_unstarted_repeating_request_completes_with_zero() {
        let h = Harness::new(ScriptedDevice::starting_at(1, 0));
        let first = h
            .session
            .set_repeating_request(tagged("first"), h.listener(), h.queue())
            .await
            .unwrap();
        let second = h
            .session
            .set_repeating_request(tagged("second"), h.listener(), h.queue())
            .await
            .unwrap();

        assert_eq!(h.session.repeating_request().await, Some(second));
        let (_, events) = h.drain();
        assert_eq!(events, vec![format!("sequence:{}:0", first)]);
        assert!(h.device.calls().contains(&format!("cancel:{}", first)));
    }

    #[tokio::test]
    async fn test_stop_repeating_waits_for_bound() {
        let device = ScriptedDevice::starting_at(4, 0);
        device.state.lock().cancel_result = Some(LastFrame::Frame(FrameNumber(1)));
        let h = Harness::new(device);
        let id = h
            .session
            .set_repeating_request(tagged("preview"), h.listener(), h.queue())
            .await
            .unwrap();

        h.result(id.0, 0, 0).await.unwrap();
        h.session.stop_repeating().await.unwrap();
        assert_eq!(h.session.repeating_request().await, None);
        let (_, events) = h.drain();
        assert_eq!(events, vec!["completed:preview:0"]);

        h.result(id.0, 0, 1).await.unwrap();
        let (_, events) = h.drain();
        assert_eq!(events, vec!["completed:preview:1", "sequence:4:1"]);

        // Nothing to stop any more.
        h.session.stop_repeating().await.unwrap();
    }

    #[tokio::test]
    async fn test_stop_repeating_after_bound_already_reached_fires_immediately() {
        let device = ScriptedDevice::starting_at(2, 0);
        device.state.lock().cancel_result = Some(LastFrame::Frame(FrameNumber(0)));
        let h = Harness::new(device);
        let id = h
            .session
            .set_repeating_request(tagged("p"), h.listener(), h.queue())
            .await
            .unwrap();
        h.result(id.0, 0, 0).await.unwrap();
        h.session.stop_repeating().await.unwrap();
        let (_, events) = h.drain();
        assert_eq!(events, vec!["completed:p:0", "sequence:2:0"]);
    }

    #[tokio::test]
    async fn test_close_suppresses_scheduled_notifications() {
        let h = Harness::new(ScriptedDevice::starting_at(0, 0));
        h.session
            .capture(tagged("x"), h.listener(), h.queue())
            .await
            .unwrap();
        h.result(0, 0, 0).await.unwrap();
        assert!(!h.queue.is_empty());

        h.session.close().await;
        h.session.close().await;
        assert!(h.session.is_closed());
        assert_eq!(h.session.state().await, SessionState::Closed);

        let (state, events) = h.drain();
        assert_eq!(state, vec!["closed"]);
        assert!(events.is_empty());
        assert_eq!(
            h.device.calls().iter().filter(|c| *c == "disconnect").count(),
            1
        );
    }

    #[tokio::test]
    async fn test_close_notifies_before_lock_is_released() {
        let gate = Arc::new(tokio::sync::Notify::new());
        let device = ScriptedDevice::starting_at(0, 0);
        device.state.lock().idle_gate = Some(gate.clone());
        let h = Harness::new(device);
        h.drain();

        let session = h.session.clone();
        let configuring =
            tokio::spawn(async move { session.configure_outputs(vec![Surface::new("a")]).await });
        while !h.device.calls().iter().any(|c| c == "wait_until_idle") {
            tokio::task::yield_now().await;
        }

        let session = h.session.clone();
        let closing = tokio::spawn(async move { session.close().await });
        while !h.session.is_closed() {
            tokio::task::yield_now().await;
        }
        tokio::task::yield_now().await;

        let (state, _) = h.drain();
        assert_eq!(state, vec!["closed"]);
        assert!(!closing.is_finished());
        assert!(!h.device.calls().iter().any(|c| c == "disconnect"));

        gate.notify_one();
        let _ = configuring.await.unwrap();
        closing.await.unwrap();
        assert!(h.device.calls().iter().any(|c| c == "disconnect"));
        assert!(h.drain().0.is_empty());
    }

    #[tokio::test]
    async fn test_operations_after_close_fail() {
        let h = Harness::new(ScriptedDevice::starting_at(0, 0));
        h.session.close().await;
        let err = h
            .session
            .capture(tagged("x"), None, None)
            .await
            .unwrap_err();
        assert_eq!(err, CaptureError::SessionClosed);
        assert_eq!(h.session.flush().await, Err(CaptureError::SessionClosed));
        assert_eq!(
            h.session.configure_outputs(vec![Surface::new("a")]).await,
            Err(CaptureError::SessionClosed)
        );
    }

    #[tokio::test]
    #[traced_test]
    async fn test_close_logs_disconnect_failure() {
        let device = ScriptedDevice::starting_at(0, 0);
        device.state.lock().disconnect_error =
            Some(DeviceError::new(DeviceErrorKind::Communication, "link down"));
        let h = Harness::new(device);
        h.session.close().await;

        assert!(logs_contain("Failed to disconnect remote device while closing"));
        let (state, _) = h.drain();
        assert_eq!(state, vec!["closed"]);
    }

    #[tokio::test]
    async fn test_preconditions_are_checked_before_submission() {
        let h = Harness::new(ScriptedDevice::starting_at(0, 0));
        assert_eq!(
            h.session.capture_burst(Vec::new(), None, None).await,
            Err(CaptureError::EmptyRequestList)
        );
        assert_eq!(
            h.session.capture(tagged("x"), h.listener(), None).await,
            Err(CaptureError::MissingDispatchQueue)
        );
        assert!(h.device.calls().is_empty());
    }

    #[tokio::test]
    async fn test_request_without_listener_is_not_registered() {
        let h = Harness::new(ScriptedDevice::starting_at(0, 0));
        let id = h.session.capture(tagged("x"), None, None).await.unwrap();
        h.result(id.0, 0, 0).await.unwrap();
        let (_, events) = h.drain();
        assert!(events.is_empty());
    }

    #[tokio::test]
    async fn test_device_busy_is_retryable() {
        let device = ScriptedDevice::starting_at(0, 0);
        device.state.lock().fail_next = Some(DeviceError::in_use("configuring"));
        let h = Harness::new(device);

        let err = h
            .session
            .capture(tagged("x"), None, None)
            .await
            .unwrap_err();
        assert_eq!(err, CaptureError::DeviceBusy);
        assert!(err.is_retryable());
        assert_eq!(h.session.state().await, SessionState::Unconfigured);

        h.session.capture(tagged("x"), None, None).await.unwrap();
    }

    #[tokio::test]
    async fn test_failed_cancel_keeps_repeating_request() {
        let device = ScriptedDevice::starting_at(0, 0);
        let h = Harness::new(device);
        let id = h
            .session
            .set_repeating_request(tagged("p"), None, None)
            .await
            .unwrap();
        h.device.state.lock().fail_next =
            Some(DeviceError::new(DeviceErrorKind::Timeout, "no answer"));
        let err = h.session.stop_repeating().await.unwrap_err();
        assert!(matches!(err, CaptureError::Device(_)));
        assert_eq!(h.session.repeating_request().await, Some(id));
    }

    #[tokio::test]
    async fn test_wait_until_idle_rejects_repeating() {
        let h = Harness::new(ScriptedDevice::starting_at(0, 0));
        h.session.wait_until_idle().await.unwrap();
        h.session
            .set_repeating_request(tagged("p"), None, None)
            .await
            .unwrap();
        assert_eq!(
            h.session.wait_until_idle().await,
            Err(CaptureError::RepeatingRequestActive)
        );
    }

    #[tokio::test]
    async fn test_configure_outputs_diffs_streams() {
        let h = Harness::new(ScriptedDevice::starting_at(0, 0));
        h.drain();

        h.session
            .configure_outputs(vec![Surface::new("preview"), Surface::new("still")])
            .await
            .unwrap();
        assert_eq!(h.session.state().await, SessionState::Idle);
        let (state, _) = h.drain();
        assert_eq!(state, vec!["busy", "idle"]);

        h.session
            .configure_outputs(vec![Surface::new("preview"), Surface::new("video")])
            .await
            .unwrap();
        let calls = h.device.calls();
        assert!(calls.contains(&"create_stream:preview".to_string()));
        assert!(calls.contains(&"delete_stream:2".to_string()));
        assert!(calls.contains(&"create_stream:video".to_string()));
        assert_eq!(
            calls.iter().filter(|c| *c == "create_stream:preview").count(),
            1
        );

        h.session.configure_outputs(Vec::new()).await.unwrap();
        assert_eq!(h.session.state().await, SessionState::Unconfigured);
        assert!(h.session.outputs().await.is_empty());
        let (state, _) = h.drain();
        assert_eq!(state, vec!["busy", "idle", "busy", "unconfigured"]);
    }

    #[tokio::test]
    async fn test_configure_outputs_failure_restores_state() {
        let h = Harness::new(ScriptedDevice::starting_at(0, 0));
        h.device.state.lock().fail_next = Some(DeviceError::in_use("capture in progress"));
        let err = h
            .session
            .configure_outputs(vec![Surface::new("preview")])
            .await
            .unwrap_err();
        assert_eq!(err, CaptureError::DeviceBusy);
        assert_eq!(h.session.state().await, SessionState::Unconfigured);
    }

    #[tokio::test]
    async fn test_create_capture_request_uses_template_defaults() {
        let h = Harness::new(ScriptedDevice::starting_at(0, 0));
        let request = h
            .session
            .create_capture_request(RequestTemplate::StillCapture)
            .await
            .unwrap()
            .add_target(Surface::new("still"))
            .build();
        assert_eq!(
            request.settings().get("template"),
            Some(&serde_json::json!(2))
        );
    }

    #[tokio::test]
    async fn test_flush_retires_repeating_and_waits_for_idle() {
        let device = ScriptedDevice::starting_at(5, 0);
        device.state.lock().flush_result = Some(LastFrame::Frame(FrameNumber(0)));
        let h = Harness::new(device);
        h.session
            .configure_outputs(vec![Surface::new("preview")])
            .await
            .unwrap();
        let id = h
            .session
            .set_repeating_request(tagged("p"), h.listener(), h.queue())
            .await
            .unwrap();
        h.drain();

        h.session.flush().await.unwrap();
        assert_eq!(h.session.state().await, SessionState::Busy);
        assert_eq!(h.session.repeating_request().await, None);

        h.result(id.0, 0, 0).await.unwrap();
        h.session.callbacks().on_idle().await;
        assert_eq!(h.session.state().await, SessionState::Idle);

        let (state, events) = h.drain();
        assert_eq!(state, vec!["busy", "idle"]);
        assert_eq!(events, vec!["completed:p:0", "sequence:5:0"]);
    }

    #[tokio::test]
    async fn test_flush_on_idle_session_restores_previous_state() {
        let h = Harness::new(ScriptedDevice::starting_at(0, 0));
        h.session
            .configure_outputs(vec![Surface::new("preview")])
            .await
            .unwrap();
        h.drain();

        h.session.flush().await.unwrap();
        assert_eq!(h.session.state().await, SessionState::Idle);
        let (state, _) = h.drain();
        assert_eq!(state, vec!["busy", "idle"]);

        // A late idle signal changes nothing.
        h.session.callbacks().on_idle().await;
        assert_eq!(h.session.state().await, SessionState::Idle);
        assert!(h.drain().0.is_empty());
    }

    #[tokio::test]
    async fn test_submit_without_outputs_stays_unconfigured() {
        let h = Harness::new(ScriptedDevice::starting_at(0, 0));
        h.drain();

        h.session.capture(tagged("x"), None, None).await.unwrap();
        assert_eq!(h.session.state().await, SessionState::Unconfigured);

        h.session.callbacks().on_idle().await;
        assert_eq!(h.session.state().await, SessionState::Unconfigured);
        let (state, _) = h.drain();
        assert_eq!(state, vec!["active", "idle"]);
    }

    #[tokio::test]
    async fn test_flush_with_work_in_flight_without_outputs_settles_unconfigured() {
        let h = Harness::new(ScriptedDevice::starting_at(0, 0));
        h.session.capture(tagged("x"), None, None).await.unwrap();
        h.drain();

        h.session.flush().await.unwrap();
        assert_eq!(h.session.state().await, SessionState::Busy);
        h.session.callbacks().on_idle().await;
        assert_eq!(h.session.state().await, SessionState::Unconfigured);
    }

    #[tokio::test]
    async fn test_idle_notification_only_on_transition() {
        let h = Harness::new(ScriptedDevice::starting_at(0, 0));
        h.session
            .configure_outputs(vec![Surface::new("preview")])
            .await
            .unwrap();
        h.drain();

        h.session.capture(tagged("x"), None, None).await.unwrap();
        h.session.capture(tagged("y"), None, None).await.unwrap();
        h.session.callbacks().on_idle().await;
        h.session.callbacks().on_idle().await;

        let (state, _) = h.drain();
        assert_eq!(state, vec!["active", "idle"]);
        assert_eq!(h.session.state().await, SessionState::Idle);
    }

    #[tokio::test]
    async fn test_out_of_order_result_aborts_session() {
        let h = Harness::new(ScriptedDevice::starting_at(0, 0));
        h.session
            .capture_burst(vec![tagged("a"), tagged("b")], h.listener(), h.queue())
            .await
            .unwrap();

        let err = h.result(0, 1, 1).await.unwrap_err();
        assert_eq!(
            err,
            CaptureError::FrameOutOfOrder {
                received: 1,
                expected: 0
            }
        );
        assert!(h.session.is_closed());
        assert!(h.device.calls().contains(&"disconnect".to_string()));

        let (state, events) = h.drain();
        assert_eq!(state, vec!["closed"]);
        assert!(events.is_empty());

        // Already closed by the abort; nothing more is posted.
        h.session.close().await;
        let (state, _) = h.drain();
        assert!(state.is_empty());
    }
}
