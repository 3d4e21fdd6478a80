//! Callback ingress.
//!
//! [`DeviceCallbacks`] is the only way a [`crate::RemoteDevice`] feeds asynchronous
//! signals back into a session. Each entry point takes the session lock, updates the
//! tracker, registry and reconciler, and posts whatever notifications follow. Signals
//! that arrive after the session closed are dropped.

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::SessionResult;
use crate::session::{SessionCore, SessionInner};
use crate::types::{
    CaptureResult, ErrorCode, FrameNumber, Metadata, RequestId, ResultExtras, SessionState,
};

/// Handle the remote device uses to deliver results, errors and idle signals.
#[derive(Clone)]
pub struct DeviceCallbacks {
    inner: Arc<SessionInner>,
}

impl DeviceCallbacks {
    pub(crate) fn new(inner: Arc<SessionInner>) -> Self {
        Self { inner }
    }

    /// Camera the callbacks feed into
    pub fn camera_id(&self) -> &str {
        &self.inner.camera_id
    }

    /// The device reported an error.
    ///
    /// `frame` is the frame the error is attributed to; `None` for errors that
    /// concern the device as a whole. `Disconnected` closes the session.
    pub async fn on_error(&self, code: ErrorCode, frame: Option<FrameNumber>) -> SessionResult<()> {
        let inner = &self.inner;
        let mut guard = inner.core.lock().await;
        if inner.dispatcher.is_closed() {
            return Ok(());
        }
        let core = &mut *guard;

        if let Some(frame) = frame {
            if let Err(err) = core.tracker.advance(frame, true) {
                return Err(inner.abort(core, err).await);
            }
        }

        match code {
            ErrorCode::Disconnected => {
                self.disconnected(core);
                return Ok(());
            }
            ErrorCode::Device | ErrorCode::Service => {
                debug!(camera_id = %inner.camera_id, code = code.raw(), frame_number = ?frame, "Device error");
                inner.notify_state(move |l, id| l.on_error(id, code));
            }
            ErrorCode::Unknown(raw) => {
                warn!(camera_id = %inner.camera_id, code = raw, "Unknown device error code, reporting as device error");
                inner.notify_state(|l, id| l.on_error(id, ErrorCode::Device));
            }
        }

        core.reconcile(&inner.dispatcher);
        Ok(())
    }

    fn disconnected(&self, core: &mut SessionCore) {
        let inner = &self.inner;
        info!(camera_id = %inner.camera_id, "Remote device disconnected");
        inner.dispatcher.mark_closed();
        core.state = SessionState::Closed;
        core.clear();
        core.remote = None;
        inner.notify_state_unguarded(|l, id| l.on_disconnected(id));
    }

    /// The device finished all outstanding work.
    pub async fn on_idle(&self) {
        let inner = &self.inner;
        let mut core = inner.core.lock().await;
        if inner.dispatcher.is_closed() {
            return;
        }
        let was_idle = core.idle;
        core.idle = true;
        if matches!(core.state, SessionState::Active | SessionState::Busy) {
            core.state = if core.outputs.is_empty() {
                SessionState::Unconfigured
            } else {
                SessionState::Idle
            };
        }
        if !was_idle {
            inner.notify_state(|l, id| l.on_idle(id));
        }
    }

    /// Exposure started for request `subsequence_id` of batch `request_id`.
    pub async fn on_capture_started(
        &self,
        request_id: RequestId,
        subsequence_id: i32,
        timestamp: i64,
    ) -> SessionResult<()> {
        let inner = &self.inner;
        let core = inner.core.lock().await;
        if inner.dispatcher.is_closed() {
            return Ok(());
        }
        let Some(holder) = core.registry.lookup(request_id) else {
            return Ok(());
        };
        let request = holder.sub_request(subsequence_id)?;
        let listener = Arc::clone(holder.listener());
        inner.dispatcher.post(holder.queue().as_ref(), move || {
            listener.on_capture_started(&request, timestamp);
        });
        Ok(())
    }

    /// A partial or final result arrived.
    ///
    /// A final result advances the frame tracker even when nobody listens for this
    /// batch, since other batches complete against the same counter.
    pub async fn on_result_received(
        &self,
        extras: ResultExtras,
        is_partial: bool,
        metadata: Metadata,
    ) -> SessionResult<()> {
        let inner = &self.inner;
        let mut guard = inner.core.lock().await;
        if inner.dispatcher.is_closed() {
            return Ok(());
        }
        let core = &mut *guard;
        let ResultExtras {
            request_id,
            subsequence_id,
            frame_number,
        } = extras;

        if !is_partial {
            if let Err(err) = core.tracker.advance(frame_number, false) {
                return Err(inner.abort(core, err).await);
            }
        }

        let outcome = match core.registry.lookup(request_id) {
            None => Ok(()),
            Some(holder) => holder.sub_request(subsequence_id).map(|request| {
                let listener = Arc::clone(holder.listener());
                let result = CaptureResult::new(Arc::clone(&request), request_id, frame_number, metadata);
                inner.dispatcher.post(holder.queue().as_ref(), move || {
                    if is_partial {
                        listener.on_capture_partial(&request, &result);
                    } else {
                        listener.on_capture_completed(&request, &result);
                    }
                });
            }),
        };

        if !is_partial {
            core.reconcile(&inner.dispatcher);
        }
        outcome
    }
}

impl std::fmt::Debug for DeviceCallbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceCallbacks")
            .field("camera_id", &self.inner.camera_id)
            .finish()
    }
}
