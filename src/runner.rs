//! Drives a [`CaptureSession`] against the mock device from application config.

use crate::config::AppConfig;
use crate::listener::{LoggingListener, RunStats};
use anyhow::{anyhow, bail, Context, Result};
use capture_core::{
    CaptureListener, CaptureRequest, CaptureSession, DispatchQueue, RequestId, RequestTemplate,
    SessionState, Surface, TokioDispatchQueue,
};
use capture_driver_mock::MockRemoteDevice;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument};

/// How long to wait for outstanding notifications before giving up.
const SETTLE_TIMEOUT: Duration = Duration::from_secs(10);

/// Outcome of one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    /// Batch id assigned by the device
    pub request_id: RequestId,
    /// Last frame reported in the sequence completion
    pub last_frame: i32,
    /// Listener totals when the sequence finished
    pub stats: RunStats,
}

/// An open session on a mock device, plus the listener observing it.
pub struct SessionRunner {
    device: Arc<MockRemoteDevice>,
    session: CaptureSession,
    queue: Arc<TokioDispatchQueue>,
    listener: Arc<LoggingListener>,
    outputs: Vec<Surface>,
}

impl SessionRunner {
    /// Open a session and configure the outputs named in `config`.
    pub async fn open(config: &AppConfig) -> Result<Self> {
        config.validate().map_err(|e| anyhow!(e))?;

        let device = MockRemoteDevice::new(config.mock.clone());
        let queue = TokioDispatchQueue::spawn();
        let listener = Arc::new(LoggingListener::new());
        let session = device.open_session(
            config.session.camera_id.clone(),
            listener.clone(),
            queue.clone(),
        );
        if config.mock.mode.is_timed() {
            device.start();
        }

        let outputs = config.session.surfaces();
        session
            .configure_outputs(outputs.clone())
            .await
            .context("Failed to configure outputs")?;

        Ok(Self {
            device,
            session,
            queue,
            listener,
            outputs,
        })
    }

    /// The underlying session.
    pub fn session(&self) -> &CaptureSession {
        &self.session
    }

    /// The listener receiving every notification.
    pub fn listener(&self) -> &Arc<LoggingListener> {
        &self.listener
    }

    /// The mock device.
    pub fn device(&self) -> &Arc<MockRemoteDevice> {
        &self.device
    }

    async fn request(&self, template: RequestTemplate, tag: String) -> Result<CaptureRequest> {
        let builder = self.session.create_capture_request(template).await?;
        let builder = self
            .outputs
            .iter()
            .cloned()
            .fold(builder, |b, surface| b.add_target(surface));
        Ok(builder.tag(tag).build())
    }

    fn listener_pair(
        &self,
    ) -> (
        Option<Arc<dyn CaptureListener>>,
        Option<Arc<dyn DispatchQueue>>,
    ) {
        (Some(self.listener.clone()), Some(self.queue.clone()))
    }

    /// Capture `count` still frames back to back and wait for the sequence to finish.
    #[instrument(skip(self), fields(camera_id = %self.session.camera_id()))]
    pub async fn burst(&self, count: usize) -> Result<RunSummary> {
        if count == 0 {
            bail!("Burst needs at least one frame");
        }
        let mut requests = Vec::with_capacity(count);
        for i in 0..count {
            requests.push(
                self.request(RequestTemplate::StillCapture, format!("still-{}", i))
                    .await?,
            );
        }
        let (listener, queue) = self.listener_pair();
        let request_id = self
            .session
            .capture_burst(requests, listener, queue)
            .await?;
        info!(%request_id, count, "Burst submitted");

        if !self.device.config().mode.is_timed() {
            self.device.run_until_idle().await;
        }
        self.settle(request_id).await
    }

    /// Stream a repeating preview until `frames` results arrived, then stop it.
    #[instrument(skip(self), fields(camera_id = %self.session.camera_id()))]
    pub async fn repeat(&self, frames: usize) -> Result<RunSummary> {
        let request = self
            .request(RequestTemplate::Preview, "preview".to_string())
            .await?;
        let (listener, queue) = self.listener_pair();
        let request_id = self
            .session
            .set_repeating_request(request, listener, queue)
            .await?;
        info!(%request_id, frames, "Repeating request started");

        if self.device.config().mode.is_timed() {
            let before = self.listener.stats().completed;
            self.listener
                .wait_for(SETTLE_TIMEOUT, |s| s.completed >= before + frames)
                .await
                .ok_or_else(|| anyhow!("Timed out waiting for {} frames", frames))?;
        } else {
            self.device.step(frames);
            self.device.deliver().await;
        }

        self.session.stop_repeating().await?;
        if !self.device.config().mode.is_timed() {
            self.device.deliver().await;
        }
        self.settle(request_id).await
    }

    async fn settle(&self, request_id: RequestId) -> Result<RunSummary> {
        let stats = self
            .listener
            .wait_for(SETTLE_TIMEOUT, |s| s.sequence(request_id).is_some() || s.closed)
            .await
            .ok_or_else(|| anyhow!("Timed out waiting for request {}", request_id))?;
        let last_frame = stats
            .sequence(request_id)
            .ok_or_else(|| anyhow!("Session closed before request {} finished", request_id))?;
        Ok(RunSummary {
            request_id,
            last_frame,
            stats,
        })
    }

    /// Wait for the device to drain, then close the session.
    pub async fn close(self) -> Result<()> {
        if self.session.state().await != SessionState::Closed {
            if let Err(e) = self.session.wait_until_idle().await {
                tracing::warn!(error = %e, "Device did not drain before close");
            }
        }
        self.session.close().await;
        Ok(())
    }
}
