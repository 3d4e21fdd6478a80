//! Simulated remote capture device.
//!
//! [`MockRemoteDevice`] implements [`RemoteDevice`] entirely in memory. It keeps a
//! hardware queue of scheduled frames plus at most one repeating job, numbers frames
//! in production order, and reports everything it produces through an outbox of
//! [`DeviceEvent`]s. Events reach the session only when they are delivered, either
//! explicitly with [`MockRemoteDevice::deliver`] (instant and chaos modes) or by the
//! background task started with [`MockRemoteDevice::start`] (realistic mode).
//!
//! Production never waits for delivery, so proxy calls made while the session lock is
//! held (`wait_until_idle`, `flush`) cannot deadlock against pending callbacks.
//!
//! Frame numbering follows the rules a real device guarantees: non-repeating frames
//! are numbered at submission and always produced before any later repeating frame,
//! and final results leave the device in frame order.

use async_trait::async_trait;
use capture_core::{
    CaptureRequest, CaptureSession, DeviceCallbacks, DeviceError, DeviceErrorKind, DeviceResult,
    DeviceStateListener, DispatchQueue, ErrorCode, FrameNumber, LastFrame, Metadata,
    RemoteDevice, RequestId, RequestTemplate, ResultExtras, StreamId, Submission, Surface,
};
use parking_lot::Mutex;
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::common::{ErrorConfig, MockRng, TimingConfig};
use crate::config::MockDeviceConfig;

// =============================================================================
// Device Events
// =============================================================================

/// One asynchronous signal waiting in the device outbox.
#[derive(Debug, Clone)]
pub enum DeviceEvent {
    /// Exposure started
    Started {
        /// Batch id
        request_id: RequestId,
        /// Index within the batch
        subsequence_id: i32,
        /// Sensor timestamp in nanoseconds
        timestamp: i64,
    },
    /// Partial result
    Partial {
        /// Frame bookkeeping
        extras: ResultExtras,
        /// Partial metadata
        metadata: Metadata,
    },
    /// Final result
    Result {
        /// Frame bookkeeping
        extras: ResultExtras,
        /// Result metadata
        metadata: Metadata,
    },
    /// Error, optionally attributed to a frame
    Error {
        /// Error code
        code: ErrorCode,
        /// Failed frame, `None` for device-level errors
        frame: Option<FrameNumber>,
    },
    /// All outstanding work finished
    Idle,
}

// =============================================================================
// Hardware State
// =============================================================================

#[derive(Debug)]
struct QueuedFrame {
    request_id: RequestId,
    subsequence_id: i32,
    frame_number: FrameNumber,
    settings: Metadata,
}

#[derive(Debug)]
struct RepeatingJob {
    request_id: RequestId,
    settings: Vec<Metadata>,
    next_subsequence: usize,
    last_frame: Option<FrameNumber>,
}

#[derive(Debug)]
struct DeviceState {
    connected: bool,
    idle: bool,
    next_request_id: i32,
    next_stream_id: i32,
    next_frame: u64,
    streams: BTreeMap<StreamId, Surface>,
    queue: VecDeque<QueuedFrame>,
    repeating: Option<RepeatingJob>,
    frames_produced: u64,
}

// =============================================================================
// MockRemoteDevice
// =============================================================================

/// In-memory capture device.
pub struct MockRemoteDevice {
    config: MockDeviceConfig,
    timing: TimingConfig,
    errors: ErrorConfig,
    rng: MockRng,
    state: Mutex<DeviceState>,
    outbox: mpsc::UnboundedSender<DeviceEvent>,
    inbox: tokio::sync::Mutex<mpsc::UnboundedReceiver<DeviceEvent>>,
    callbacks: Mutex<Option<DeviceCallbacks>>,
    idle_tx: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl MockRemoteDevice {
    /// Device with no injected errors.
    pub fn new(config: MockDeviceConfig) -> Arc<Self> {
        Self::with_errors(config, ErrorConfig::none())
    }

    /// Device whose proxy calls consult `errors` first.
    pub fn with_errors(config: MockDeviceConfig, errors: ErrorConfig) -> Arc<Self> {
        let (outbox, inbox) = mpsc::unbounded_channel();
        let (idle_tx, _) = watch::channel(true);
        let state = DeviceState {
            connected: true,
            idle: true,
            next_request_id: config.first_request_id,
            next_stream_id: 0,
            next_frame: 0,
            streams: BTreeMap::new(),
            queue: VecDeque::new(),
            repeating: None,
            frames_produced: 0,
        };
        Arc::new(Self {
            timing: config.timing(),
            rng: MockRng::new(config.seed),
            config,
            errors,
            state: Mutex::new(state),
            outbox,
            inbox: tokio::sync::Mutex::new(inbox),
            callbacks: Mutex::new(None),
            idle_tx,
            tasks: Mutex::new(Vec::new()),
        })
    }

    /// Open a [`CaptureSession`] on this device and attach its callbacks.
    pub fn open_session(
        self: &Arc<Self>,
        camera_id: impl Into<String>,
        state_listener: Arc<dyn DeviceStateListener>,
        device_queue: Arc<dyn DispatchQueue>,
    ) -> CaptureSession {
        let session = CaptureSession::open(
            camera_id,
            Arc::clone(self) as Arc<dyn RemoteDevice>,
            state_listener,
            device_queue,
        );
        self.attach(session.callbacks());
        session
    }

    /// Route delivered events into `callbacks`.
    pub fn attach(&self, callbacks: DeviceCallbacks) {
        *self.callbacks.lock() = Some(callbacks);
    }

    /// Configuration the device was built with
    pub fn config(&self) -> &MockDeviceConfig {
        &self.config
    }

    /// False once disconnected.
    pub fn is_connected(&self) -> bool {
        self.state.lock().connected
    }

    /// Number of configured streams
    pub fn stream_count(&self) -> usize {
        self.state.lock().streams.len()
    }

    /// Frames waiting in the hardware queue
    pub fn queued_frames(&self) -> usize {
        self.state.lock().queue.len()
    }

    /// Total frames produced so far
    pub fn frames_produced(&self) -> u64 {
        self.state.lock().frames_produced
    }

    /// The repeating job's request id, if one is running.
    pub fn repeating_request(&self) -> Option<RequestId> {
        self.state.lock().repeating.as_ref().map(|job| job.request_id)
    }

    // -------------------------------------------------------------------------
    // Production
    // -------------------------------------------------------------------------

    /// Produce up to `frames` frames. Returns how many were produced.
    pub fn step(&self, frames: usize) -> usize {
        let mut state = self.state.lock();
        let mut produced = 0;
        while produced < frames && self.produce_locked(&mut state) {
            produced += 1;
        }
        produced
    }

    /// Produce every frame in the hardware queue, leaving the repeating job alone.
    pub fn complete_queued(&self) -> usize {
        let mut state = self.state.lock();
        self.complete_queued_locked(&mut state)
    }

    fn complete_queued_locked(&self, state: &mut DeviceState) -> usize {
        let mut produced = 0;
        while let Some(frame) = state.queue.pop_front() {
            self.emit_frame(state, frame);
            produced += 1;
        }
        self.check_idle(state);
        produced
    }

    fn produce_locked(&self, state: &mut DeviceState) -> bool {
        let frame = if let Some(frame) = state.queue.pop_front() {
            frame
        } else if let Some(job) = state.repeating.as_mut() {
            let index = job.next_subsequence;
            job.next_subsequence = (index + 1) % job.settings.len();
            let frame_number = FrameNumber(state.next_frame);
            state.next_frame += 1;
            job.last_frame = Some(frame_number);
            QueuedFrame {
                request_id: job.request_id,
                subsequence_id: i32::try_from(index).unwrap_or(i32::MAX),
                frame_number,
                settings: job.settings[index].clone(),
            }
        } else {
            return false;
        };
        self.emit_frame(state, frame);
        self.check_idle(state);
        true
    }

    fn emit_frame(&self, state: &mut DeviceState, frame: QueuedFrame) {
        let timestamp = i64::try_from(frame.frame_number.0)
            .unwrap_or(i64::MAX)
            .saturating_mul(self.timing.frame_interval_ns());
        let extras = ResultExtras {
            request_id: frame.request_id,
            subsequence_id: frame.subsequence_id,
            frame_number: frame.frame_number,
        };
        state.frames_produced += 1;

        self.send(DeviceEvent::Started {
            request_id: frame.request_id,
            subsequence_id: frame.subsequence_id,
            timestamp,
        });

        if self.rng.should_fail(self.config.effective_frame_error_rate()) {
            debug!(frame_number = %frame.frame_number, "Injecting frame failure");
            self.send(DeviceEvent::Error {
                code: ErrorCode::Device,
                frame: Some(frame.frame_number),
            });
            return;
        }

        if self.config.partial_results {
            let mut partial = Metadata::new();
            partial.set("sensor.timestamp", timestamp);
            self.send(DeviceEvent::Partial {
                extras,
                metadata: partial,
            });
        }

        let mut metadata = frame.settings;
        metadata.set("sensor.timestamp", timestamp);
        metadata.set("frame_number", frame.frame_number.0);
        self.send(DeviceEvent::Result { extras, metadata });
    }

    fn check_idle(&self, state: &mut DeviceState) {
        if !state.idle && state.queue.is_empty() && state.repeating.is_none() {
            state.idle = true;
            self.send(DeviceEvent::Idle);
            self.idle_tx.send_replace(true);
        }
    }

    fn mark_busy(&self, state: &mut DeviceState) {
        state.idle = false;
        self.idle_tx.send_replace(false);
    }

    fn send(&self, event: DeviceEvent) {
        // The receiver lives as long as the device.
        let _ = self.outbox.send(event);
    }

    /// Queue an asynchronous error report.
    pub fn inject_error(&self, code: ErrorCode, frame: Option<FrameNumber>) {
        self.send(DeviceEvent::Error { code, frame });
    }

    // -------------------------------------------------------------------------
    // Delivery
    // -------------------------------------------------------------------------

    /// Deliver every event currently in the outbox. Returns how many were delivered.
    ///
    /// Events produced after disconnection are discarded. Must not be used while
    /// the realistic-mode delivery task is running.
    pub async fn deliver(&self) -> usize {
        let Some(callbacks) = self.callbacks.lock().clone() else {
            warn!("No session attached to mock device; events stay queued");
            return 0;
        };
        let mut inbox = self.inbox.lock().await;
        let mut delivered = 0;
        while let Ok(event) = inbox.try_recv() {
            if !self.is_connected() {
                continue;
            }
            self.dispatch(&callbacks, event).await;
            delivered += 1;
        }
        delivered
    }

    /// Complete queued frames and deliver everything.
    pub async fn run_until_idle(&self) -> usize {
        self.complete_queued();
        self.deliver().await
    }

    async fn dispatch(&self, callbacks: &DeviceCallbacks, event: DeviceEvent) {
        let outcome = match event {
            DeviceEvent::Started {
                request_id,
                subsequence_id,
                timestamp,
            } => {
                callbacks
                    .on_capture_started(request_id, subsequence_id, timestamp)
                    .await
            }
            DeviceEvent::Partial { extras, metadata } => {
                callbacks.on_result_received(extras, true, metadata).await
            }
            DeviceEvent::Result { extras, metadata } => {
                callbacks.on_result_received(extras, false, metadata).await
            }
            DeviceEvent::Error { code, frame } => {
                let outcome = callbacks.on_error(code, frame).await;
                if code == ErrorCode::Disconnected {
                    self.shut_down();
                }
                outcome
            }
            DeviceEvent::Idle => {
                callbacks.on_idle().await;
                Ok(())
            }
        };
        if let Err(e) = outcome {
            warn!(camera_id = callbacks.camera_id(), error = %e, "Session rejected device callback");
        }
    }

    /// Spawn the frame producer and delivery tasks (realistic mode only).
    ///
    /// Calling `start` again while the tasks run has no effect.
    pub fn start(self: &Arc<Self>) {
        if !self.config.mode.is_timed() {
            warn!(mode = ?self.config.mode, "Mock device only runs background tasks in realistic mode");
            return;
        }
        let mut tasks = self.tasks.lock();
        if !tasks.is_empty() {
            return;
        }

        let producer = Arc::clone(self);
        tasks.push(tokio::spawn(async move {
            loop {
                let jitter = producer.rng.jitter_ms(producer.timing.jitter_ms);
                tokio::time::sleep(producer.timing.frame_interval() + Duration::from_millis(jitter))
                    .await;
                if !producer.is_connected() {
                    break;
                }
                producer.step(1);
            }
        }));

        let delivery = Arc::clone(self);
        tasks.push(tokio::spawn(async move {
            let mut inbox = delivery.inbox.lock().await;
            while let Some(event) = inbox.recv().await {
                if !delivery.is_connected() {
                    break;
                }
                let callbacks = delivery.callbacks.lock().clone();
                if let Some(callbacks) = callbacks {
                    delivery.dispatch(&callbacks, event).await;
                }
            }
        }));
        info!(frame_interval_ms = self.timing.frame_interval_ms, "Mock device started");
    }

    fn shut_down(&self) {
        {
            let mut state = self.state.lock();
            state.connected = false;
            state.queue.clear();
            state.repeating = None;
        }
        self.idle_tx.send_replace(true);
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
    }

    async fn round_trip(&self, operation: &'static str) -> DeviceResult<()> {
        if self.config.mode.is_timed() {
            tokio::time::sleep(self.timing.communication_delay()).await;
        }
        self.errors.check_operation(operation)?;
        if !self.is_connected() {
            return Err(DeviceError::disconnected("Mock device is disconnected"));
        }
        Ok(())
    }
}

fn template_defaults(template: RequestTemplate) -> Metadata {
    let (intent, exposure_ns): (&str, i64) = match template {
        RequestTemplate::Preview => ("preview", 10_000_000),
        RequestTemplate::StillCapture => ("still_capture", 33_000_000),
        RequestTemplate::Record => ("video_record", 16_000_000),
        RequestTemplate::VideoSnapshot => ("video_snapshot", 16_000_000),
        RequestTemplate::ZeroShutterLag => ("zero_shutter_lag", 10_000_000),
        RequestTemplate::Manual => ("manual", 20_000_000),
    };
    let mut settings = Metadata::new();
    settings.set("template", template.code());
    settings.set("control.capture_intent", intent);
    settings.set("sensor.exposure_time_ns", exposure_ns);
    settings.set(
        "control.ae_mode",
        if template == RequestTemplate::Manual { "off" } else { "on" },
    );
    settings
}

#[async_trait]
impl RemoteDevice for MockRemoteDevice {
    async fn create_stream(&self, surface: &Surface) -> DeviceResult<StreamId> {
        self.round_trip("create_stream").await?;
        let mut state = self.state.lock();
        let stream = StreamId(state.next_stream_id);
        state.next_stream_id += 1;
        state.streams.insert(stream, surface.clone());
        debug!(stream = stream.0, surface = surface.name(), "Created stream");
        Ok(stream)
    }

    async fn delete_stream(&self, stream: StreamId) -> DeviceResult<()> {
        self.round_trip("delete_stream").await?;
        match self.state.lock().streams.remove(&stream) {
            Some(surface) => {
                debug!(stream = stream.0, surface = surface.name(), "Deleted stream");
                Ok(())
            }
            None => Err(DeviceError::new(
                DeviceErrorKind::InvalidParameter,
                format!("Unknown stream {}", stream.0),
            )),
        }
    }

    async fn create_default_request(&self, template: RequestTemplate) -> DeviceResult<Metadata> {
        self.round_trip("create_default_request").await?;
        Ok(template_defaults(template))
    }

    async fn submit_request_list(
        &self,
        requests: &[CaptureRequest],
        repeating: bool,
    ) -> DeviceResult<Submission> {
        self.round_trip("submit_request_list").await?;
        let mut state = self.state.lock();

        if requests.is_empty() {
            return Err(DeviceError::new(
                DeviceErrorKind::InvalidParameter,
                "Empty request list",
            ));
        }
        for target in requests.iter().flat_map(|r| r.targets()) {
            if !state.streams.values().any(|s| s == target) {
                return Err(DeviceError::new(
                    DeviceErrorKind::InvalidParameter,
                    format!("Request targets unconfigured surface '{}'", target.name()),
                ));
            }
        }

        let request_id = RequestId(state.next_request_id);
        state.next_request_id += 1;
        let settings: Vec<Metadata> = requests.iter().map(|r| r.settings().clone()).collect();

        let last_frame = if repeating {
            if let Some(previous) = state.repeating.take() {
                debug!(request_id = %previous.request_id, "Repeating request replaced on device");
            }
            state.repeating = Some(RepeatingJob {
                request_id,
                settings,
                next_subsequence: 0,
                last_frame: None,
            });
            LastFrame::NoFramesCaptured
        } else {
            for (index, settings) in settings.into_iter().enumerate() {
                let frame_number = FrameNumber(state.next_frame);
                state.next_frame += 1;
                state.queue.push_back(QueuedFrame {
                    request_id,
                    subsequence_id: i32::try_from(index).unwrap_or(i32::MAX),
                    frame_number,
                    settings,
                });
            }
            LastFrame::Frame(FrameNumber(state.next_frame - 1))
        };

        self.mark_busy(&mut state);
        debug!(%request_id, %last_frame, repeating, "Accepted request batch");
        Ok(Submission {
            request_id,
            last_frame,
        })
    }

    async fn cancel_request(&self, request_id: RequestId) -> DeviceResult<LastFrame> {
        self.round_trip("cancel_request").await?;
        let mut state = self.state.lock();
        match state.repeating.take() {
            Some(job) if job.request_id == request_id => {
                let last_frame = job
                    .last_frame
                    .map_or(LastFrame::NoFramesCaptured, LastFrame::Frame);
                self.check_idle(&mut state);
                debug!(%request_id, %last_frame, "Cancelled repeating request");
                Ok(last_frame)
            }
            other => {
                state.repeating = other;
                Err(DeviceError::new(
                    DeviceErrorKind::InvalidParameter,
                    format!("Request {} is not repeating", request_id),
                ))
            }
        }
    }

    async fn flush(&self) -> DeviceResult<LastFrame> {
        self.round_trip("flush").await?;
        let mut state = self.state.lock();
        let last_frame = state
            .repeating
            .take()
            .and_then(|job| job.last_frame)
            .map_or(LastFrame::NoFramesCaptured, LastFrame::Frame);
        state.idle = false;
        let flushed = self.complete_queued_locked(&mut state);
        debug!(flushed, %last_frame, "Flushed device");
        Ok(last_frame)
    }

    async fn wait_until_idle(&self) -> DeviceResult<()> {
        self.round_trip("wait_until_idle").await?;
        if self.state.lock().repeating.is_some() {
            return Err(DeviceError::new(
                DeviceErrorKind::InvalidParameter,
                "Cannot wait for idle while a repeating request is active",
            ));
        }
        if self.config.mode.is_timed() {
            let mut idle = self.idle_tx.subscribe();
            idle.wait_for(|idle| *idle)
                .await
                .map_err(|_| DeviceError::disconnected("Mock device dropped"))?;
        } else {
            self.complete_queued();
        }
        Ok(())
    }

    async fn disconnect(&self) -> DeviceResult<()> {
        self.errors.check_operation("disconnect")?;
        self.shut_down();
        info!("Mock device disconnected");
        Ok(())
    }
}

impl std::fmt::Debug for MockRemoteDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockRemoteDevice")
            .field("mode", &self.config.mode)
            .field("connected", &self.is_connected())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::MockMode;

    fn request(settings: Metadata) -> CaptureRequest {
        CaptureRequest::builder(settings).build()
    }

    fn drain(device: &MockRemoteDevice) -> Vec<DeviceEvent> {
        let mut inbox = device
            .inbox
            .try_lock()
            .unwrap();
        let mut events = Vec::new();
        while let Ok(event) = inbox.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_burst_frames_numbered_at_submit() {
        let device = MockRemoteDevice::new(MockDeviceConfig {
            first_request_id: 10,
            ..MockDeviceConfig::default()
        });
        let burst = vec![request(Metadata::new()); 3];
        let submission = device.submit_request_list(&burst, false).await.unwrap();
        assert_eq!(submission.request_id, RequestId(10));
        assert_eq!(submission.last_frame, LastFrame::Frame(FrameNumber(2)));
        assert_eq!(device.queued_frames(), 3);

        assert_eq!(device.complete_queued(), 3);
        let results: Vec<u64> = drain(&device)
            .into_iter()
            .filter_map(|e| match e {
                DeviceEvent::Result { extras, .. } => Some(extras.frame_number.0),
                _ => None,
            })
            .collect();
        assert_eq!(results, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_repeating_frames_assigned_on_production() {
        let device = MockRemoteDevice::new(MockDeviceConfig::default());
        let submission = device
            .submit_request_list(&[request(Metadata::new())], true)
            .await
            .unwrap();
        assert_eq!(submission.last_frame, LastFrame::NoFramesCaptured);

        assert_eq!(
            device.cancel_request(submission.request_id).await.unwrap(),
            LastFrame::NoFramesCaptured
        );

        let submission = device
            .submit_request_list(&[request(Metadata::new())], true)
            .await
            .unwrap();
        assert_eq!(device.step(4), 4);
        assert_eq!(
            device.cancel_request(submission.request_id).await.unwrap(),
            LastFrame::Frame(FrameNumber(3))
        );
        assert_eq!(device.step(1), 0);
    }

    #[tokio::test]
    async fn test_queued_frames_produced_before_repeating() {
        let device = MockRemoteDevice::new(MockDeviceConfig::default());
        device
            .submit_request_list(&[request(Metadata::new())], true)
            .await
            .unwrap();
        device.step(2);
        device
            .submit_request_list(&[request(Metadata::new()), request(Metadata::new())], false)
            .await
            .unwrap();
        device.step(3);

        let frames: Vec<(i32, u64)> = drain(&device)
            .into_iter()
            .filter_map(|e| match e {
                DeviceEvent::Result { extras, .. } => {
                    Some((extras.request_id.0, extras.frame_number.0))
                }
                _ => None,
            })
            .collect();
        assert_eq!(frames, vec![(0, 0), (0, 1), (1, 2), (1, 3), (0, 4)]);
    }

    #[tokio::test]
    async fn test_unconfigured_target_rejected() {
        let device = MockRemoteDevice::new(MockDeviceConfig::default());
        let preview = Surface::new("preview");
        let req = CaptureRequest::builder(Metadata::new())
            .add_target(preview.clone())
            .build();
        let err = device
            .submit_request_list(std::slice::from_ref(&req), false)
            .await
            .unwrap_err();
        assert_eq!(err.kind, DeviceErrorKind::InvalidParameter);

        device.create_stream(&preview).await.unwrap();
        assert!(device.submit_request_list(&[req], false).await.is_ok());
    }

    #[tokio::test]
    async fn test_template_defaults() {
        let device = MockRemoteDevice::new(MockDeviceConfig::default());
        let settings = device
            .create_default_request(RequestTemplate::Manual)
            .await
            .unwrap();
        assert_eq!(settings.get("template"), Some(&serde_json::json!(6)));
        assert_eq!(settings.get("control.ae_mode"), Some(&serde_json::json!("off")));
    }

    #[tokio::test]
    async fn test_chaos_mode_fails_frames() {
        let device = MockRemoteDevice::new(MockDeviceConfig {
            mode: MockMode::Chaos,
            frame_error_rate: 1.0,
            seed: Some(3),
            ..MockDeviceConfig::default()
        });
        device
            .submit_request_list(&[request(Metadata::new())], false)
            .await
            .unwrap();
        device.complete_queued();
        let events = drain(&device);
        assert!(events.iter().any(|e| matches!(
            e,
            DeviceEvent::Error {
                code: ErrorCode::Device,
                frame: Some(FrameNumber(0))
            }
        )));
        assert!(!events.iter().any(|e| matches!(e, DeviceEvent::Result { .. })));
    }

    #[tokio::test]
    async fn test_busy_injection_surfaces_in_use() {
        let device = MockRemoteDevice::with_errors(
            MockDeviceConfig::default(),
            ErrorConfig::scenario(crate::common::ErrorScenario::Busy {
                operation: "flush",
                times: 1,
            }),
        );
        assert!(device.flush().await.unwrap_err().is_in_use());
        assert!(device.flush().await.is_ok());
    }

    #[tokio::test]
    async fn test_calls_fail_after_disconnect() {
        let device = MockRemoteDevice::new(MockDeviceConfig::default());
        device.disconnect().await.unwrap();
        assert!(!device.is_connected());
        let err = device.flush().await.unwrap_err();
        assert_eq!(err.kind, DeviceErrorKind::Disconnected);
    }

    #[tokio::test]
    async fn test_wait_until_idle_rejects_repeating() {
        let device = MockRemoteDevice::new(MockDeviceConfig::default());
        device
            .submit_request_list(&[request(Metadata::new())], true)
            .await
            .unwrap();
        assert!(device.wait_until_idle().await.is_err());
    }
}
