use super::connection::ConnectionState;
use super::dispatch::Dispatcher;
use super::protocol::{GazeSample, OutboundMessage};
use super::stats::TransportStats;
use crate::calibration::CalibrationState;
use crate::camera::Camera;
use crate::capture::FrameCapture;
use crate::config::GazelinkConfig;
use crate::error::TransportError;
use crate::events::{EventBus, GazelinkEvent};
use crate::frame::CapturedFrame;
use crate::recovery::{ReconnectAttempts, ReconnectPolicy};
use crate::task::ScopedTask;
use config::ConfigError;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::watch;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Outbound messages waiting for the socket. Kept tiny so a slow link
/// drops tracking frames instead of queueing stale ones.
const OUTBOUND_QUEUE_CAPACITY: usize = 2;

/// How long a graceful close may take before the tasks are aborted
const CLOSE_GRACE: Duration = Duration::from_millis(500);

/// A calibration sample without a response after this long is resent
const CALIBRATION_RESPONSE_TIMEOUT: Duration = Duration::from_secs(2);

/// One open socket and the two tasks pumping it
struct Link {
    generation: u64,
    outbound: mpsc::Sender<OutboundMessage>,
    reader: ScopedTask,
    writer: ScopedTask,
}

struct ClientInner {
    url: String,
    frame_interval: Duration,
    sample_interval: Duration,
    camera: Arc<Camera>,
    capture: Arc<FrameCapture>,
    dispatcher: Dispatcher,
    connection: Mutex<ConnectionState>,
    /// Failed opens since the last successful one; nothing retries automatically
    attempts: Mutex<ReconnectAttempts>,
    policy: ReconnectPolicy,
    /// Bumped by every connect and disconnect so stale tasks can tell they are stale
    generation: AtomicU64,
    link: Mutex<Option<Link>>,
    track_task: Mutex<Option<ScopedTask>>,
    collect_task: Mutex<Option<ScopedTask>>,
    event_bus: Arc<EventBus>,
}

/// WebSocket client for the gaze inference service.
///
/// Owns the connection lifecycle, the frame send loop and the calibration
/// sample loop. There is no automatic reconnect: after a drop the client
/// stays disconnected until `connect` is called again.
pub struct GazeClient {
    inner: Arc<ClientInner>,
}

impl GazeClient {
    /// Create a client for the service configured in `config`
    pub fn new(
        config: &GazelinkConfig,
        camera: Arc<Camera>,
        event_bus: Arc<EventBus>,
    ) -> Result<Self, ConfigError> {
        let url = config.gaze_ws_url()?;
        Ok(Self::with_url(url, config, camera, event_bus))
    }

    /// Create a client for an explicit WebSocket URL
    pub fn with_url<S: Into<String>>(
        url: S,
        config: &GazelinkConfig,
        camera: Arc<Camera>,
        event_bus: Arc<EventBus>,
    ) -> Self {
        let capture = Arc::new(FrameCapture::new(&config.tracking));
        Self::with_frame_capture(url, config, camera, capture, event_bus)
    }

    /// Create a client that encodes frames through `capture`
    pub fn with_frame_capture<S: Into<String>>(
        url: S,
        config: &GazelinkConfig,
        camera: Arc<Camera>,
        capture: Arc<FrameCapture>,
        event_bus: Arc<EventBus>,
    ) -> Self {
        let frame_rate = config.tracking.frame_rate.max(1);
        let inner = ClientInner {
            url: url.into(),
            frame_interval: Duration::from_millis(1000 / frame_rate as u64),
            sample_interval: Duration::from_millis(config.calibration.sample_interval_ms.max(1)),
            camera,
            capture,
            dispatcher: Dispatcher::new(
                config.calibration.samples_per_point,
                Arc::clone(&event_bus),
            ),
            connection: Mutex::new(ConnectionState::default()),
            attempts: Mutex::new(ReconnectAttempts::new("gaze_transport")),
            policy: config.reconnect_policy(),
            generation: AtomicU64::new(0),
            link: Mutex::new(None),
            track_task: Mutex::new(None),
            collect_task: Mutex::new(None),
            event_bus,
        };

        Self {
            inner: Arc::new(inner),
        }
    }

    /// Open the socket. A no-op when already connected.
    pub async fn connect(&self) -> Result<(), TransportError> {
        let inner = &self.inner;

        let generation = {
            let mut connection = inner.connection.lock();
            if connection.is_connected {
                debug!("Already connected to inference service");
                return Ok(());
            }
            if !connection.begin_connect() {
                return Err(TransportError::Connect {
                    url: inner.url.clone(),
                    details: "connection attempt already in progress".to_string(),
                });
            }
            inner.generation.fetch_add(1, Ordering::SeqCst) + 1
        };
        inner.publish_connection();
        info!("Connecting to inference service at {}", inner.url);

        let socket = match connect_async(inner.url.as_str()).await {
            Ok((socket, _response)) => socket,
            Err(e) => {
                let details = e.to_string();
                if inner.is_current(generation) {
                    let failures = inner.attempts.lock().record_failure();
                    inner.connection.lock().failed(details.clone());
                    inner.publish_connection();
                    debug!(
                        "Gaze connect failed {} time(s); suggested retry in {:?}",
                        failures,
                        inner.policy.delay(failures - 1)
                    );
                }
                return Err(TransportError::Connect {
                    url: inner.url.clone(),
                    details,
                });
            }
        };

        {
            let mut link = inner.link.lock();
            if !inner.is_current(generation) {
                debug!("Disconnected while connecting, discarding socket");
                return Err(TransportError::Closed);
            }

            let (sink, stream) = socket.split();
            let (outbound, queue) = mpsc::channel(OUTBOUND_QUEUE_CAPACITY);

            let writer = ScopedTask::spawn("gaze_writer", {
                let inner = Arc::clone(inner);
                move |cancel| write_loop(inner, generation, sink, queue, cancel)
            });
            let reader = ScopedTask::spawn("gaze_reader", {
                let inner = Arc::clone(inner);
                move |cancel| read_loop(inner, generation, stream, cancel)
            });

            *link = Some(Link {
                generation,
                outbound,
                reader,
                writer,
            });
            inner.connection.lock().opened();
            inner.attempts.lock().reset();
        }

        inner.publish_connection();
        Ok(())
    }

    /// Stop every loop and close the socket. Idempotent.
    pub async fn disconnect(&self) {
        let inner = &self.inner;

        // Let an in-flight capture finish before reporting the loops stopped
        let track = inner.track_task.lock().take();
        let collect = inner.collect_task.lock().take();
        for task in [track, collect].into_iter().flatten() {
            task.stop(CLOSE_GRACE).await;
        }
        inner.stop_loops();
        inner.generation.fetch_add(1, Ordering::SeqCst);

        let link = inner.link.lock().take();
        if inner.connection.lock().closed(None) {
            inner.publish_connection();
        }

        if let Some(link) = link {
            drop(link.outbound);
            link.writer.stop(CLOSE_GRACE).await;
            link.reader.stop(CLOSE_GRACE).await;
            info!("Disconnected from inference service");
        }
    }

    /// Start sending frames at the configured rate.
    ///
    /// Requires an open connection and an active camera; otherwise logs a
    /// warning and returns false.
    pub fn start_tracking(&self) -> bool {
        let inner = &self.inner;
        let connected = inner.connection.lock().is_connected;
        let camera_active = inner.camera.is_active();

        if !connected || !camera_active {
            warn!(
                "Cannot start tracking: connected={}, camera_active={}",
                connected, camera_active
            );
            return false;
        }

        let mut track_task = inner.track_task.lock();
        if track_task.as_ref().is_some_and(|task| !task.is_finished()) {
            debug!("Tracking already running");
            return true;
        }

        let Some(sender) = inner.outbound() else {
            warn!("Cannot start tracking: connection has no outbound channel");
            return false;
        };

        inner.dispatcher.tracking.store(true, Ordering::SeqCst);
        *track_task = Some(ScopedTask::spawn("gaze_tracking", {
            let inner = Arc::clone(inner);
            move |cancel| track_loop(inner, sender, cancel)
        }));

        info!(
            "Tracking started ({} ms per frame)",
            inner.frame_interval.as_millis()
        );
        true
    }

    /// Stop the send loop and clear the latest sample
    pub fn stop_tracking(&self) {
        self.inner.stop_tracking();
    }

    /// Begin calibration at the first grid point
    pub fn start_calibration(&self) {
        let snapshot = {
            let mut calibration = self.inner.dispatcher.calibration.lock();
            calibration.start();
            calibration.clone()
        };
        self.inner
            .dispatcher
            .calibration_pending
            .store(false, Ordering::SeqCst);
        self.inner
            .event_bus
            .publish(GazelinkEvent::CalibrationProgress(snapshot));
    }

    /// Capture one frame and send it as a calibration sample for the target.
    /// Returns whether a sample went out.
    pub async fn collect_calibration_sample(&self, target_x: f64, target_y: f64) -> bool {
        self.inner.send_calibration_sample(target_x, target_y).await
    }

    /// Keep sending samples for the current point every sample interval
    /// until released, the point sequence ends or the connection drops.
    pub fn hold_calibration_point(&self) -> bool {
        let inner = &self.inner;
        if !inner.dispatcher.calibration.lock().is_calibrating {
            warn!("Cannot collect calibration samples: calibration not running");
            return false;
        }

        let mut collect_task = inner.collect_task.lock();
        if collect_task.as_ref().is_some_and(|task| !task.is_finished()) {
            return true;
        }

        *collect_task = Some(ScopedTask::spawn("calibration_samples", {
            let inner = Arc::clone(inner);
            move |cancel| collect_loop(inner, cancel)
        }));
        true
    }

    /// Stop the sample loop started by `hold_calibration_point`
    pub fn release_calibration_point(&self) {
        self.inner.collect_task.lock().take();
    }

    /// Abandon calibration, keeping any earlier calibration result
    pub fn cancel_calibration(&self) {
        self.release_calibration_point();
        let snapshot = {
            let mut calibration = self.inner.dispatcher.calibration.lock();
            calibration.cancel();
            calibration.clone()
        };
        self.inner
            .dispatcher
            .calibration_pending
            .store(false, Ordering::SeqCst);
        self.inner
            .event_bus
            .publish(GazelinkEvent::CalibrationProgress(snapshot));
    }

    /// Clear calibration locally and ask the service to do the same
    pub async fn reset_calibration(&self) -> Result<(), TransportError> {
        self.inner.dispatcher.calibration.lock().reset();
        self.inner
            .dispatcher
            .calibration_pending
            .store(false, Ordering::SeqCst);
        self.inner.event_bus.publish(GazelinkEvent::CalibrationReset);

        self.inner
            .send_control(OutboundMessage::ResetCalibration)
            .await
            .map_err(|e| {
                warn!("Calibration reset not sent to inference service: {}", e);
                e
            })
    }

    /// Ask the service for its counters; the answer arrives as a `ServerStats` event
    pub async fn request_stats(&self) -> Result<(), TransportError> {
        self.inner.send_control(OutboundMessage::GetStats).await
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.inner.connection.lock().clone()
    }

    pub fn calibration_state(&self) -> CalibrationState {
        self.inner.dispatcher.calibration.lock().clone()
    }

    /// Most recent sample while tracking
    pub fn latest_sample(&self) -> Option<GazeSample> {
        self.inner.dispatcher.latest_sample.borrow().clone()
    }

    /// Watch the latest sample; `None` whenever tracking is off
    pub fn subscribe_samples(&self) -> watch::Receiver<Option<GazeSample>> {
        self.inner.dispatcher.latest_sample.subscribe()
    }

    pub fn is_tracking(&self) -> bool {
        self.inner.dispatcher.tracking.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> TransportStats {
        self.inner.dispatcher.stats.lock().clone()
    }

    /// Failed connects since the last successful open
    pub fn connect_attempts(&self) -> u32 {
        self.inner.attempts.lock().current()
    }

    /// Backoff delay a caller should wait before its next manual `connect`
    pub fn retry_delay(&self) -> Duration {
        let attempts = self.inner.attempts.lock().current();
        self.inner.policy.delay(attempts.saturating_sub(1))
    }

    pub fn frame_capture(&self) -> Arc<FrameCapture> {
        Arc::clone(&self.inner.capture)
    }

    pub fn url(&self) -> &str {
        &self.inner.url
    }
}

impl Drop for GazeClient {
    fn drop(&mut self) {
        // Tasks hold the inner state; dropping them here breaks the cycle
        let inner = &self.inner;
        inner.stop_loops();
        inner.generation.fetch_add(1, Ordering::SeqCst);
        inner.link.lock().take();
        if inner.connection.lock().closed(None) {
            inner.publish_connection();
        }
    }
}

impl ClientInner {
    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    fn publish_connection(&self) {
        let state = self.connection.lock().clone();
        self.event_bus
            .publish(GazelinkEvent::ConnectionChanged(state));
    }

    fn outbound(&self) -> Option<mpsc::Sender<OutboundMessage>> {
        if !self.connection.lock().is_connected {
            return None;
        }
        self.link.lock().as_ref().map(|link| link.outbound.clone())
    }

    async fn send_control(&self, message: OutboundMessage) -> Result<(), TransportError> {
        let sender = self.outbound().ok_or(TransportError::NotConnected)?;
        sender
            .send(message)
            .await
            .map_err(|_| TransportError::Closed)
    }

    async fn send_calibration_sample(&self, target_x: f64, target_y: f64) -> bool {
        if !self.dispatcher.calibration.lock().is_calibrating {
            debug!("Calibration sample skipped, calibration not running");
            return false;
        }

        let Some(sender) = self.outbound() else {
            warn!("Cannot collect calibration sample: not connected");
            return false;
        };

        let Some(frame) = self.capture_frame().await else {
            return false;
        };

        self.dispatcher
            .calibration_pending
            .store(true, Ordering::SeqCst);
        let message = OutboundMessage::Calibrate {
            frame: frame.data_url,
            target_x,
            target_y,
        };

        match sender.send(message).await {
            Ok(()) => {
                self.dispatcher.stats.lock().record_calibration_sample();
                true
            }
            Err(_) => {
                self.dispatcher
                    .calibration_pending
                    .store(false, Ordering::SeqCst);
                false
            }
        }
    }

    /// Resize and encode on the blocking pool so a slow encode throttles the
    /// caller instead of stalling the socket tasks
    async fn capture_frame(&self) -> Option<CapturedFrame> {
        let capture = Arc::clone(&self.capture);
        let camera = Arc::clone(&self.camera);

        match tokio::task::spawn_blocking(move || capture.capture(&camera)).await {
            Ok(frame) => frame,
            Err(e) => {
                warn!("Frame capture task failed: {}", e);
                None
            }
        }
    }

    fn stop_tracking(&self) {
        let task = self.track_task.lock().take();
        self.dispatcher.tracking.store(false, Ordering::SeqCst);
        self.dispatcher.latest_sample.send_replace(None);
        if task.is_some() {
            info!("Tracking stopped");
        }
    }

    fn stop_loops(&self) {
        self.stop_tracking();
        self.collect_task.lock().take();
        self.dispatcher
            .calibration_pending
            .store(false, Ordering::SeqCst);
    }

    /// Called by the socket tasks when the connection dies under them
    fn link_lost(&self, generation: u64, reason: String) {
        let lost = {
            let mut link = self.link.lock();
            match link.as_ref() {
                Some(current) if current.generation == generation => link.take(),
                _ => None,
            }
        };
        let Some(lost) = lost else {
            return;
        };

        warn!("Connection to inference service lost: {}", reason);
        self.stop_loops();
        self.connection.lock().closed(Some(reason));
        self.publish_connection();

        // Aborts the calling task too, which is about to return anyway
        drop(lost);
    }
}

async fn write_loop(
    inner: Arc<ClientInner>,
    generation: u64,
    mut sink: SplitSink<WsStream, Message>,
    mut queue: mpsc::Receiver<OutboundMessage>,
    cancel: CancellationToken,
) {
    loop {
        let message = tokio::select! {
            _ = cancel.cancelled() => break,
            message = queue.recv() => match message {
                Some(message) => message,
                None => break,
            },
        };

        let json = match message.to_json() {
            Ok(json) => json,
            Err(e) => {
                warn!("Failed to encode {} message: {}", message.action(), e);
                continue;
            }
        };

        if message.is_frame() {
            trace!("Sending {} message ({} bytes)", message.action(), json.len());
        } else {
            debug!("Sending {} message", message.action());
        }
        if let Err(e) = sink.send(Message::Text(json.into())).await {
            inner.link_lost(generation, format!("send failed: {}", e));
            return;
        }
    }

    if tokio::time::timeout(CLOSE_GRACE, sink.close()).await.is_err() {
        debug!("Timed out sending close frame");
    }
}

async fn read_loop(
    inner: Arc<ClientInner>,
    generation: u64,
    mut stream: SplitStream<WsStream>,
    cancel: CancellationToken,
) {
    loop {
        let frame = tokio::select! {
            _ = cancel.cancelled() => return,
            frame = stream.next() => frame,
        };

        match frame {
            Some(Ok(Message::Text(text))) => inner.dispatcher.handle_text(&text),
            Some(Ok(Message::Binary(_))) => inner.dispatcher.handle_unsupported("binary"),
            Some(Ok(Message::Close(frame))) => {
                let reason = match frame {
                    Some(frame) => format!("closed by server ({} {})", frame.code, frame.reason),
                    None => "closed by server".to_string(),
                };
                inner.link_lost(generation, reason);
                return;
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                inner.link_lost(generation, e.to_string());
                return;
            }
            None => {
                inner.link_lost(generation, "connection closed".to_string());
                return;
            }
        }
    }
}

async fn track_loop(
    inner: Arc<ClientInner>,
    sender: mpsc::Sender<OutboundMessage>,
    cancel: CancellationToken,
) {
    let mut ticker = interval(inner.frame_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = ticker.tick() => {}
        }

        if !inner.connection.lock().is_connected {
            debug!("Connection gone, stopping tracking");
            break;
        }

        let Some(frame) = inner.capture_frame().await else {
            continue;
        };
        if cancel.is_cancelled() {
            return;
        }
        if frame.is_empty() {
            continue;
        }

        match sender.try_send(OutboundMessage::Track {
            frame: frame.data_url,
        }) {
            Ok(()) => inner.dispatcher.stats.lock().record_frame_sent(),
            Err(TrySendError::Full(_)) => {
                inner.dispatcher.stats.lock().record_dropped_frame();
                trace!("Previous frame still pending, dropping frame {}", frame.source_id);
            }
            Err(TrySendError::Closed(_)) => {
                debug!("Outbound channel closed, stopping tracking");
                break;
            }
        }
    }

    inner.dispatcher.tracking.store(false, Ordering::SeqCst);
}

async fn collect_loop(inner: Arc<ClientInner>, cancel: CancellationToken) {
    let mut ticker = interval(inner.sample_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut sent_at: Option<Instant> = None;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = ticker.tick() => {}
        }

        let Some(point) = inner.dispatcher.calibration.lock().current_point() else {
            debug!("Calibration no longer running, stopping sample collection");
            return;
        };

        // One sample in flight at a time so each response maps to the current point
        if inner.dispatcher.calibration_pending.load(Ordering::SeqCst) {
            if sent_at.is_some_and(|at| at.elapsed() < CALIBRATION_RESPONSE_TIMEOUT) {
                continue;
            }
            debug!("Calibration response overdue, sending a new sample");
        }

        if inner.send_calibration_sample(point.x, point.y).await {
            sent_at = Some(Instant::now());
        }
    }
}
