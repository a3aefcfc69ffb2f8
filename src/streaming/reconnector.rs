use super::probe::{FrameStream, ImageProbe};
use crate::config::GazelinkConfig;
use crate::error::ProbeError;
use crate::events::{EventBus, GazelinkEvent};
use crate::recovery::{ReconnectAttempts, ReconnectPolicy};
use crate::task::ScopedTask;
use bytes::Bytes;
use futures::StreamExt;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Error shown while the stream is down; details go to the log only
pub const VIDEO_STREAM_ERROR: &str = "Failed to connect to video stream";

const STOP_GRACE: Duration = Duration::from_millis(500);

/// What the UI shows about the live feed
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct VideoStreamState {
    pub connected: bool,
    pub error: Option<String>,
    /// Consecutive failures since the last successful load
    pub attempt: u32,
}

impl fmt::Display for VideoStreamState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.connected {
            write!(f, "connected")
        } else if let Some(error) = &self.error {
            write!(f, "disconnected after {} attempt(s): {}", self.attempt, error)
        } else {
            write!(f, "disconnected")
        }
    }
}

enum Command {
    Reconnect,
}

struct StreamShared {
    config: GazelinkConfig,
    probe: Arc<dyn ImageProbe>,
    policy: ReconnectPolicy,
    state: watch::Sender<VideoStreamState>,
    frames: watch::Sender<Option<Bytes>>,
    event_bus: Arc<EventBus>,
}

struct Control {
    commands: mpsc::UnboundedSender<Command>,
    task: ScopedTask,
}

/// Keeps a live image feed connected, retrying forever with exponential backoff.
///
/// Attempt counting is private to this component; the gaze transport never
/// shares it.
pub struct VideoStreamReconnector {
    shared: Arc<StreamShared>,
    control: Mutex<Option<Control>>,
}

impl VideoStreamReconnector {
    pub fn new(config: &GazelinkConfig, probe: Arc<dyn ImageProbe>, event_bus: Arc<EventBus>) -> Self {
        let (state, _) = watch::channel(VideoStreamState::default());
        let (frames, _) = watch::channel(None);

        Self {
            shared: Arc::new(StreamShared {
                config: config.clone(),
                probe,
                policy: config.reconnect_policy(),
                state,
                frames,
                event_bus,
            }),
            control: Mutex::new(None),
        }
    }

    /// Begin the load/retry loop with an immediate first attempt
    pub fn start(&self) {
        let mut control = self.control.lock();
        if control.as_ref().is_some_and(|c| !c.task.is_finished()) {
            debug!("Video stream already running");
            return;
        }

        let (commands, receiver) = mpsc::unbounded_channel();
        let task = ScopedTask::spawn("video_stream", {
            let shared = Arc::clone(&self.shared);
            move |cancel| run(shared, receiver, cancel)
        });

        *control = Some(Control { commands, task });
        info!("Video stream reconnector started");
    }

    /// Cancel any pending retry, reset the attempt counter and load again now
    pub fn reconnect(&self) {
        let sent = self
            .control
            .lock()
            .as_ref()
            .is_some_and(|c| c.commands.send(Command::Reconnect).is_ok());

        if !sent {
            self.start();
        }
    }

    /// Cancel the pending retry and any in-flight load
    pub async fn stop(&self) {
        let control = self.control.lock().take();
        if let Some(control) = control {
            drop(control.commands);
            control.task.stop(STOP_GRACE).await;
            info!("Video stream reconnector stopped");
        }

        self.shared.frames.send_replace(None);
        let current = self.state();
        self.shared.set_state(VideoStreamState {
            connected: false,
            ..current
        });
    }

    pub fn is_running(&self) -> bool {
        self.control
            .lock()
            .as_ref()
            .is_some_and(|c| !c.task.is_finished())
    }

    pub fn state(&self) -> VideoStreamState {
        self.shared.state.borrow().clone()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<VideoStreamState> {
        self.shared.state.subscribe()
    }

    /// Most recent JPEG from the feed
    pub fn latest_frame(&self) -> Option<Bytes> {
        self.shared.frames.borrow().clone()
    }

    pub fn subscribe_frames(&self) -> watch::Receiver<Option<Bytes>> {
        self.shared.frames.subscribe()
    }
}

impl StreamShared {
    fn set_state(&self, state: VideoStreamState) {
        let previous = self.state.send_replace(state.clone());
        if previous != state {
            self.event_bus
                .publish(GazelinkEvent::VideoStreamChanged(state));
        }
    }

    async fn load(&self) -> Result<FrameStream, ProbeError> {
        let cache_bust = chrono::Utc::now().timestamp_millis();
        let url = self
            .config
            .video_stream_url(&self.config.backend.patient_id, cache_bust)
            .map_err(|e| ProbeError::Request {
                details: e.to_string(),
            })?;
        self.probe.load(&url).await
    }

    fn manual_reset(&self, attempts: &mut ReconnectAttempts) {
        info!("Manual video stream reconnect");
        attempts.reset();
        self.set_state(VideoStreamState::default());
    }
}

async fn run(
    shared: Arc<StreamShared>,
    mut commands: mpsc::UnboundedReceiver<Command>,
    cancel: CancellationToken,
) {
    let mut attempts = ReconnectAttempts::new("video_stream");

    'attempts: loop {
        let loaded = tokio::select! {
            _ = cancel.cancelled() => return,
            Some(Command::Reconnect) = commands.recv() => {
                shared.manual_reset(&mut attempts);
                continue 'attempts;
            }
            loaded = shared.load() => loaded,
        };

        match loaded {
            Ok(mut frames) => {
                attempts.reset();
                shared.set_state(VideoStreamState {
                    connected: true,
                    error: None,
                    attempt: 0,
                });
                info!("Video stream connected");

                loop {
                    let item = tokio::select! {
                        _ = cancel.cancelled() => return,
                        Some(Command::Reconnect) = commands.recv() => {
                            shared.manual_reset(&mut attempts);
                            continue 'attempts;
                        }
                        item = frames.next() => item,
                    };

                    match item {
                        Some(Ok(frame)) => {
                            shared.frames.send_replace(Some(frame));
                        }
                        Some(Err(e)) => {
                            warn!("Video stream interrupted: {}", e);
                            break;
                        }
                        None => {
                            debug!("Still image loaded, waiting for a manual reconnect");
                            tokio::select! {
                                _ = cancel.cancelled() => return,
                                Some(Command::Reconnect) = commands.recv() => {
                                    shared.manual_reset(&mut attempts);
                                    continue 'attempts;
                                }
                                else => return,
                            }
                        }
                    }
                }
            }
            Err(e) => warn!("Video stream load failed: {}", e),
        }

        let delay = attempts.next_delay(&shared.policy);
        shared.set_state(VideoStreamState {
            connected: false,
            error: Some(VIDEO_STREAM_ERROR.to_string()),
            attempt: attempts.current(),
        });
        debug!("Retrying video stream in {} ms", delay.as_millis());

        tokio::select! {
            _ = cancel.cancelled() => return,
            Some(Command::Reconnect) = commands.recv() => {
                shared.manual_reset(&mut attempts);
            }
            _ = tokio::time::sleep(delay) => {}
        }
    }
}
