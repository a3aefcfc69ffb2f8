use crate::error::CameraError;
use crate::events::{EventBus, GazelinkEvent};
use crate::frame::RawFrame;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A live video feed obtained from a camera source
pub trait VideoFeed: Send {
    /// Latest decodable frame, or `None` when nothing is ready yet
    fn current_frame(&mut self) -> Option<RawFrame>;

    /// Stop every track of the feed and give the device back
    fn release(&mut self);
}

/// Something that can hand out camera feeds (webcam, synthetic pattern, ...)
#[async_trait]
pub trait CameraSource: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &str;

    /// Acquire the device and start streaming
    async fn open(&self) -> Result<Box<dyn VideoFeed>, CameraError>;
}

/// Scoped ownership of an open feed; dropping it releases the device
struct CameraSession {
    feed: Box<dyn VideoFeed>,
    source_name: String,
}

impl Drop for CameraSession {
    fn drop(&mut self) {
        self.feed.release();
        info!("Camera '{}' released", self.source_name);
    }
}

/// Single logical camera: at most one active session at a time
pub struct Camera {
    source: Arc<dyn CameraSource>,
    session: Mutex<Option<CameraSession>>,
    /// Serializes `start` so the device is opened once
    starting: tokio::sync::Mutex<()>,
    last_error: Mutex<Option<String>>,
    event_bus: Arc<EventBus>,
}

impl Camera {
    /// Create a camera on top of the given source; nothing is acquired yet
    pub fn new(source: Arc<dyn CameraSource>, event_bus: Arc<EventBus>) -> Self {
        Self {
            source,
            session: Mutex::new(None),
            starting: tokio::sync::Mutex::new(()),
            last_error: Mutex::new(None),
            event_bus,
        }
    }

    /// Acquire the camera. Starting an already active camera is a no-op.
    pub async fn start(&self) -> Result<(), CameraError> {
        let _starting = self.starting.lock().await;
        if self.is_active() {
            warn!("Camera '{}' is already active", self.source.name());
            return Ok(());
        }

        info!("Starting camera '{}'", self.source.name());

        let feed = match self.source.open().await {
            Ok(feed) => feed,
            Err(e) => {
                warn!("Failed to start camera '{}': {}", self.source.name(), e);
                *self.last_error.lock() = Some(e.to_string());
                self.event_bus.publish(GazelinkEvent::CameraStatusChanged {
                    active: false,
                    error: Some(e.to_string()),
                });
                return Err(e);
            }
        };

        let new_session = CameraSession {
            feed,
            source_name: self.source.name().to_string(),
        };

        *self.session.lock() = Some(new_session);

        *self.last_error.lock() = None;
        self.event_bus.publish(GazelinkEvent::CameraStatusChanged {
            active: true,
            error: None,
        });

        Ok(())
    }

    /// Release the camera. Idempotent.
    pub fn stop(&self) {
        let session = self.session.lock().take();
        if session.is_some() {
            drop(session);
            self.event_bus.publish(GazelinkEvent::CameraStatusChanged {
                active: false,
                error: None,
            });
        }
    }

    /// Whether a session is currently held
    pub fn is_active(&self) -> bool {
        self.session.lock().is_some()
    }

    /// Grab the latest decodable frame, `None` if inactive or not ready
    pub fn grab_frame(&self) -> Option<RawFrame> {
        let mut session = self.session.lock();
        let frame = session.as_mut()?.feed.current_frame()?;

        if !frame.is_decodable() {
            debug!(
                "Skipping undecodable frame {} ({}x{})",
                frame.id, frame.width, frame.height
            );
            return None;
        }

        Some(frame)
    }

    /// Last acquisition error, kept separate from transport errors
    pub fn last_error(&self) -> Option<String> {
        self.last_error.lock().clone()
    }
}

impl Drop for Camera {
    fn drop(&mut self) {
        // Session drop releases the device on every exit path
        self.session.get_mut().take();
    }
}
