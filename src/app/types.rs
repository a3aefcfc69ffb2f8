use std::sync::Arc;
use tokio::sync::{oneshot, Mutex};
use tracing::debug;

/// Component lifecycle states
#[derive(Debug, Clone, PartialEq)]
pub enum ComponentState {
    Stopped,
    Starting,
    Running,
    Stopping,
    Failed,
}

/// System shutdown reason
#[derive(Debug, Clone, PartialEq)]
pub enum ShutdownReason {
    Signal(String),
    UserRequest,
}

/// Which parts of the pipeline a run brings up
#[derive(Debug, Clone, PartialEq)]
pub struct RunOptions {
    /// Keep the patient video stream connected
    pub video: bool,
    /// Camera, gaze transport, tracking and dwell selection
    pub gaze: bool,
    /// Run the calibration sequence right after connecting
    pub calibrate: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            video: true,
            gaze: true,
            calibrate: false,
        }
    }
}

/// Cloneable handle that ends `run` with a reason; only the first trigger counts
#[derive(Clone)]
pub struct ShutdownTrigger {
    sender: Arc<Mutex<Option<oneshot::Sender<ShutdownReason>>>>,
}

impl ShutdownTrigger {
    pub(super) fn new(sender: oneshot::Sender<ShutdownReason>) -> Self {
        Self {
            sender: Arc::new(Mutex::new(Some(sender))),
        }
    }

    /// Returns false when shutdown was already triggered
    pub async fn trigger(&self, reason: ShutdownReason) -> bool {
        match self.sender.lock().await.take() {
            Some(sender) => sender.send(reason).is_ok(),
            None => {
                debug!("Shutdown already triggered, ignoring {:?}", reason);
                false
            }
        }
    }
}
