use crate::calibration::CalibrationState;
use crate::streaming::VideoStreamState;
use crate::transport::{ConnectionState, GazeSample, ServerStats};
use std::time::SystemTime;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// Default capacity of the event channel
pub const DEFAULT_EVENT_BUS_CAPACITY: usize = 256;

/// Events that can occur in the gaze/video pipeline
#[derive(Debug, Clone)]
pub enum GazelinkEvent {
    /// A new inference result arrived (successful or not)
    GazeSample(GazeSample),
    /// Calibration progress changed
    CalibrationProgress(CalibrationState),
    /// All calibration points were completed
    CalibrationCompleted,
    /// Calibration was cleared locally and on the server
    CalibrationReset,
    /// Advisory counters reported by the inference service
    ServerStats(ServerStats),
    /// Gaze transport connection state changed
    ConnectionChanged(ConnectionState),
    /// Dwell selection fired for a target
    TargetActivated {
        target_id: String,
        timestamp: SystemTime,
    },
    /// Camera session acquired or released
    CameraStatusChanged {
        active: bool,
        error: Option<String>,
    },
    /// Video stream connected/error state changed
    VideoStreamChanged(VideoStreamState),
    /// The inference service reported an error
    ServerError { message: String },
}

impl GazelinkEvent {
    /// Get a human-readable description of the event
    pub fn description(&self) -> String {
        match self {
            GazelinkEvent::GazeSample(sample) => {
                if sample.success {
                    format!(
                        "Gaze at ({:.3}, {:.3}) confidence {:.2}",
                        sample.x, sample.y, sample.confidence
                    )
                } else {
                    format!(
                        "Gaze lost: {}",
                        sample.error.as_deref().unwrap_or("unknown reason")
                    )
                }
            }
            GazelinkEvent::CalibrationProgress(state) => match state.current_point_index {
                Some(index) => format!(
                    "Calibration point {}/{}: {}/{} samples",
                    index + 1,
                    state.total_points,
                    state.samples_collected,
                    state.samples_required
                ),
                None => "Calibration idle".to_string(),
            },
            GazelinkEvent::CalibrationCompleted => "Calibration completed".to_string(),
            GazelinkEvent::CalibrationReset => "Calibration reset".to_string(),
            GazelinkEvent::ServerStats(stats) => format!(
                "Server stats: {} processed, {} dropped, {:.1} fps",
                stats.frames_processed, stats.frames_dropped, stats.fps
            ),
            GazelinkEvent::ConnectionChanged(state) => format!("Gaze transport {}", state),
            GazelinkEvent::TargetActivated { target_id, .. } => {
                format!("Target activated: {}", target_id)
            }
            GazelinkEvent::CameraStatusChanged { active, error } => match error {
                Some(error) => format!("Camera error: {}", error),
                None => format!("Camera {}", if *active { "started" } else { "stopped" }),
            },
            GazelinkEvent::VideoStreamChanged(state) => format!("Video stream {}", state),
            GazelinkEvent::ServerError { message } => format!("Server error: {}", message),
        }
    }

    /// Get the event type as a string for filtering
    pub fn event_type(&self) -> &'static str {
        match self {
            GazelinkEvent::GazeSample(_) => "gaze_sample",
            GazelinkEvent::CalibrationProgress(_) => "calibration_progress",
            GazelinkEvent::CalibrationCompleted => "calibration_completed",
            GazelinkEvent::CalibrationReset => "calibration_reset",
            GazelinkEvent::ServerStats(_) => "server_stats",
            GazelinkEvent::ConnectionChanged(_) => "connection_changed",
            GazelinkEvent::TargetActivated { .. } => "target_activated",
            GazelinkEvent::CameraStatusChanged { .. } => "camera_status_changed",
            GazelinkEvent::VideoStreamChanged(_) => "video_stream_changed",
            GazelinkEvent::ServerError { .. } => "server_error",
        }
    }
}

/// Event bus for component coordination using broadcast channels
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<GazelinkEvent>,
}

impl EventBus {
    /// Create a new event bus with the specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Subscribe to events and get a receiver
    pub fn subscribe(&self) -> broadcast::Receiver<GazelinkEvent> {
        self.sender.subscribe()
    }

    /// Publish an event to all subscribers, returning how many received it
    pub fn publish(&self, event: GazelinkEvent) -> usize {
        match &event {
            GazelinkEvent::ServerError { message } => {
                error!("Inference service error: {}", message);
            }
            GazelinkEvent::ConnectionChanged(state) => {
                if let Some(error) = &state.last_error {
                    warn!("Gaze transport {}: {}", state, error);
                } else {
                    info!("Gaze transport {}", state);
                }
            }
            GazelinkEvent::CalibrationCompleted | GazelinkEvent::TargetActivated { .. } => {
                info!("{}", event.description());
            }
            GazelinkEvent::GazeSample(_) => {}
            _ => {
                debug!("Event: {}", event.description());
            }
        }

        // No subscribers is not an error for a fire-and-forget bus
        self.sender.send(event).unwrap_or(0)
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUS_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{timeout, Duration};

    #[tokio::test]
    async fn test_event_bus_basic_operations() {
        let event_bus = EventBus::new(10);
        let mut receiver = event_bus.subscribe();

        let delivered = event_bus.publish(GazelinkEvent::TargetActivated {
            target_id: "key-a".to_string(),
            timestamp: SystemTime::now(),
        });
        assert_eq!(delivered, 1);

        match receiver.recv().await.unwrap() {
            GazelinkEvent::TargetActivated { target_id, .. } => assert_eq!(target_id, "key-a"),
            other => panic!("Unexpected event type: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_multiple_subscribers() {
        let event_bus = EventBus::new(10);
        let mut receiver1 = event_bus.subscribe();
        let mut receiver2 = event_bus.subscribe();

        assert_eq!(event_bus.subscriber_count(), 2);

        event_bus.publish(GazelinkEvent::CalibrationReset);

        let _ = timeout(Duration::from_millis(100), receiver1.recv())
            .await
            .unwrap()
            .unwrap();
        let _ = timeout(Duration::from_millis(100), receiver2.recv())
            .await
            .unwrap()
            .unwrap();
    }

    #[test]
    fn test_publish_without_subscribers() {
        let event_bus = EventBus::default();
        assert_eq!(event_bus.publish(GazelinkEvent::CalibrationCompleted), 0);
    }

    #[test]
    fn test_event_type_names() {
        let event = GazelinkEvent::ServerError {
            message: "model not loaded".to_string(),
        };
        assert_eq!(event.event_type(), "server_error");
        assert_eq!(event.description(), "Server error: model not loaded");
    }
}
