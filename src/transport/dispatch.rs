use super::protocol::{decode_inbound, GazeSample, InboundMessage};
use super::stats::TransportStats;
use crate::calibration::{CalibrationState, CalibrationTransition};
use crate::events::{EventBus, GazelinkEvent};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, trace, warn};

/// Routes decoded service messages into local state and the event bus.
///
/// Never fails: malformed or unexpected input is logged, counted and
/// dropped, and the connection carries on.
pub struct Dispatcher {
    pub(crate) calibration: Arc<Mutex<CalibrationState>>,
    /// Set while a calibration sample awaits its response
    pub(crate) calibration_pending: Arc<AtomicBool>,
    pub(crate) tracking: Arc<AtomicBool>,
    pub(crate) latest_sample: Arc<watch::Sender<Option<GazeSample>>>,
    pub(crate) stats: Arc<Mutex<TransportStats>>,
    pub(crate) event_bus: Arc<EventBus>,
}

impl Dispatcher {
    pub fn new(samples_required: u32, event_bus: Arc<EventBus>) -> Self {
        let (latest_sample, _) = watch::channel(None);
        Self {
            calibration: Arc::new(Mutex::new(CalibrationState::new(samples_required))),
            calibration_pending: Arc::new(AtomicBool::new(false)),
            tracking: Arc::new(AtomicBool::new(false)),
            latest_sample: Arc::new(latest_sample),
            stats: Arc::new(Mutex::new(TransportStats::default())),
            event_bus,
        }
    }

    /// Handle one text frame from the socket
    pub fn handle_text(&self, text: &str) {
        match decode_inbound(text) {
            Ok(message) => {
                self.stats.lock().record_message();
                self.handle(message);
            }
            Err(e) => {
                self.stats.lock().record_malformed();
                warn!("Dropping malformed message from inference service: {}", e);
            }
        }
    }

    /// Handle a non-text frame, which the service never sends
    pub fn handle_unsupported(&self, kind: &str) {
        self.stats.lock().record_malformed();
        warn!("Dropping unsupported {} frame from inference service", kind);
    }

    pub fn handle(&self, message: InboundMessage) {
        trace!("Inbound message: {}", message.kind());

        match message {
            InboundMessage::GazeData(payload) => {
                if !self.tracking.load(Ordering::SeqCst) {
                    debug!("Gaze sample arrived after tracking stopped, ignoring");
                    return;
                }
                let sample = GazeSample::from(payload);
                self.latest_sample.send_replace(Some(sample.clone()));
                self.event_bus.publish(GazelinkEvent::GazeSample(sample));
            }
            InboundMessage::CalibrationResponse(response) => {
                self.calibration_pending.store(false, Ordering::SeqCst);
                if let Some(message) = response.message.as_deref().filter(|_| !response.success) {
                    debug!("Calibration sample not accepted: {}", message);
                }

                let (transition, snapshot) = {
                    let mut calibration = self.calibration.lock();
                    let transition = calibration.apply_report(
                        response.success,
                        response.samples_collected,
                        response.is_calibrated,
                    );
                    (transition, calibration.clone())
                };

                match transition {
                    CalibrationTransition::Ignored => {}
                    CalibrationTransition::Completed => {
                        self.event_bus
                            .publish(GazelinkEvent::CalibrationProgress(snapshot));
                        self.event_bus.publish(GazelinkEvent::CalibrationCompleted);
                    }
                    _ => {
                        self.event_bus
                            .publish(GazelinkEvent::CalibrationProgress(snapshot));
                    }
                }
            }
            InboundMessage::CalibrationReset(payload) => {
                if !payload.success {
                    warn!("Inference service failed to reset calibration");
                    return;
                }
                self.calibration_pending.store(false, Ordering::SeqCst);
                self.calibration.lock().reset();
                self.event_bus.publish(GazelinkEvent::CalibrationReset);
            }
            InboundMessage::Stats(stats) => {
                self.event_bus.publish(GazelinkEvent::ServerStats(stats));
            }
            InboundMessage::Heartbeat(heartbeat) => {
                trace!("Heartbeat from inference service: {:?}", heartbeat.timestamp);
            }
            InboundMessage::Error(payload) => {
                self.event_bus.publish(GazelinkEvent::ServerError {
                    message: payload.message,
                });
            }
        }
    }
}
