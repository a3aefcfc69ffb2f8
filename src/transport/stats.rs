use std::time::Instant;

/// Client-side counters for the gaze transport
#[derive(Debug, Clone, Default)]
pub struct TransportStats {
    pub frames_sent: u64,
    pub frames_dropped: u64,
    pub calibration_samples_sent: u64,
    pub messages_received: u64,
    pub malformed_messages: u64,
    pub last_message_time: Option<Instant>,
}

impl TransportStats {
    pub fn record_frame_sent(&mut self) {
        self.frames_sent += 1;
    }

    /// Frame skipped because the previous send was still pending
    pub fn record_dropped_frame(&mut self) {
        self.frames_dropped += 1;
    }

    pub fn record_calibration_sample(&mut self) {
        self.calibration_samples_sent += 1;
    }

    pub fn record_message(&mut self) {
        self.messages_received += 1;
        self.last_message_time = Some(Instant::now());
    }

    pub fn record_malformed(&mut self) {
        self.malformed_messages += 1;
        self.last_message_time = Some(Instant::now());
    }

    /// Share of tracking frames that made it onto the socket
    pub fn send_efficiency(&self) -> f64 {
        let total = self.frames_sent + self.frames_dropped;
        if total > 0 {
            self.frames_sent as f64 / total as f64
        } else {
            1.0
        }
    }
}
