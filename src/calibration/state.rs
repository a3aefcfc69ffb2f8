use super::grid::{CalibrationPoint, CALIBRATION_POINTS, TOTAL_CALIBRATION_POINTS};
use tracing::{debug, info, warn};

/// Outcome of feeding a server report into the state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibrationTransition {
    /// Report did not change anything (not calibrating, or rejected sample)
    Ignored,
    /// Sample count for the current point moved
    SampleAccepted { samples_collected: u32 },
    /// Current point finished, moved on to `index`
    PointAdvanced { index: usize },
    /// Last point finished (or the server says calibration is done)
    Completed,
}

/// Client-side mirror of the calibration procedure.
///
/// Passive: it only reacts to counts reported by the inference service and
/// never times sample collection itself.
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationState {
    pub is_calibrating: bool,
    /// Index into the grid while calibrating, `None` otherwise
    pub current_point_index: Option<usize>,
    pub total_points: usize,
    /// Always `<= samples_required`
    pub samples_collected: u32,
    pub samples_required: u32,
    pub is_calibrated: bool,
    /// Calibration result from before the running attempt, restored on cancel
    prior_calibrated: bool,
}

impl CalibrationState {
    /// Idle, uncalibrated state requiring `samples_required` samples per point
    pub fn new(samples_required: u32) -> Self {
        Self {
            is_calibrating: false,
            current_point_index: None,
            total_points: TOTAL_CALIBRATION_POINTS,
            samples_collected: 0,
            samples_required: samples_required.max(1),
            is_calibrated: false,
            prior_calibrated: false,
        }
    }

    /// Begin a (re)calibration at the first point
    pub fn start(&mut self) {
        // Restarting mid-attempt keeps the result from before the first start
        if !self.is_calibrating {
            self.prior_calibrated = self.is_calibrated;
        }
        self.is_calibrating = true;
        self.current_point_index = Some(0);
        self.samples_collected = 0;
        self.is_calibrated = false;
        info!("Calibration started ({} points)", self.total_points);
    }

    /// Target the user should currently look at
    pub fn current_point(&self) -> Option<CalibrationPoint> {
        self.current_point_index
            .and_then(|index| CALIBRATION_POINTS.get(index).copied())
    }

    /// Apply a `calibration_response` from the service
    pub fn apply_report(
        &mut self,
        success: bool,
        samples_collected: u32,
        server_calibrated: bool,
    ) -> CalibrationTransition {
        let Some(index) = self.current_point_index.filter(|_| self.is_calibrating) else {
            debug!("Calibration report ignored, not calibrating");
            return CalibrationTransition::Ignored;
        };

        // Server already considers the user calibrated: reconcile immediately
        if server_calibrated {
            if index + 1 < self.total_points {
                warn!(
                    "Service reported calibration complete at point {}/{}, finishing early",
                    index + 1,
                    self.total_points
                );
            }
            self.complete();
            return CalibrationTransition::Completed;
        }

        if !success {
            debug!("Calibration sample rejected by service");
            return CalibrationTransition::Ignored;
        }

        // Counts are per point; anything past the requirement answers a
        // duplicate sample for a point that already finished
        if samples_collected > self.samples_required {
            debug!(
                "Stale calibration report ({} > {} samples) ignored at point {}",
                samples_collected,
                self.samples_required,
                index + 1
            );
            return CalibrationTransition::Ignored;
        }

        self.samples_collected = samples_collected;

        if self.samples_collected < self.samples_required {
            return CalibrationTransition::SampleAccepted {
                samples_collected: self.samples_collected,
            };
        }

        if index + 1 >= self.total_points {
            self.complete();
            CalibrationTransition::Completed
        } else {
            self.current_point_index = Some(index + 1);
            self.samples_collected = 0;
            debug!("Calibration advanced to point {}", index + 2);
            CalibrationTransition::PointAdvanced { index: index + 1 }
        }
    }

    /// Abandon the running procedure, keeping any earlier calibration
    pub fn cancel(&mut self) {
        if self.is_calibrating {
            info!("Calibration cancelled");
            self.is_calibrated = self.prior_calibrated;
        }
        self.is_calibrating = false;
        self.current_point_index = None;
        self.samples_collected = 0;
    }

    /// Forget calibration entirely. A running procedure restarts at point 0.
    pub fn reset(&mut self) {
        self.is_calibrated = false;
        self.prior_calibrated = false;
        self.samples_collected = 0;
        self.current_point_index = if self.is_calibrating { Some(0) } else { None };
    }

    /// Overall progress through the grid, 0.0 - 1.0
    pub fn progress(&self) -> f64 {
        if self.is_calibrated && !self.is_calibrating {
            return 1.0;
        }
        match self.current_point_index {
            Some(index) => {
                let per_point = self.samples_collected as f64 / self.samples_required as f64;
                (index as f64 + per_point) / self.total_points as f64
            }
            None => 0.0,
        }
    }

    fn complete(&mut self) {
        self.is_calibrating = false;
        self.is_calibrated = true;
        self.prior_calibrated = true;
        self.current_point_index = None;
        self.samples_collected = 0;
        info!("Calibration complete");
    }
}

impl Default for CalibrationState {
    fn default() -> Self {
        Self::new(10)
    }
}
