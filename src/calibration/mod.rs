mod grid;
mod state;

pub use grid::{CalibrationPoint, CALIBRATION_POINTS, TOTAL_CALIBRATION_POINTS};
pub use state::{CalibrationState, CalibrationTransition};
