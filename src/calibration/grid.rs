/// A fixed on-screen calibration target in normalized coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationPoint {
    pub x: f64,
    pub y: f64,
}

impl CalibrationPoint {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Corners, edge midpoints and center, row-major from top-left
pub const CALIBRATION_POINTS: [CalibrationPoint; 9] = [
    CalibrationPoint::new(0.1, 0.1),
    CalibrationPoint::new(0.5, 0.1),
    CalibrationPoint::new(0.9, 0.1),
    CalibrationPoint::new(0.1, 0.5),
    CalibrationPoint::new(0.5, 0.5),
    CalibrationPoint::new(0.9, 0.5),
    CalibrationPoint::new(0.1, 0.9),
    CalibrationPoint::new(0.5, 0.9),
    CalibrationPoint::new(0.9, 0.9),
];

/// Number of points in the grid
pub const TOTAL_CALIBRATION_POINTS: usize = CALIBRATION_POINTS.len();
