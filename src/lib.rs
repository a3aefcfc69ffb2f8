pub mod app;
pub mod calibration;
pub mod camera;
pub mod capture;
pub mod config;
pub mod dwell;
pub mod error;
pub mod events;
pub mod frame;
pub mod recovery;
pub mod streaming;
pub mod task;
pub mod transport;

pub use app::{ComponentState, GazelinkOrchestrator, RunOptions, ShutdownReason, ShutdownTrigger};
pub use calibration::{CalibrationPoint, CalibrationState, CALIBRATION_POINTS};
pub use camera::{Camera, CameraSource, TestPatternSource};
pub use capture::FrameCapture;
pub use config::GazelinkConfig;
pub use dwell::{DwellDriver, DwellEngine, HitTarget, Viewport};
pub use error::{GazelinkError, Result};
pub use events::{EventBus, GazelinkEvent};
pub use frame::{CapturedFrame, RawFrame};
pub use recovery::{ReconnectAttempts, ReconnectPolicy};
pub use streaming::{HttpImageProbe, ImageProbe, VideoStreamReconnector, VideoStreamState};
pub use task::ScopedTask;
pub use transport::{ConnectionState, GazeClient, GazeSample};
