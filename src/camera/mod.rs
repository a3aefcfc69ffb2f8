mod interface;
mod pattern;
#[cfg(all(feature = "camera", target_os = "linux"))]
mod webcam;
#[cfg(test)]
mod tests;

pub use interface::{Camera, CameraSource, VideoFeed};
pub use pattern::{PatternStats, TestPatternSource};
#[cfg(all(feature = "camera", target_os = "linux"))]
pub use webcam::WebcamSource;
