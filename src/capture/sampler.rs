use super::encode::{FrameEncoder, JpegDataUrlEncoder};
use crate::camera::Camera;
use crate::config::TrackingConfig;
use crate::frame::{CapturedFrame, RawFrame};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{trace, warn};

/// Samples the camera and produces transport-ready still images.
///
/// A capture never fails loudly: when the camera has no decodable frame yet,
/// or encoding fails, the caller gets `None` and skips the tick.
pub struct FrameCapture {
    encoder: Arc<dyn FrameEncoder>,
    width: u32,
    height: u32,
    quality: f32,
    captures: AtomicU64,
    skipped: AtomicU64,
}

impl FrameCapture {
    /// Create a capture stage with the JPEG encoder and the configured output size
    pub fn new(config: &TrackingConfig) -> Self {
        Self::with_encoder(
            Arc::new(JpegDataUrlEncoder),
            config.capture_width,
            config.capture_height,
            config.jpeg_quality,
        )
    }

    /// Create a capture stage with a custom encoder
    pub fn with_encoder(encoder: Arc<dyn FrameEncoder>, width: u32, height: u32, quality: f32) -> Self {
        Self {
            encoder,
            width,
            height,
            quality: quality.clamp(0.0, 1.0),
            captures: AtomicU64::new(0),
            skipped: AtomicU64::new(0),
        }
    }

    /// Grab the camera's current frame and encode it
    pub fn capture(&self, camera: &Camera) -> Option<CapturedFrame> {
        match camera.grab_frame() {
            Some(frame) => self.encode(&frame),
            None => {
                self.skipped.fetch_add(1, Ordering::Relaxed);
                trace!("No camera frame ready, skipping capture tick");
                None
            }
        }
    }

    /// Encode an already grabbed frame
    pub fn encode(&self, frame: &RawFrame) -> Option<CapturedFrame> {
        if !frame.is_decodable() {
            self.skipped.fetch_add(1, Ordering::Relaxed);
            return None;
        }

        match self
            .encoder
            .encode(frame, self.width, self.height, self.quality)
        {
            Ok(data_url) => {
                self.captures.fetch_add(1, Ordering::Relaxed);
                let captured = CapturedFrame {
                    source_id: frame.id,
                    data_url,
                    width: self.width,
                    height: self.height,
                };
                trace!(
                    "Captured frame {} ({} ms old, {} bytes)",
                    frame.id,
                    frame.age_ms(),
                    captured.len()
                );
                Some(captured)
            }
            Err(e) => {
                self.skipped.fetch_add(1, Ordering::Relaxed);
                warn!("Failed to encode frame {}: {}", frame.id, e);
                None
            }
        }
    }

    /// Output size of every captured frame
    pub fn output_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Number of frames successfully captured
    pub fn capture_count(&self) -> u64 {
        self.captures.load(Ordering::Relaxed)
    }

    /// Number of ticks that produced no frame
    pub fn skipped_count(&self) -> u64 {
        self.skipped.load(Ordering::Relaxed)
    }
}
