use super::interface::{CameraSource, VideoFeed};
use crate::error::CameraError;
use crate::frame::{FrameFormat, RawFrame};
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Shared counters so callers can observe what a pattern source did
#[derive(Debug, Default)]
pub struct PatternStats {
    pub opens: AtomicU64,
    pub releases: AtomicU64,
    pub frames_served: AtomicU64,
}

impl PatternStats {
    pub fn opens(&self) -> u64 {
        self.opens.load(Ordering::Relaxed)
    }

    pub fn releases(&self) -> u64 {
        self.releases.load(Ordering::Relaxed)
    }

    pub fn frames_served(&self) -> u64 {
        self.frames_served.load(Ordering::Relaxed)
    }
}

/// Synthetic camera producing a moving gradient, for running without hardware
pub struct TestPatternSource {
    width: u32,
    height: u32,
    warmup_frames: u64,
    open_delay: Duration,
    failure: Option<CameraError>,
    stats: Arc<PatternStats>,
}

impl TestPatternSource {
    /// Create a pattern source producing `width`x`height` RGB frames
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            warmup_frames: 0,
            open_delay: Duration::ZERO,
            failure: None,
            stats: Arc::new(PatternStats::default()),
        }
    }

    /// Report "no frame yet" for the first `frames` grabs, like a camera still warming up
    pub fn with_warmup(mut self, frames: u64) -> Self {
        self.warmup_frames = frames;
        self
    }

    /// Take `delay` to open, like a device negotiating formats
    pub fn with_open_delay(mut self, delay: Duration) -> Self {
        self.open_delay = delay;
        self
    }

    /// Make every `open` fail with the given error
    pub fn failing(mut self, error: CameraError) -> Self {
        self.failure = Some(error);
        self
    }

    /// Counters shared with every feed this source opens
    pub fn stats(&self) -> Arc<PatternStats> {
        Arc::clone(&self.stats)
    }
}

impl Default for TestPatternSource {
    fn default() -> Self {
        Self::new(320, 240)
    }
}

#[async_trait]
impl CameraSource for TestPatternSource {
    fn name(&self) -> &str {
        "test_pattern"
    }

    async fn open(&self) -> Result<Box<dyn VideoFeed>, CameraError> {
        if !self.open_delay.is_zero() {
            tokio::time::sleep(self.open_delay).await;
        }
        if let Some(error) = &self.failure {
            return Err(error.clone());
        }

        self.stats.opens.fetch_add(1, Ordering::Relaxed);
        info!("Test pattern camera opened ({}x{})", self.width, self.height);

        Ok(Box::new(PatternFeed {
            width: self.width,
            height: self.height,
            warmup_remaining: self.warmup_frames,
            frame_counter: 0,
            released: false,
            stats: Arc::clone(&self.stats),
        }))
    }
}

struct PatternFeed {
    width: u32,
    height: u32,
    warmup_remaining: u64,
    frame_counter: u64,
    released: bool,
    stats: Arc<PatternStats>,
}

impl PatternFeed {
    fn render(&self) -> Vec<u8> {
        let shift = (self.frame_counter * 4) as u32;
        let mut data = Vec::with_capacity((self.width * self.height * 3) as usize);

        for y in 0..self.height {
            for x in 0..self.width {
                data.push(((x + shift) % 256) as u8);
                data.push(((y + shift / 2) % 256) as u8);
                data.push(((x ^ y) % 256) as u8);
            }
        }

        data
    }
}

impl VideoFeed for PatternFeed {
    fn current_frame(&mut self) -> Option<RawFrame> {
        if self.released {
            return None;
        }

        if self.warmup_remaining > 0 {
            self.warmup_remaining -= 1;
            debug!("Test pattern warming up ({} left)", self.warmup_remaining);
            return None;
        }

        self.frame_counter += 1;
        self.stats.frames_served.fetch_add(1, Ordering::Relaxed);

        Some(RawFrame::new(
            self.frame_counter,
            self.render(),
            self.width,
            self.height,
            FrameFormat::Rgb24,
        ))
    }

    fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.stats.releases.fetch_add(1, Ordering::Relaxed);
        }
    }
}
