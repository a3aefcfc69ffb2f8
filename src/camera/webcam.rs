use super::interface::{CameraSource, VideoFeed};
use crate::error::CameraError;
use crate::frame::{FrameFormat, RawFrame};
use async_trait::async_trait;
use gstreamer::prelude::*;
use gstreamer::Pipeline;
use gstreamer_app::AppSink;
use gstreamer_video::VideoInfo;
use tracing::{debug, info, warn};

/// V4L2 webcam read through a GStreamer pipeline
pub struct WebcamSource {
    index: u32,
}

impl WebcamSource {
    pub fn new(index: u32) -> Self {
        Self { index }
    }

    /// Build GStreamer pipeline string producing packed RGB samples
    fn build_pipeline_string(&self) -> String {
        format!(
            "v4l2src device=/dev/video{} ! \
             videoconvert ! video/x-raw,format=RGB ! \
             appsink name=sink sync=false max-buffers=1 drop=true emit-signals=false",
            self.index
        )
    }
}

#[async_trait]
impl CameraSource for WebcamSource {
    fn name(&self) -> &str {
        "webcam"
    }

    async fn open(&self) -> Result<Box<dyn VideoFeed>, CameraError> {
        gstreamer::init().map_err(|e| CameraError::Configuration {
            details: format!("Failed to initialize GStreamer: {}", e),
        })?;

        let pipeline_desc = self.build_pipeline_string();
        info!("Creating GStreamer pipeline: {}", pipeline_desc);

        let pipeline = gstreamer::parse::launch(&pipeline_desc)
            .map_err(|e| CameraError::Configuration {
                details: format!("Failed to create pipeline: {}", e),
            })?
            .downcast::<Pipeline>()
            .map_err(|_| CameraError::Configuration {
                details: "Failed to downcast to Pipeline".to_string(),
            })?;

        let appsink = pipeline
            .by_name("sink")
            .ok_or_else(|| CameraError::Configuration {
                details: "Pipeline has no appsink".to_string(),
            })?
            .downcast::<AppSink>()
            .map_err(|_| CameraError::Configuration {
                details: "Failed to downcast to AppSink".to_string(),
            })?;

        if let Err(e) = pipeline.set_state(gstreamer::State::Playing) {
            warn!("Failed to start webcam pipeline: {}", e);
            let _ = pipeline.set_state(gstreamer::State::Null);
            return Err(CameraError::DeviceBusy { device: self.index });
        }

        Ok(Box::new(WebcamFeed {
            pipeline,
            appsink,
            frame_counter: 0,
            last_frame: None,
        }))
    }
}

struct WebcamFeed {
    pipeline: Pipeline,
    appsink: AppSink,
    frame_counter: u64,
    last_frame: Option<RawFrame>,
}

impl WebcamFeed {
    fn pull_frame(&mut self) -> Option<RawFrame> {
        let sample = self.appsink.try_pull_sample(gstreamer::ClockTime::ZERO)?;
        let caps = sample.caps()?;
        let info = VideoInfo::from_caps(caps).ok()?;
        let buffer = sample.buffer()?;
        let map = buffer.map_readable().ok()?;

        let width = info.width();
        let height = info.height();
        let stride = info.stride()[0] as usize;
        let row_bytes = width as usize * 3;

        // Strip row padding so the frame is tightly packed
        let mut data = Vec::with_capacity(row_bytes * height as usize);
        for row in 0..height as usize {
            let start = row * stride;
            data.extend_from_slice(map.get(start..start + row_bytes)?);
        }

        self.frame_counter += 1;
        Some(RawFrame::new(
            self.frame_counter,
            data,
            width,
            height,
            FrameFormat::Rgb24,
        ))
    }
}

impl VideoFeed for WebcamFeed {
    fn current_frame(&mut self) -> Option<RawFrame> {
        if let Some(frame) = self.pull_frame() {
            self.last_frame = Some(frame);
        }
        self.last_frame.clone()
    }

    fn release(&mut self) {
        debug!("Stopping webcam pipeline");
        if let Err(e) = self.pipeline.set_state(gstreamer::State::Null) {
            warn!("Failed to stop webcam pipeline: {}", e);
        }
        self.last_frame = None;
    }
}
