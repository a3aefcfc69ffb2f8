mod encode;
mod sampler;

pub use encode::{jpeg_quality_percent, FrameEncoder, JpegDataUrlEncoder, JPEG_DATA_URL_PREFIX};
pub use sampler::FrameCapture;
