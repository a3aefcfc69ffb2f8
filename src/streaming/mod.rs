mod probe;
mod reconnector;

pub use probe::{FrameStream, HttpImageProbe, ImageProbe, JpegScanner, MAX_FRAME_BYTES};
pub use reconnector::{VideoStreamReconnector, VideoStreamState, VIDEO_STREAM_ERROR};
