use std::sync::Arc;
use std::time::SystemTime;

/// Pixel layout of a raw camera frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameFormat {
    /// Packed 8-bit RGB
    Rgb24,
    /// Packed 8-bit RGBA (alpha ignored when encoding)
    Rgba32,
}

impl FrameFormat {
    /// Get bytes per pixel for the format
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            FrameFormat::Rgb24 => 3,
            FrameFormat::Rgba32 => 4,
        }
    }
}

/// Raw frame as delivered by a camera feed
#[derive(Debug, Clone)]
pub struct RawFrame {
    /// Monotonic frame counter of the feed
    pub id: u64,
    /// Timestamp when frame was captured
    pub timestamp: SystemTime,
    /// Pixel data (shared ownership for efficiency)
    pub data: Arc<Vec<u8>>,
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Pixel layout
    pub format: FrameFormat,
}

impl RawFrame {
    /// Create a new raw frame
    pub fn new(id: u64, data: Vec<u8>, width: u32, height: u32, format: FrameFormat) -> Self {
        Self {
            id,
            timestamp: SystemTime::now(),
            data: Arc::new(data),
            width,
            height,
            format,
        }
    }

    /// Expected buffer length for the frame's dimensions
    pub fn expected_size(&self) -> usize {
        self.width as usize * self.height as usize * self.format.bytes_per_pixel()
    }

    /// A frame is decodable once it has non-zero dimensions and a full buffer
    pub fn is_decodable(&self) -> bool {
        self.width > 0 && self.height > 0 && self.data.len() == self.expected_size()
    }

    /// Get frame age in milliseconds
    pub fn age_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(self.timestamp)
            .unwrap_or_default()
            .as_millis() as u64
    }
}

/// Encoded still image ready for the wire
#[derive(Debug, Clone, PartialEq)]
pub struct CapturedFrame {
    /// Id of the raw frame it was made from
    pub source_id: u64,
    /// Self-describing `data:image/jpeg;base64,...` payload
    pub data_url: String,
    /// Output width
    pub width: u32,
    /// Output height
    pub height: u32,
}

impl CapturedFrame {
    /// Payload size in bytes
    pub fn len(&self) -> usize {
        self.data_url.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data_url.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_decodable() {
        let frame = RawFrame::new(1, vec![0u8; 4 * 2 * 3], 4, 2, FrameFormat::Rgb24);
        assert!(frame.is_decodable());

        let empty = RawFrame::new(2, Vec::new(), 0, 0, FrameFormat::Rgb24);
        assert!(!empty.is_decodable());

        let short = RawFrame::new(3, vec![0u8; 10], 4, 2, FrameFormat::Rgba32);
        assert!(!short.is_decodable());
    }
}
