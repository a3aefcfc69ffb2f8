use crate::error::CaptureError;
use crate::frame::{FrameFormat, RawFrame};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::{DynamicImage, RgbImage, RgbaImage};
use tracing::trace;

/// Prefix of every payload produced by [`JpegDataUrlEncoder`]
pub const JPEG_DATA_URL_PREFIX: &str = "data:image/jpeg;base64,";

/// Turns a raw frame into a self-describing still-image payload
pub trait FrameEncoder: Send + Sync {
    /// Scale `frame` to `width`x`height` and encode it at `quality` (0.0 - 1.0)
    fn encode(
        &self,
        frame: &RawFrame,
        width: u32,
        height: u32,
        quality: f32,
    ) -> Result<String, CaptureError>;
}

/// JPEG encoder emitting `data:image/jpeg;base64,...` URLs
#[derive(Debug, Default, Clone, Copy)]
pub struct JpegDataUrlEncoder;

impl FrameEncoder for JpegDataUrlEncoder {
    fn encode(
        &self,
        frame: &RawFrame,
        width: u32,
        height: u32,
        quality: f32,
    ) -> Result<String, CaptureError> {
        let rgb = to_rgb_image(frame)?;

        // Plain stretch to the output size, aspect ratio is not preserved
        let scaled = if rgb.dimensions() == (width, height) {
            rgb
        } else {
            imageops::resize(&rgb, width, height, FilterType::Triangle)
        };

        let jpeg = encode_jpeg(&scaled, quality)?;

        trace!(
            "Encoded frame {} to {}x{} JPEG ({} bytes)",
            frame.id,
            width,
            height,
            jpeg.len()
        );

        Ok(format!("{}{}", JPEG_DATA_URL_PREFIX, STANDARD.encode(&jpeg)))
    }
}

/// Map a 0.0 - 1.0 quality onto the encoder's 1 - 100 scale
pub fn jpeg_quality_percent(quality: f32) -> u8 {
    (quality.clamp(0.0, 1.0) * 100.0).round().max(1.0) as u8
}

fn to_rgb_image(frame: &RawFrame) -> Result<RgbImage, CaptureError> {
    let invalid = || CaptureError::InvalidBuffer {
        width: frame.width,
        height: frame.height,
    };

    match frame.format {
        FrameFormat::Rgb24 => {
            RgbImage::from_raw(frame.width, frame.height, frame.data.as_ref().clone())
                .ok_or_else(invalid)
        }
        FrameFormat::Rgba32 => {
            let rgba = RgbaImage::from_raw(frame.width, frame.height, frame.data.as_ref().clone())
                .ok_or_else(invalid)?;
            Ok(DynamicImage::ImageRgba8(rgba).to_rgb8())
        }
    }
}

fn encode_jpeg(image: &RgbImage, quality: f32) -> Result<Vec<u8>, CaptureError> {
    let mut jpeg_bytes = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut jpeg_bytes, jpeg_quality_percent(quality));

    encoder
        .encode_image(image)
        .map_err(|e| CaptureError::JpegEncoding {
            details: e.to_string(),
        })?;

    Ok(jpeg_bytes)
}
