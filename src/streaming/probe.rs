use crate::error::ProbeError;
use async_trait::async_trait;
use bytes::{Buf, Bytes, BytesMut};
use futures::stream::BoxStream;
use futures::StreamExt;
use std::time::Duration;
use tracing::{debug, trace};

/// Frames delivered by an open feed; an `Err` item means the feed broke
pub type FrameStream = BoxStream<'static, Result<Bytes, ProbeError>>;

/// Largest amount of data buffered while looking for a complete JPEG
pub const MAX_FRAME_BYTES: usize = 8 * 1024 * 1024;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Loads a still-image style feed, the way an `<img>` element would.
///
/// `load` resolves once the first image arrived ("loaded") or fails
/// ("error"). The returned stream keeps yielding later frames.
#[async_trait]
pub trait ImageProbe: Send + Sync {
    async fn load(&self, url: &str) -> Result<FrameStream, ProbeError>;
}

/// Pulls complete JPEG images out of an arbitrary byte stream
#[derive(Debug, Default)]
pub struct JpegScanner {
    buffer: BytesMut,
}

impl JpegScanner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Next complete SOI..EOI image, if one is buffered
    pub fn next_frame(&mut self) -> Option<Bytes> {
        let Some(start) = find_marker(&self.buffer, 0xD8, 0) else {
            // Keep a trailing 0xFF in case the marker is split across chunks
            let keep = usize::from(self.buffer.last() == Some(&0xFF));
            self.buffer.advance(self.buffer.len() - keep);
            return None;
        };

        let end = find_marker(&self.buffer, 0xD9, start + 2)?;
        self.buffer.advance(start);
        let frame = self.buffer.split_to(end - start + 2).freeze();
        trace!("Extracted JPEG frame ({} bytes)", frame.len());
        Some(frame)
    }
}

fn find_marker(data: &[u8], marker: u8, from: usize) -> Option<usize> {
    data.get(from..)?
        .windows(2)
        .position(|pair| pair[0] == 0xFF && pair[1] == marker)
        .map(|offset| from + offset)
}

/// HTTP probe for `image/*` and `multipart/x-mixed-replace` (MJPEG) feeds
pub struct HttpImageProbe {
    client: reqwest::Client,
}

impl HttpImageProbe {
    pub fn new() -> Result<Self, ProbeError> {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| ProbeError::Request {
                details: e.to_string(),
            })?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ImageProbe for HttpImageProbe {
    async fn load(&self, url: &str) -> Result<FrameStream, ProbeError> {
        debug!("Loading video stream from {}", url);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ProbeError::Request {
                details: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProbeError::Status {
                status: status.as_u16(),
            });
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_ascii_lowercase();

        let multipart = content_type.starts_with("multipart/x-mixed-replace");
        if !multipart && !content_type.starts_with("image/") {
            return Err(ProbeError::ContentType { content_type });
        }

        let mut body = Box::pin(response.bytes_stream());
        let mut scanner = JpegScanner::new();

        let first = loop {
            if let Some(frame) = scanner.next_frame() {
                break frame;
            }
            if scanner.buffered() > MAX_FRAME_BYTES {
                return Err(ProbeError::NoImage {
                    limit: MAX_FRAME_BYTES,
                });
            }
            match body.next().await {
                Some(Ok(chunk)) => scanner.push(&chunk),
                Some(Err(e)) => {
                    return Err(ProbeError::Request {
                        details: e.to_string(),
                    })
                }
                None => return Err(ProbeError::Ended),
            }
        };

        let frames = async_stream::stream! {
            yield Ok(first);

            loop {
                while let Some(frame) = scanner.next_frame() {
                    yield Ok(frame);
                }
                if scanner.buffered() > MAX_FRAME_BYTES {
                    yield Err(ProbeError::NoImage { limit: MAX_FRAME_BYTES });
                    break;
                }
                match body.next().await {
                    Some(Ok(chunk)) => scanner.push(&chunk),
                    Some(Err(e)) => {
                        yield Err(ProbeError::Request { details: e.to_string() });
                        break;
                    }
                    None => {
                        // A single image is done; a live feed ending is a failure
                        if multipart {
                            yield Err(ProbeError::Ended);
                        }
                        break;
                    }
                }
            }
        };

        Ok(frames.boxed())
    }
}
