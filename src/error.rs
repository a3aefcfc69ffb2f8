use thiserror::Error;

#[derive(Error, Debug)]
pub enum GazelinkError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Camera error: {0}")]
    Camera(#[from] CameraError),

    #[error("Capture error: {0}")]
    Capture(#[from] CaptureError),

    #[error("Video stream error: {0}")]
    Probe(#[from] ProbeError),

    #[error("System error: {message}")]
    System { message: String },

    #[error("Component error in {component}: {message}")]
    Component { component: String, message: String },
}

/// Gaze transport (WebSocket) failures
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransportError {
    #[error("Failed to connect to {url}: {details}")]
    Connect { url: String, details: String },

    #[error("Not connected")]
    NotConnected,

    #[error("Send failed: {details}")]
    Send { details: String },

    #[error("Connection closed")]
    Closed,
}

/// Inbound/outbound wire format failures
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProtocolError {
    #[error("Malformed message: {details}")]
    Malformed { details: String },

    #[error("Unsupported frame type: {kind}")]
    UnsupportedFrame { kind: String },

    #[error("Failed to encode message: {details}")]
    Encode { details: String },
}

/// Camera acquisition failures, reported separately from transport state
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CameraError {
    #[error("Camera permission denied")]
    PermissionDenied,

    #[error("Camera device {device} is busy")]
    DeviceBusy { device: u32 },

    #[error("Camera not available")]
    NotAvailable,

    #[error("Camera configuration failed: {details}")]
    Configuration { details: String },
}

/// Frame capture failures
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CaptureError {
    #[error("Frame buffer does not match {width}x{height}")]
    InvalidBuffer { width: u32, height: u32 },

    #[error("JPEG encoding failed: {details}")]
    JpegEncoding { details: String },
}

/// Video stream load failures
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProbeError {
    #[error("Request failed: {details}")]
    Request { details: String },

    #[error("Unexpected status {status}")]
    Status { status: u16 },

    #[error("Unexpected content type: {content_type}")]
    ContentType { content_type: String },

    #[error("Stream ended")]
    Ended,

    #[error("No image received within {limit} bytes")]
    NoImage { limit: usize },
}

impl GazelinkError {
    pub fn system<S: Into<String>>(message: S) -> Self {
        Self::System {
            message: message.into(),
        }
    }

    pub fn component<S: Into<String>>(component: S, message: S) -> Self {
        Self::Component {
            component: component.into(),
            message: message.into(),
        }
    }

    /// Everything except a bad configuration can be retried by the caller
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, GazelinkError::Config(_) | GazelinkError::Serialization(_))
    }
}

pub type Result<T> = std::result::Result<T, GazelinkError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_conversion_and_display() {
        let err: GazelinkError = CameraError::PermissionDenied.into();
        assert_eq!(err.to_string(), "Camera error: Camera permission denied");
        assert!(err.is_recoverable());

        let err: GazelinkError = TransportError::Connect {
            url: "ws://localhost:8000/ws/gaze-tracking".to_string(),
            details: "refused".to_string(),
        }
        .into();
        assert!(err.to_string().contains("ws://localhost:8000/ws/gaze-tracking"));
    }

    #[test]
    fn test_config_errors_are_not_recoverable() {
        let err = GazelinkError::Config(config::ConfigError::Message("bad".to_string()));
        assert!(!err.is_recoverable());
    }
}
