use crate::error::ProtocolError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::SystemTime;

/// Client-to-service messages, tagged by `action`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum OutboundMessage {
    /// A tracking frame as a `data:image/jpeg;base64,` URL
    Track { frame: String },
    /// A calibration sample for the target at normalized (`target_x`, `target_y`)
    Calibrate {
        frame: String,
        target_x: f64,
        target_y: f64,
    },
    ResetCalibration,
    GetStats,
}

impl OutboundMessage {
    /// Serialize to the JSON text frame sent on the socket
    pub fn to_json(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(|e| ProtocolError::Encode {
            details: e.to_string(),
        })
    }

    /// Wire name of the action
    pub fn action(&self) -> &'static str {
        match self {
            OutboundMessage::Track { .. } => "track",
            OutboundMessage::Calibrate { .. } => "calibrate",
            OutboundMessage::ResetCalibration => "reset_calibration",
            OutboundMessage::GetStats => "get_stats",
        }
    }

    /// Frame messages may be dropped under backpressure, control messages may not
    pub fn is_frame(&self) -> bool {
        matches!(self, OutboundMessage::Track { .. })
    }
}

/// Service-to-client messages, tagged by `type`.
///
/// Closed set: an unknown `type` fails to decode and is treated as malformed.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundMessage {
    GazeData(GazeDataPayload),
    CalibrationResponse(CalibrationResponse),
    CalibrationReset(CalibrationResetPayload),
    Stats(ServerStats),
    Heartbeat(Heartbeat),
    Error(ErrorPayload),
}

impl InboundMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            InboundMessage::GazeData(_) => "gaze_data",
            InboundMessage::CalibrationResponse(_) => "calibration_response",
            InboundMessage::CalibrationReset(_) => "calibration_reset",
            InboundMessage::Stats(_) => "stats",
            InboundMessage::Heartbeat(_) => "heartbeat",
            InboundMessage::Error(_) => "error",
        }
    }
}

/// Decode a text frame from the inference service
pub fn decode_inbound(text: &str) -> Result<InboundMessage, ProtocolError> {
    serde_json::from_str(text).map_err(|e| ProtocolError::Malformed {
        details: e.to_string(),
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct IrisCenter {
    pub x: f64,
    pub y: f64,
}

/// Raw `gaze_data` body as sent by the service
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GazeDataPayload {
    #[serde(default)]
    pub success: bool,
    #[serde(default, alias = "gaze_x")]
    pub x: Option<f64>,
    #[serde(default, alias = "gaze_y")]
    pub y: Option<f64>,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub quality: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub left_iris: Option<IrisCenter>,
    #[serde(default)]
    pub right_iris: Option<IrisCenter>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CalibrationResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub samples_collected: u32,
    #[serde(default)]
    pub is_calibrated: bool,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CalibrationResetPayload {
    #[serde(default)]
    pub success: bool,
}

/// Advisory counters from the service
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
pub struct ServerStats {
    #[serde(default)]
    pub frames_processed: u64,
    #[serde(default)]
    pub frames_dropped: u64,
    #[serde(default)]
    pub fps: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Heartbeat {
    #[serde(default)]
    pub timestamp: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ErrorPayload {
    #[serde(default)]
    pub message: String,
}

/// Categorical tracking quality reported alongside a sample
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GazeQuality {
    Good,
    Fair,
    Poor,
    Unknown,
}

impl GazeQuality {
    pub fn from_label(label: &str) -> Self {
        match label.to_ascii_lowercase().as_str() {
            "good" | "high" | "excellent" => GazeQuality::Good,
            "fair" | "medium" | "ok" => GazeQuality::Fair,
            "poor" | "low" | "bad" => GazeQuality::Poor,
            _ => GazeQuality::Unknown,
        }
    }
}

impl fmt::Display for GazeQuality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            GazeQuality::Good => "good",
            GazeQuality::Fair => "fair",
            GazeQuality::Poor => "poor",
            GazeQuality::Unknown => "unknown",
        };
        f.write_str(label)
    }
}

/// One inference result.
///
/// `x` and `y` are normalized to [0, 1] with the origin top-left. They are
/// only meaningful when `success` is true.
#[derive(Debug, Clone, PartialEq)]
pub struct GazeSample {
    pub x: f64,
    pub y: f64,
    pub confidence: f64,
    pub quality: GazeQuality,
    pub success: bool,
    pub error: Option<String>,
    pub left_iris: Option<IrisCenter>,
    pub right_iris: Option<IrisCenter>,
    pub received_at: SystemTime,
}

impl GazeSample {
    /// Successful sample at the given point, values clamped into range
    pub fn at(x: f64, y: f64, confidence: f64) -> Self {
        Self {
            x: clamp_unit(x),
            y: clamp_unit(y),
            confidence: clamp_unit(confidence),
            quality: GazeQuality::Unknown,
            success: true,
            error: None,
            left_iris: None,
            right_iris: None,
            received_at: SystemTime::now(),
        }
    }

    /// Failed sample carrying the service's reason
    pub fn lost<S: Into<String>>(reason: S) -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            confidence: 0.0,
            quality: GazeQuality::Unknown,
            success: false,
            error: Some(reason.into()),
            left_iris: None,
            right_iris: None,
            received_at: SystemTime::now(),
        }
    }
}

impl From<GazeDataPayload> for GazeSample {
    fn from(payload: GazeDataPayload) -> Self {
        let quality = payload
            .quality
            .as_deref()
            .map(GazeQuality::from_label)
            .unwrap_or(GazeQuality::Unknown);

        let mut sample = match (payload.success, payload.x, payload.y) {
            (true, Some(x), Some(y)) if x.is_finite() && y.is_finite() => {
                GazeSample::at(x, y, payload.confidence.unwrap_or(0.0))
            }
            (true, _, _) => GazeSample::lost("gaze coordinates missing"),
            (false, _, _) => {
                GazeSample::lost(payload.error.unwrap_or_else(|| "no gaze detected".to_string()))
            }
        };

        sample.quality = quality;
        sample.left_iris = payload.left_iris;
        sample.right_iris = payload.right_iris;
        sample
    }
}

fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}
