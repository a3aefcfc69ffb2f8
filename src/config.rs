use crate::recovery::ReconnectPolicy;
use config::{Config, ConfigError, Environment, File};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

/// Allowed dwell threshold range, in milliseconds
pub const DWELL_THRESHOLD_RANGE_MS: (u64, u64) = (400, 1500);

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct GazelinkConfig {
    pub backend: BackendConfig,
    pub tracking: TrackingConfig,
    pub calibration: CalibrationConfig,
    pub dwell: DwellConfig,
    pub reconnect: ReconnectConfig,
    pub camera: CameraConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct BackendConfig {
    /// Backend base URL (http or https)
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Patient whose video stream is shown
    #[serde(default = "default_patient_id")]
    pub patient_id: String,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct TrackingConfig {
    /// Frames per second sent while tracking
    #[serde(default = "default_frame_rate")]
    pub frame_rate: u32,

    /// JPEG quality, 0.0 - 1.0
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: f32,

    /// Output width of captured frames
    #[serde(default = "default_capture_width")]
    pub capture_width: u32,

    /// Output height of captured frames
    #[serde(default = "default_capture_height")]
    pub capture_height: u32,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct CalibrationConfig {
    /// Accepted samples required before moving to the next point
    #[serde(default = "default_samples_per_point")]
    pub samples_per_point: u32,

    /// Period of the sample collection loop
    #[serde(default = "default_sample_interval_ms")]
    pub sample_interval_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct DwellConfig {
    /// Sustained gaze needed to activate a target
    #[serde(default = "default_dwell_threshold_ms")]
    pub threshold_ms: u64,

    /// Pause after an activation before dwell timing restarts
    #[serde(default = "default_dwell_cooldown_ms")]
    pub cooldown_ms: u64,

    /// Extra pixels added around every hit target
    #[serde(default = "default_dwell_padding_px")]
    pub padding_px: f64,

    /// Re-evaluation period of the dwell driver
    #[serde(default = "default_dwell_tick_ms")]
    pub tick_ms: u64,

    /// Screen size normalized gaze is scaled to
    #[serde(default = "default_viewport_width")]
    pub viewport_width: u32,

    #[serde(default = "default_viewport_height")]
    pub viewport_height: u32,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ReconnectConfig {
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CameraSourceKind {
    /// Synthetic moving pattern, no hardware needed
    TestPattern,
    /// V4L2 webcam through GStreamer (feature `camera`)
    Webcam,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct CameraConfig {
    #[serde(default = "default_camera_source")]
    pub source: CameraSourceKind,

    /// Camera device index (e.g., 0 for /dev/video0)
    #[serde(default = "default_camera_index")]
    pub index: u32,
}

impl GazelinkConfig {
    /// Load configuration from default sources (file + environment variables)
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_file("gazelink.toml")
    }

    /// Load configuration from a specific file path
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);

        let settings = Config::builder()
            .set_default("backend.base_url", default_base_url())?
            .set_default("backend.patient_id", default_patient_id())?
            .set_default("tracking.frame_rate", default_frame_rate())?
            .set_default("tracking.jpeg_quality", default_jpeg_quality() as f64)?
            .set_default("tracking.capture_width", default_capture_width())?
            .set_default("tracking.capture_height", default_capture_height())?
            .set_default("calibration.samples_per_point", default_samples_per_point())?
            .set_default("calibration.sample_interval_ms", default_sample_interval_ms())?
            .set_default("dwell.threshold_ms", default_dwell_threshold_ms())?
            .set_default("dwell.cooldown_ms", default_dwell_cooldown_ms())?
            .set_default("dwell.padding_px", default_dwell_padding_px())?
            .set_default("dwell.tick_ms", default_dwell_tick_ms())?
            .set_default("dwell.viewport_width", default_viewport_width())?
            .set_default("dwell.viewport_height", default_viewport_height())?
            .set_default("reconnect.base_delay_ms", default_base_delay_ms())?
            .set_default("reconnect.max_delay_ms", default_max_delay_ms())?
            .set_default("camera.source", "test_pattern")?
            .set_default("camera.index", default_camera_index())?
            // Add configuration file (optional)
            .add_source(File::with_name(&path_str).required(false))
            // Environment overrides, e.g. GAZELINK_BACKEND__BASE_URL
            .add_source(
                Environment::with_prefix("GAZELINK")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        let config: GazelinkConfig = settings.try_deserialize()?;

        info!("Configuration loaded successfully");
        debug!("Final configuration: {:#?}", config);

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        let base = Url::parse(&self.backend.base_url).map_err(|e| {
            ConfigError::Message(format!(
                "Backend base_url '{}' is invalid: {}",
                self.backend.base_url, e
            ))
        })?;
        if base.scheme() != "http" && base.scheme() != "https" {
            return Err(ConfigError::Message(format!(
                "Backend base_url must use http or https, got '{}'",
                base.scheme()
            )));
        }

        if self.tracking.frame_rate == 0 || self.tracking.frame_rate > 60 {
            return Err(ConfigError::Message(
                "Tracking frame_rate must be between 1 and 60".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.tracking.jpeg_quality) {
            return Err(ConfigError::Message(
                "Tracking jpeg_quality must be between 0.0 and 1.0".to_string(),
            ));
        }

        if self.tracking.capture_width == 0 || self.tracking.capture_height == 0 {
            return Err(ConfigError::Message(
                "Capture size must be greater than 0".to_string(),
            ));
        }

        if self.calibration.samples_per_point == 0 {
            return Err(ConfigError::Message(
                "Calibration samples_per_point must be greater than 0".to_string(),
            ));
        }

        if self.dwell.viewport_width == 0 || self.dwell.viewport_height == 0 {
            return Err(ConfigError::Message(
                "Dwell viewport size must be greater than 0".to_string(),
            ));
        }

        if self.calibration.sample_interval_ms == 0 || self.dwell.tick_ms == 0 {
            return Err(ConfigError::Message(
                "Timer periods must be greater than 0".to_string(),
            ));
        }

        let (min, max) = DWELL_THRESHOLD_RANGE_MS;
        if self.dwell.threshold_ms < min || self.dwell.threshold_ms > max {
            return Err(ConfigError::Message(format!(
                "Dwell threshold_ms must be between {} and {}",
                min, max
            )));
        }

        if self.reconnect.base_delay_ms == 0
            || self.reconnect.base_delay_ms > self.reconnect.max_delay_ms
        {
            return Err(ConfigError::Message(
                "Reconnect delays must satisfy 0 < base_delay_ms <= max_delay_ms".to_string(),
            ));
        }

        Ok(())
    }

    /// WebSocket endpoint of the gaze inference service
    pub fn gaze_ws_url(&self) -> Result<String, ConfigError> {
        let base = self.backend.base_url.trim_end_matches('/');
        let ws_base = if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{}", rest)
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{}", rest)
        } else {
            return Err(ConfigError::Message(format!(
                "Cannot derive WebSocket URL from '{}'",
                self.backend.base_url
            )));
        };

        Ok(format!("{}/ws/gaze-tracking", ws_base))
    }

    /// Cache-busted URL of the live video stream
    pub fn video_stream_url(&self, patient_id: &str, cache_bust: i64) -> Result<String, ConfigError> {
        let base = self.backend.base_url.trim_end_matches('/');
        let mut url = Url::parse(&format!("{}/api/video/stream", base))
            .map_err(|e| ConfigError::Message(format!("Invalid video stream URL: {}", e)))?;

        url.query_pairs_mut()
            .append_pair("patient_id", patient_id)
            .append_pair("t", &cache_bust.to_string());

        Ok(url.to_string())
    }

    /// Backoff policy built from the reconnect section
    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy::new(
            Duration::from_millis(self.reconnect.base_delay_ms),
            Duration::from_millis(self.reconnect.max_delay_ms),
        )
    }
}

impl Default for GazelinkConfig {
    fn default() -> Self {
        Self {
            backend: BackendConfig {
                base_url: default_base_url(),
                patient_id: default_patient_id(),
            },
            tracking: TrackingConfig {
                frame_rate: default_frame_rate(),
                jpeg_quality: default_jpeg_quality(),
                capture_width: default_capture_width(),
                capture_height: default_capture_height(),
            },
            calibration: CalibrationConfig {
                samples_per_point: default_samples_per_point(),
                sample_interval_ms: default_sample_interval_ms(),
            },
            dwell: DwellConfig {
                threshold_ms: default_dwell_threshold_ms(),
                cooldown_ms: default_dwell_cooldown_ms(),
                padding_px: default_dwell_padding_px(),
                tick_ms: default_dwell_tick_ms(),
                viewport_width: default_viewport_width(),
                viewport_height: default_viewport_height(),
            },
            reconnect: ReconnectConfig {
                base_delay_ms: default_base_delay_ms(),
                max_delay_ms: default_max_delay_ms(),
            },
            camera: CameraConfig {
                source: default_camera_source(),
                index: default_camera_index(),
            },
        }
    }
}

// Default value functions
fn default_base_url() -> String {
    "http://localhost:8000".to_string()
}
fn default_patient_id() -> String {
    "default".to_string()
}

fn default_frame_rate() -> u32 {
    15
}
fn default_jpeg_quality() -> f32 {
    0.8
}
fn default_capture_width() -> u32 {
    640
}
fn default_capture_height() -> u32 {
    480
}

fn default_samples_per_point() -> u32 {
    10
}
fn default_sample_interval_ms() -> u64 {
    100
}

fn default_dwell_threshold_ms() -> u64 {
    800
}
fn default_dwell_cooldown_ms() -> u64 {
    200
}
fn default_dwell_padding_px() -> f64 {
    5.0
}
fn default_dwell_tick_ms() -> u64 {
    16
}
fn default_viewport_width() -> u32 {
    1920
}
fn default_viewport_height() -> u32 {
    1080
}

fn default_base_delay_ms() -> u64 {
    1000
}
fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_camera_source() -> CameraSourceKind {
    CameraSourceKind::TestPattern
}
fn default_camera_index() -> u32 {
    0
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = GazelinkConfig::default();

        assert!(config.validate().is_ok());
        assert_eq!(config.backend.base_url, "http://localhost:8000");
        assert_eq!(config.tracking.frame_rate, 15);
        assert_eq!(config.tracking.jpeg_quality, 0.8);
        assert_eq!(config.calibration.samples_per_point, 10);
        assert_eq!(config.dwell.threshold_ms, 800);
    }

    #[test]
    fn test_load_from_file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[backend]\nbase_url = \"https://care.example.org\"\n\n[tracking]\nframe_rate = 10\n\n[dwell]\nthreshold_ms = 1200"
        )
        .unwrap();

        let config = GazelinkConfig::load_from_file(file.path()).unwrap();

        assert_eq!(config.backend.base_url, "https://care.example.org");
        assert_eq!(config.tracking.frame_rate, 10);
        assert_eq!(config.dwell.threshold_ms, 1200);
        // Untouched values keep their defaults
        assert_eq!(config.calibration.samples_per_point, 10);
        assert_eq!(config.camera.source, CameraSourceKind::TestPattern);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = GazelinkConfig::default();

        config.dwell.threshold_ms = 300;
        assert!(config.validate().is_err());
        config.dwell.threshold_ms = 1500;
        assert!(config.validate().is_ok());

        config.tracking.jpeg_quality = 1.5;
        assert!(config.validate().is_err());
        config.tracking.jpeg_quality = 0.8;

        config.backend.base_url = "ftp://example.org".to_string();
        assert!(config.validate().is_err());
        config.backend.base_url = "http://localhost:8000".to_string();

        config.reconnect.base_delay_ms = 60_000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_gaze_ws_url_swaps_scheme() {
        let mut config = GazelinkConfig::default();
        assert_eq!(
            config.gaze_ws_url().unwrap(),
            "ws://localhost:8000/ws/gaze-tracking"
        );

        config.backend.base_url = "https://care.example.org/".to_string();
        assert_eq!(
            config.gaze_ws_url().unwrap(),
            "wss://care.example.org/ws/gaze-tracking"
        );
    }

    #[test]
    fn test_video_stream_url_is_cache_busted() {
        let config = GazelinkConfig::default();
        let url = config.video_stream_url("room 1", 1700000000000).unwrap();

        assert_eq!(
            url,
            "http://localhost:8000/api/video/stream?patient_id=room+1&t=1700000000000"
        );
    }

    #[test]
    fn test_reconnect_policy_from_config() {
        let config = GazelinkConfig::default();
        let policy = config.reconnect_policy();

        assert_eq!(policy.delay_ms(0), 1000);
        assert_eq!(policy.delay_ms(10), 30_000);
    }
}
