use super::{ComponentState, RunOptions, ShutdownReason, ShutdownTrigger};
use crate::camera::{Camera, CameraSource, TestPatternSource};
use crate::config::{CameraConfig, CameraSourceKind, GazelinkConfig};
use crate::dwell::{keyboard_targets, DwellDriver};
use crate::error::Result;
use crate::events::EventBus;
use crate::streaming::{HttpImageProbe, VideoStreamReconnector};
use crate::task::ScopedTask;
use crate::transport::GazeClient;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{oneshot, Mutex};
use tracing::{debug, info, warn};

/// Wires the gaze pipeline and the video stream together and owns their lifecycles
pub struct GazelinkOrchestrator {
    pub(super) config: GazelinkConfig,
    pub(super) options: RunOptions,
    pub(super) event_bus: Arc<EventBus>,

    pub(super) camera: Option<Arc<Camera>>,
    pub(super) gaze_client: Option<Arc<GazeClient>>,
    pub(super) dwell_driver: Option<DwellDriver>,
    pub(super) video_stream: Option<VideoStreamReconnector>,

    /// Stats polling and similar helpers, cancelled on shutdown
    pub(super) background: Vec<ScopedTask>,

    pub(super) component_states: Arc<Mutex<HashMap<String, ComponentState>>>,
    pub(super) shutdown_trigger: ShutdownTrigger,
    pub(super) shutdown_receiver: Option<oneshot::Receiver<ShutdownReason>>,
}

impl GazelinkOrchestrator {
    /// Build every enabled component; nothing is started yet
    pub async fn new(config: GazelinkConfig, options: RunOptions) -> Result<Self> {
        info!("Creating Gazelink orchestrator ({:?})", options);

        let event_bus = Arc::new(EventBus::default());

        let (camera, gaze_client, dwell_driver) = if options.gaze {
            let source = build_camera_source(&config)?;
            let camera = Arc::new(Camera::new(source, Arc::clone(&event_bus)));
            let client = GazeClient::new(&config, Arc::clone(&camera), Arc::clone(&event_bus))?;

            let driver = DwellDriver::new(&config.dwell, Arc::clone(&event_bus));
            driver.set_targets(keyboard_targets(driver.viewport()));

            (Some(camera), Some(Arc::new(client)), Some(driver))
        } else {
            (None, None, None)
        };

        let video_stream = if options.video {
            let probe = Arc::new(HttpImageProbe::new()?);
            Some(VideoStreamReconnector::new(
                &config,
                probe,
                Arc::clone(&event_bus),
            ))
        } else {
            None
        };

        let (shutdown_sender, shutdown_receiver) = oneshot::channel();

        Ok(Self {
            config,
            options,
            event_bus,
            camera,
            gaze_client,
            dwell_driver,
            video_stream,
            background: Vec::new(),
            component_states: Arc::new(Mutex::new(HashMap::new())),
            shutdown_trigger: ShutdownTrigger::new(shutdown_sender),
            shutdown_receiver: Some(shutdown_receiver),
        })
    }

    pub fn config(&self) -> &GazelinkConfig {
        &self.config
    }

    pub fn options(&self) -> &RunOptions {
        &self.options
    }

    pub fn event_bus(&self) -> Arc<EventBus> {
        Arc::clone(&self.event_bus)
    }

    pub fn camera(&self) -> Option<Arc<Camera>> {
        self.camera.clone()
    }

    pub fn gaze_client(&self) -> Option<Arc<GazeClient>> {
        self.gaze_client.clone()
    }

    pub fn dwell_driver(&self) -> Option<&DwellDriver> {
        self.dwell_driver.as_ref()
    }

    pub fn video_stream(&self) -> Option<&VideoStreamReconnector> {
        self.video_stream.as_ref()
    }

    /// Handle for ending `run` from elsewhere in the process
    pub fn shutdown_trigger(&self) -> ShutdownTrigger {
        self.shutdown_trigger.clone()
    }

    /// Components this run manages, in start order
    pub(super) fn components(&self) -> Vec<&'static str> {
        let mut components = Vec::new();
        if self.video_stream.is_some() {
            components.push("video_stream");
        }
        if self.gaze_client.is_some() {
            components.extend(["camera", "gaze_transport", "tracking", "dwell"]);
        }
        components
    }

    /// Record a component transition, returning the state it replaced
    pub async fn set_component_state(
        &self,
        component: &str,
        state: ComponentState,
    ) -> Option<ComponentState> {
        let previous = self
            .component_states
            .lock()
            .await
            .insert(component.to_string(), state.clone());

        if previous.as_ref() == Some(&state) {
            return previous;
        }
        if state == ComponentState::Failed {
            warn!(component, from = ?previous, "Component failed");
        } else {
            debug!(component, from = ?previous, to = ?state, "Component state changed");
        }
        previous
    }

    pub async fn get_component_state(&self, component: &str) -> Option<ComponentState> {
        self.component_states.lock().await.get(component).cloned()
    }

    pub async fn get_all_component_states(&self) -> HashMap<String, ComponentState> {
        self.component_states.lock().await.clone()
    }

    /// Components that failed to start, sorted by name
    pub async fn failed_components(&self) -> Vec<String> {
        let mut failed: Vec<String> = self
            .component_states
            .lock()
            .await
            .iter()
            .filter(|(_, state)| **state == ComponentState::Failed)
            .map(|(name, _)| name.clone())
            .collect();
        failed.sort();
        failed
    }
}

fn build_camera_source(config: &GazelinkConfig) -> Result<Arc<dyn CameraSource>> {
    let CameraConfig { source, index } = &config.camera;

    match source {
        CameraSourceKind::TestPattern => Ok(Arc::new(TestPatternSource::new(
            config.tracking.capture_width,
            config.tracking.capture_height,
        ))),
        #[cfg(all(feature = "camera", target_os = "linux"))]
        CameraSourceKind::Webcam => Ok(Arc::new(crate::camera::WebcamSource::new(*index))),
        #[cfg(not(all(feature = "camera", target_os = "linux")))]
        CameraSourceKind::Webcam => {
            let _ = index;
            Err(crate::error::GazelinkError::component(
                "camera",
                "webcam source requires the `camera` feature on Linux",
            ))
        }
    }
}
