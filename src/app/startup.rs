use super::{ComponentState, GazelinkOrchestrator};
use crate::error::Result;
use crate::task::ScopedTask;
use crate::transport::GazeClient;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// How often server-side stats are requested while connected
const STATS_INTERVAL: Duration = Duration::from_secs(30);

impl GazelinkOrchestrator {
    /// Register every enabled component as stopped
    pub async fn initialize(&mut self) -> Result<()> {
        info!("Initializing Gazelink components");

        for component in self.components() {
            self.set_component_state(component, ComponentState::Stopped)
                .await;
        }

        info!("All components initialized successfully");
        Ok(())
    }

    /// Start all components.
    ///
    /// Camera and transport failures are recorded as `Failed` and leave the
    /// rest of the system running; the gaze socket is not retried.
    pub async fn start(&mut self) -> Result<()> {
        info!("Starting Gazelink");

        if let Some(video_stream) = &self.video_stream {
            self.set_component_state("video_stream", ComponentState::Starting)
                .await;
            video_stream.start();
            self.set_component_state("video_stream", ComponentState::Running)
                .await;
        }

        let Some(client) = self.gaze_client.clone() else {
            info!("Gaze pipeline disabled");
            return Ok(());
        };

        if let Some(camera) = &self.camera {
            self.set_component_state("camera", ComponentState::Starting)
                .await;
            match camera.start().await {
                Ok(()) => {
                    self.set_component_state("camera", ComponentState::Running)
                        .await;
                }
                Err(e) => {
                    error!("Failed to start camera: {}", e);
                    self.set_component_state("camera", ComponentState::Failed)
                        .await;
                }
            }
        }

        self.set_component_state("gaze_transport", ComponentState::Starting)
            .await;
        match client.connect().await {
            Ok(()) => {
                self.set_component_state("gaze_transport", ComponentState::Running)
                    .await;
            }
            Err(e) => {
                error!("Failed to connect to gaze service: {}", e);
                self.set_component_state("gaze_transport", ComponentState::Failed)
                    .await;
            }
        }

        self.set_component_state("tracking", ComponentState::Starting)
            .await;
        if client.start_tracking() {
            self.set_component_state("tracking", ComponentState::Running)
                .await;
        } else {
            warn!("Tracking not started; gaze selection stays idle");
            self.set_component_state("tracking", ComponentState::Failed)
                .await;
        }

        if self.options.calibrate {
            if client.connection_state().is_connected {
                client.start_calibration();
                client.hold_calibration_point();
                info!("Calibration sequence started");
            } else {
                warn!("Skipping calibration: gaze service not connected");
            }
        }

        if let Some(driver) = &self.dwell_driver {
            self.set_component_state("dwell", ComponentState::Starting)
                .await;
            driver.start(client.subscribe_samples());
            self.set_component_state("dwell", ComponentState::Running)
                .await;
        }

        self.background.push(spawn_stats_poller(client));

        let failed = self.failed_components().await;
        if failed.is_empty() {
            info!("Gazelink started");
        } else {
            warn!("Gazelink started degraded, failed: {}", failed.join(", "));
        }
        Ok(())
    }
}

fn spawn_stats_poller(client: Arc<GazeClient>) -> ScopedTask {
    ScopedTask::spawn("stats_poller", move |cancel| async move {
        let mut ticker = tokio::time::interval(STATS_INTERVAL);
        // First tick fires immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            if !client.connection_state().is_connected {
                continue;
            }

            let stats = client.stats();
            debug!(
                "Transport: {} sent, {} dropped, {} received ({:.1}% sent)",
                stats.frames_sent,
                stats.frames_dropped,
                stats.messages_received,
                stats.send_efficiency() * 100.0
            );

            if let Err(e) = client.request_stats().await {
                debug!("Stats request failed: {}", e);
            }
        }
    })
}
