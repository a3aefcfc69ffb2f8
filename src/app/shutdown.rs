use super::{ComponentState, GazelinkOrchestrator};
use crate::error::{GazelinkError, Result};
use std::time::Duration;
use tokio::time::timeout;
use tracing::{error, info};

const STOP_TIMEOUT: Duration = Duration::from_secs(10);

/// Consumers first, then what feeds them
const SHUTDOWN_ORDER: [&str; 5] = ["dwell", "tracking", "gaze_transport", "camera", "video_stream"];

impl GazelinkOrchestrator {
    /// Perform graceful shutdown of all components
    pub async fn shutdown(&mut self) -> Result<i32> {
        info!("Beginning graceful shutdown");

        for task in self.background.drain(..) {
            task.stop(Duration::from_secs(1)).await;
        }

        let registered = self.get_all_component_states().await;
        let mut exit_code = 0;

        for component in SHUTDOWN_ORDER {
            if !registered.contains_key(component) {
                continue;
            }
            if let Err(e) = self.stop_component(component).await {
                error!("Error stopping {}: {}", component, e);
                exit_code = 1;
            }
        }

        info!("Graceful shutdown completed with exit code: {}", exit_code);
        Ok(exit_code)
    }

    /// Stop a specific component
    async fn stop_component(&self, component: &str) -> Result<()> {
        info!("Stopping {} component", component);
        self.set_component_state(component, ComponentState::Stopping)
            .await;

        let stop = async {
            match component {
                "dwell" => {
                    if let Some(driver) = &self.dwell_driver {
                        driver.stop().await;
                    }
                }
                "tracking" => {
                    if let Some(client) = &self.gaze_client {
                        client.stop_tracking();
                    }
                }
                "gaze_transport" => {
                    if let Some(client) = &self.gaze_client {
                        if client.calibration_state().is_calibrating {
                            client.cancel_calibration();
                        }
                        client.disconnect().await;
                    }
                }
                "camera" => {
                    if let Some(camera) = &self.camera {
                        camera.stop();
                    }
                }
                "video_stream" => {
                    if let Some(video_stream) = &self.video_stream {
                        video_stream.stop().await;
                    }
                }
                _ => {}
            }
        };

        match timeout(STOP_TIMEOUT, stop).await {
            Ok(()) => {
                self.set_component_state(component, ComponentState::Stopped)
                    .await;
                info!("{} component stopped", component);
                Ok(())
            }
            Err(_) => {
                self.set_component_state(component, ComponentState::Failed)
                    .await;
                Err(GazelinkError::system(format!(
                    "{} component stop timeout",
                    component
                )))
            }
        }
    }
}
