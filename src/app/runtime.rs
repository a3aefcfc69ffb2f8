use super::{GazelinkOrchestrator, ShutdownReason, ShutdownTrigger};
use crate::error::{GazelinkError, Result};
use crate::events::GazelinkEvent;
use crate::task::ScopedTask;
use tokio::signal;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

impl GazelinkOrchestrator {
    /// Run until a signal or shutdown trigger arrives, then shut down
    pub async fn run(&mut self) -> Result<i32> {
        info!("Gazelink is running");

        let shutdown_receiver = self
            .shutdown_receiver
            .take()
            .ok_or_else(|| GazelinkError::system("Shutdown receiver already taken"))?;

        let _signals = spawn_signal_handlers(self.shutdown_trigger());
        let activation_log = self.spawn_activation_log();
        self.background.push(activation_log);

        let shutdown_reason = shutdown_receiver
            .await
            .map_err(|_| GazelinkError::system("Shutdown channel closed unexpectedly"))?;

        info!("Shutdown initiated: {:?}", shutdown_reason);

        let exit_code = self.shutdown().await?;

        info!("Gazelink shutdown complete");
        Ok(exit_code)
    }

    /// Log what the user selects and when calibration finishes
    fn spawn_activation_log(&self) -> ScopedTask {
        let mut events = self.event_bus.subscribe();

        ScopedTask::spawn("activation_log", move |cancel| async move {
            loop {
                let event = tokio::select! {
                    _ = cancel.cancelled() => break,
                    event = events.recv() => event,
                };

                match event {
                    Ok(GazelinkEvent::TargetActivated { target_id, .. }) => {
                        info!(target = %target_id, "Key selected");
                    }
                    Ok(GazelinkEvent::CalibrationCompleted) => {
                        info!("Calibration finished, dwell selection is calibrated");
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("Activation log lagged, skipped {} events", skipped);
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }
}

fn spawn_signal_handlers(trigger: ShutdownTrigger) -> Vec<ScopedTask> {
    let mut handlers = Vec::new();

    // SIGTERM (systemd stop) is Unix only
    #[cfg(unix)]
    handlers.push(ScopedTask::spawn("sigterm", {
        let trigger = trigger.clone();
        move |cancel| async move {
            let mut sigterm = match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                Ok(sigterm) => sigterm,
                Err(e) => {
                    warn!("Failed to register SIGTERM handler: {}", e);
                    return;
                }
            };

            tokio::select! {
                _ = cancel.cancelled() => {}
                Some(()) = sigterm.recv() => {
                    info!("Received SIGTERM signal");
                    trigger.trigger(ShutdownReason::Signal("SIGTERM".to_string())).await;
                }
            }
        }
    }));

    handlers.push(ScopedTask::spawn("sigint", move |cancel| async move {
        tokio::select! {
            _ = cancel.cancelled() => {}
            Ok(()) = signal::ctrl_c() => {
                info!("Received SIGINT signal (Ctrl+C)");
                trigger.trigger(ShutdownReason::Signal("SIGINT".to_string())).await;
            }
        }
    }));

    handlers
}
