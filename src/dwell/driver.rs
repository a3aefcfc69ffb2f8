use super::engine::{DwellEngine, DwellSettings, DwellState};
use super::geometry::{HitTarget, Viewport};
use crate::config::DwellConfig;
use crate::events::{EventBus, GazelinkEvent};
use crate::task::ScopedTask;
use crate::transport::GazeSample;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::watch;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info};

const STOP_GRACE: Duration = Duration::from_millis(200);

/// Runs the dwell engine on a fixed tick against the latest gaze sample
/// and publishes `TargetActivated` events.
pub struct DwellDriver {
    engine: Arc<Mutex<DwellEngine>>,
    targets: Arc<RwLock<Vec<HitTarget>>>,
    viewport: Arc<Mutex<Viewport>>,
    tick: Duration,
    event_bus: Arc<EventBus>,
    task: Mutex<Option<ScopedTask>>,
}

impl DwellDriver {
    pub fn new(config: &DwellConfig, event_bus: Arc<EventBus>) -> Self {
        Self {
            engine: Arc::new(Mutex::new(DwellEngine::new(DwellSettings::from_config(config)))),
            targets: Arc::new(RwLock::new(Vec::new())),
            viewport: Arc::new(Mutex::new(Viewport::new(
                config.viewport_width as f64,
                config.viewport_height as f64,
            ))),
            tick: Duration::from_millis(config.tick_ms.max(1)),
            event_bus,
            task: Mutex::new(None),
        }
    }

    /// Start evaluating against `samples`. Restarts the loop if already running.
    pub fn start(&self, samples: watch::Receiver<Option<GazeSample>>) {
        let task = ScopedTask::spawn("dwell_driver", {
            let engine = Arc::clone(&self.engine);
            let targets = Arc::clone(&self.targets);
            let viewport = Arc::clone(&self.viewport);
            let event_bus = Arc::clone(&self.event_bus);
            let tick = self.tick;

            move |cancel| async move {
                let mut ticker = interval(tick);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = ticker.tick() => {}
                    }

                    let sample = samples.borrow().clone();
                    let now = Instant::now().into_std();
                    let selection = {
                        let targets = targets.read();
                        let viewport = *viewport.lock();
                        engine
                            .lock()
                            .update(sample.as_ref(), &targets, viewport, now)
                    };

                    if let Some(selection) = selection {
                        event_bus.publish(GazelinkEvent::TargetActivated {
                            target_id: selection.target_id,
                            timestamp: SystemTime::now(),
                        });
                    }
                }

                debug!("Dwell driver loop exited");
            }
        });

        if self.task.lock().replace(task).is_some() {
            debug!("Dwell driver restarted");
        }
        info!("Dwell driver started ({} ms tick)", self.tick.as_millis());
    }

    /// Stop the loop and clear any dwell in progress
    pub async fn stop(&self) {
        let task = self.task.lock().take();
        if let Some(task) = task {
            task.stop(STOP_GRACE).await;
            info!("Dwell driver stopped");
        }
        self.engine.lock().reset();
    }

    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    /// Replace the active hit targets
    pub fn set_targets(&self, targets: Vec<HitTarget>) {
        debug!("Dwell targets updated ({} targets)", targets.len());
        *self.targets.write() = targets;
    }

    pub fn set_viewport(&self, viewport: Viewport) {
        *self.viewport.lock() = viewport;
    }

    pub fn viewport(&self) -> Viewport {
        *self.viewport.lock()
    }

    /// Returns the threshold actually applied after clamping
    pub fn set_threshold_ms(&self, threshold_ms: u64) -> u64 {
        let applied = self.engine.lock().set_threshold_ms(threshold_ms);
        info!("Dwell threshold set to {} ms", applied);
        applied
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.engine.lock().set_enabled(enabled);
    }

    pub fn state(&self) -> DwellState {
        self.engine.lock().state().clone()
    }

    pub fn selection_count(&self) -> u64 {
        self.engine.lock().selection_count()
    }
}
