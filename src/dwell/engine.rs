use super::geometry::{hit_test, HitTarget, Viewport};
use crate::config::{DwellConfig, DWELL_THRESHOLD_RANGE_MS};
use crate::transport::GazeSample;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Clamp a dwell threshold into the supported range
pub fn clamp_threshold_ms(threshold_ms: u64) -> u64 {
    let (min, max) = DWELL_THRESHOLD_RANGE_MS;
    threshold_ms.clamp(min, max)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DwellSettings {
    pub threshold: Duration,
    pub cooldown: Duration,
    pub padding_px: f64,
}

impl DwellSettings {
    pub fn from_config(config: &DwellConfig) -> Self {
        Self {
            threshold: Duration::from_millis(clamp_threshold_ms(config.threshold_ms)),
            cooldown: Duration::from_millis(config.cooldown_ms),
            padding_px: config.padding_px,
        }
    }
}

impl Default for DwellSettings {
    fn default() -> Self {
        Self {
            threshold: Duration::from_millis(800),
            cooldown: Duration::from_millis(200),
            padding_px: 5.0,
        }
    }
}

/// Per-tick derived dwell state
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DwellState {
    pub target_under_gaze: Option<String>,
    pub dwell_started_at: Option<Instant>,
    /// 0 - 100, back to 0 whenever the target changes
    pub progress_percent: f64,
}

/// A completed dwell
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    pub target_id: String,
    pub at: Instant,
}

/// Dwell-time selection over a set of hit targets.
///
/// Pure and clock-free: every call to `update` passes the current instant,
/// and the caller re-evaluates continuously so a mid-dwell gaze loss cancels
/// the pending selection.
#[derive(Debug)]
pub struct DwellEngine {
    settings: DwellSettings,
    state: DwellState,
    cooldown_until: Option<Instant>,
    enabled: bool,
    selections: u64,
}

impl DwellEngine {
    pub fn new(settings: DwellSettings) -> Self {
        Self {
            settings,
            state: DwellState::default(),
            cooldown_until: None,
            enabled: true,
            selections: 0,
        }
    }

    pub fn settings(&self) -> DwellSettings {
        self.settings
    }

    pub fn state(&self) -> &DwellState {
        &self.state
    }

    pub fn selection_count(&self) -> u64 {
        self.selections
    }

    /// Change the dwell threshold; the value is clamped to the supported range.
    /// Returns the threshold actually applied, in milliseconds.
    pub fn set_threshold_ms(&mut self, threshold_ms: u64) -> u64 {
        let applied = clamp_threshold_ms(threshold_ms);
        self.settings.threshold = Duration::from_millis(applied);
        applied
    }

    /// Enable or disable gaze selection. Disabling clears any dwell in progress.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        if !enabled {
            self.clear();
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Re-evaluate with the latest sample at `now`
    pub fn update(
        &mut self,
        sample: Option<&GazeSample>,
        targets: &[HitTarget],
        viewport: Viewport,
        now: Instant,
    ) -> Option<Selection> {
        let sample = match sample {
            Some(sample) if self.enabled && sample.success => sample,
            _ => {
                self.clear();
                return None;
            }
        };

        let point = viewport.to_screen(sample.x, sample.y);
        let hit = hit_test(targets, point, self.settings.padding_px).map(|t| t.id.clone());

        if hit != self.state.target_under_gaze {
            if let Some(target) = &hit {
                debug!("Gaze entered target '{}'", target);
            }
            self.state.target_under_gaze = hit;
            self.state.dwell_started_at = None;
            self.state.progress_percent = 0.0;
        }

        let target = self.state.target_under_gaze.clone()?;

        if let Some(until) = self.cooldown_until {
            if now < until {
                return None;
            }
            self.cooldown_until = None;
        }

        let started = *self.state.dwell_started_at.get_or_insert(now);
        let elapsed = now.saturating_duration_since(started);
        let threshold = self.settings.threshold.as_secs_f64();
        self.state.progress_percent = if threshold > 0.0 {
            (elapsed.as_secs_f64() / threshold * 100.0).min(100.0)
        } else {
            100.0
        };

        if self.state.progress_percent < 100.0 {
            return None;
        }

        // Fire once, then restart timing after the cooldown
        self.state.dwell_started_at = None;
        self.state.progress_percent = 0.0;
        self.cooldown_until = Some(now + self.settings.cooldown);
        self.selections += 1;
        info!("Dwell selection on '{}'", target);

        Some(Selection {
            target_id: target,
            at: now,
        })
    }

    /// Forget the current dwell and any pending cooldown
    pub fn reset(&mut self) {
        self.clear();
        self.cooldown_until = None;
    }

    fn clear(&mut self) {
        self.state = DwellState::default();
    }
}

impl Default for DwellEngine {
    fn default() -> Self {
        Self::new(DwellSettings::default())
    }
}
