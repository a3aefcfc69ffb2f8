use super::*;
use crate::config::DwellConfig;
use crate::events::{EventBus, GazelinkEvent};
use crate::transport::GazeSample;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;

const VIEWPORT: Viewport = Viewport {
    width: 1000.0,
    height: 1000.0,
};

/// Two side-by-side targets: A spans x 100-300, B spans x 600-800, both y 400-600
fn two_targets() -> Vec<HitTarget> {
    vec![
        HitTarget::new("a", Rect::new(100.0, 400.0, 200.0, 200.0)),
        HitTarget::new("b", Rect::new(600.0, 400.0, 200.0, 200.0)),
    ]
}

fn on_a() -> GazeSample {
    GazeSample::at(0.2, 0.5, 0.9)
}

fn on_b() -> GazeSample {
    GazeSample::at(0.7, 0.5, 0.9)
}

fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

#[test]
fn test_hit_test_uses_padding() {
    let targets = two_targets();

    assert_eq!(hit_test(&targets, (200.0, 500.0), 5.0).map(|t| t.id.as_str()), Some("a"));
    // 4px outside A's left edge is still inside the padded bounds
    assert_eq!(hit_test(&targets, (96.0, 500.0), 5.0).map(|t| t.id.as_str()), Some("a"));
    assert!(hit_test(&targets, (94.0, 500.0), 5.0).is_none());
    assert!(hit_test(&targets, (450.0, 500.0), 5.0).is_none());
}

#[test]
fn test_overlapping_targets_first_wins() {
    let targets = vec![
        HitTarget::new("first", Rect::new(0.0, 0.0, 100.0, 100.0)),
        HitTarget::new("second", Rect::new(50.0, 50.0, 100.0, 100.0)),
    ];

    assert_eq!(
        hit_test(&targets, (75.0, 75.0), 0.0).map(|t| t.id.as_str()),
        Some("first")
    );
}

#[test]
fn test_progress_accumulates() {
    let mut engine = DwellEngine::default();
    let targets = two_targets();
    let start = Instant::now();

    engine.update(Some(&on_a()), &targets, VIEWPORT, start);
    engine.update(Some(&on_a()), &targets, VIEWPORT, start + ms(400));

    let state = engine.state();
    assert_eq!(state.target_under_gaze.as_deref(), Some("a"));
    assert!((state.progress_percent - 50.0).abs() < 1e-9);
}

#[test]
fn test_progress_resets_on_target_change() {
    let mut engine = DwellEngine::default();
    let targets = two_targets();
    let start = Instant::now();

    for t in (0..=500).step_by(16) {
        engine.update(Some(&on_a()), &targets, VIEWPORT, start + ms(t));
    }
    assert!(engine.state().progress_percent > 50.0);

    let selection = engine.update(Some(&on_b()), &targets, VIEWPORT, start + ms(516));

    assert!(selection.is_none());
    assert_eq!(engine.state().target_under_gaze.as_deref(), Some("b"));
    assert_eq!(engine.state().progress_percent, 0.0);
}

#[test]
fn test_selection_fires_exactly_once_per_dwell() {
    let mut engine = DwellEngine::default();
    let targets = two_targets();
    let start = Instant::now();

    // 1 ms ticks for one second of steady gaze
    let selections: Vec<_> = (0..=1000)
        .filter_map(|t| engine.update(Some(&on_a()), &targets, VIEWPORT, start + ms(t)))
        .collect();

    assert_eq!(selections.len(), 1);
    assert_eq!(selections[0].target_id, "a");
    assert_eq!(selections[0].at, start + ms(800));
}

#[test]
fn test_cooldown_then_timer_restarts() {
    let mut engine = DwellEngine::default();
    let targets = two_targets();
    let start = Instant::now();

    let fired_at: Vec<_> = (0..=2000)
        .step_by(10)
        .filter_map(|t| engine.update(Some(&on_a()), &targets, VIEWPORT, start + ms(t)))
        .map(|s| s.at.duration_since(start).as_millis())
        .collect();

    // 800 ms dwell, 200 ms cooldown, then another full 800 ms dwell
    assert_eq!(fired_at, vec![800, 1800]);
}

#[test]
fn test_gaze_loss_cancels_pending_selection() {
    let mut engine = DwellEngine::default();
    let targets = two_targets();
    let start = Instant::now();
    let lost = GazeSample::lost("face not found");

    engine.update(Some(&on_a()), &targets, VIEWPORT, start);
    engine.update(Some(&on_a()), &targets, VIEWPORT, start + ms(700));
    assert!(engine.update(Some(&lost), &targets, VIEWPORT, start + ms(750)).is_none());
    assert_eq!(engine.state(), &DwellState::default());

    // Returning gaze starts a fresh dwell
    assert!(engine.update(Some(&on_a()), &targets, VIEWPORT, start + ms(800)).is_none());
    assert!(engine.update(Some(&on_a()), &targets, VIEWPORT, start + ms(1500)).is_none());
    assert!(engine.update(Some(&on_a()), &targets, VIEWPORT, start + ms(1600)).is_some());
}

#[test]
fn test_no_selection_while_disabled_or_without_sample() {
    let mut engine = DwellEngine::default();
    let targets = two_targets();
    let start = Instant::now();

    for t in (0..=1000).step_by(50) {
        assert!(engine.update(None, &targets, VIEWPORT, start + ms(t)).is_none());
    }

    engine.set_enabled(false);
    for t in (1000..=2000).step_by(50) {
        assert!(engine
            .update(Some(&on_a()), &targets, VIEWPORT, start + ms(t))
            .is_none());
    }
    assert_eq!(engine.state().progress_percent, 0.0);
    assert_eq!(engine.selection_count(), 0);
}

#[test]
fn test_threshold_is_clamped() {
    let mut engine = DwellEngine::default();

    assert_eq!(engine.set_threshold_ms(100), 400);
    assert_eq!(engine.set_threshold_ms(5000), 1500);
    assert_eq!(engine.set_threshold_ms(1000), 1000);
    assert_eq!(engine.settings().threshold, ms(1000));
}

#[test]
fn test_keyboard_layout() {
    let targets = keyboard_targets(Viewport::new(1920.0, 1080.0));

    assert_eq!(targets.len(), 28);
    assert!(targets.iter().any(|t| t.id == "q"));
    assert!(targets.iter().any(|t| t.id == "space"));
    assert!(targets.iter().any(|t| t.id == "backspace"));

    // Every key center resolves to that key
    for target in &targets {
        let hit = hit_test(&targets, target.bounds.center(), 0.0).unwrap();
        assert_eq!(hit.id, target.id);
    }
}

#[tokio::test(start_paused = true)]
async fn test_driver_publishes_single_activation() {
    let event_bus = Arc::new(EventBus::new(64));
    let mut events = event_bus.subscribe();
    let config = DwellConfig {
        viewport_width: 1000,
        viewport_height: 1000,
        ..crate::config::GazelinkConfig::default().dwell
    };
    let driver = DwellDriver::new(&config, Arc::clone(&event_bus));
    driver.set_targets(two_targets());

    let (samples_tx, samples_rx) = watch::channel(Some(on_b()));
    driver.start(samples_rx);
    assert!(driver.is_running());

    tokio::time::sleep(ms(1000)).await;

    let mut activated = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let GazelinkEvent::TargetActivated { target_id, .. } = event {
            activated.push(target_id);
        }
    }
    assert_eq!(activated, vec!["b".to_string()]);

    // Gaze lost: nothing more fires and progress is cleared
    samples_tx.send_replace(None);
    tokio::time::sleep(ms(2000)).await;
    assert!(events.try_recv().is_err());
    assert_eq!(driver.state().progress_percent, 0.0);

    driver.stop().await;
    assert!(!driver.is_running());

    samples_tx.send_replace(Some(on_b()));
    tokio::time::sleep(ms(2000)).await;
    assert!(events.try_recv().is_err());
    assert_eq!(driver.selection_count(), 1);
}
