use super::*;
use crate::error::CameraError;
use crate::events::{EventBus, GazelinkEvent};
use std::sync::Arc;

fn create_test_camera(source: TestPatternSource) -> (Camera, Arc<PatternStats>) {
    let stats = source.stats();
    let camera = Camera::new(Arc::new(source), Arc::new(EventBus::new(16)));
    (camera, stats)
}

#[tokio::test]
async fn test_camera_start_and_grab() {
    let (camera, stats) = create_test_camera(TestPatternSource::new(64, 48));

    assert!(!camera.is_active());
    assert!(camera.grab_frame().is_none());

    camera.start().await.unwrap();
    assert!(camera.is_active());

    let frame = camera.grab_frame().unwrap();
    assert_eq!((frame.width, frame.height), (64, 48));
    assert!(frame.is_decodable());
    assert_eq!(stats.opens(), 1);
}

#[tokio::test]
async fn test_only_one_session_per_camera() {
    let (camera, stats) = create_test_camera(TestPatternSource::new(8, 8));

    camera.start().await.unwrap();
    camera.start().await.unwrap();

    assert_eq!(stats.opens(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_starts_open_device_once() {
    let source = TestPatternSource::new(8, 8).with_open_delay(std::time::Duration::from_millis(100));
    let (camera, stats) = create_test_camera(source);

    let (first, second) = tokio::join!(camera.start(), camera.start());

    assert!(first.is_ok() && second.is_ok());
    assert!(camera.is_active());
    assert_eq!(stats.opens(), 1);
    assert_eq!(stats.releases(), 0);
}

#[tokio::test]
async fn test_warmup_yields_no_frame() {
    let (camera, _stats) = create_test_camera(TestPatternSource::new(8, 8).with_warmup(2));
    camera.start().await.unwrap();

    assert!(camera.grab_frame().is_none());
    assert!(camera.grab_frame().is_none());
    assert!(camera.grab_frame().is_some());
}

#[tokio::test]
async fn test_stop_releases_device() {
    let (camera, stats) = create_test_camera(TestPatternSource::new(8, 8));

    camera.start().await.unwrap();
    camera.stop();
    camera.stop();

    assert!(!camera.is_active());
    assert_eq!(stats.releases(), 1);
    assert!(camera.grab_frame().is_none());
}

#[tokio::test]
async fn test_drop_releases_device() {
    let (camera, stats) = create_test_camera(TestPatternSource::new(8, 8));

    camera.start().await.unwrap();
    drop(camera);

    assert_eq!(stats.releases(), 1);
}

#[tokio::test]
async fn test_acquisition_failure_is_camera_specific() {
    let event_bus = Arc::new(EventBus::new(16));
    let mut events = event_bus.subscribe();
    let camera = Camera::new(
        Arc::new(TestPatternSource::default().failing(CameraError::PermissionDenied)),
        Arc::clone(&event_bus),
    );

    let result = camera.start().await;

    assert_eq!(result, Err(CameraError::PermissionDenied));
    assert!(!camera.is_active());
    assert_eq!(
        camera.last_error().as_deref(),
        Some("Camera permission denied")
    );

    match events.recv().await.unwrap() {
        GazelinkEvent::CameraStatusChanged { active, error } => {
            assert!(!active);
            assert!(error.is_some());
        }
        other => panic!("Unexpected event: {:?}", other),
    }
}
