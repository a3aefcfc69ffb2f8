use super::*;
use crate::config::GazelinkConfig;
use futures::StreamExt;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_tungstenite::accept_async;

/// Base URL of a local port nothing listens on
async fn unreachable_backend() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}", addr)
}

/// Backend that accepts gaze sockets and ignores everything sent to it
async fn silent_backend() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                if let Ok(socket) = accept_async(stream).await {
                    let (_tx, mut rx) = socket.split();
                    while let Some(Ok(_)) = rx.next().await {}
                }
            });
        }
    });

    format!("http://{}", addr)
}

fn create_test_config(base_url: String) -> GazelinkConfig {
    let mut config = GazelinkConfig::default();
    config.backend.base_url = base_url;
    config
}

#[tokio::test]
async fn test_orchestrator_creation() {
    let config = create_test_config("http://localhost:8000".to_string());
    let orchestrator = GazelinkOrchestrator::new(config, RunOptions::default())
        .await
        .unwrap();

    assert!(orchestrator.gaze_client().is_some());
    assert!(orchestrator.camera().is_some());
    assert!(orchestrator.video_stream().is_some());
    assert_eq!(
        orchestrator.components(),
        vec!["video_stream", "camera", "gaze_transport", "tracking", "dwell"]
    );
    assert_eq!(
        orchestrator.gaze_client().unwrap().url(),
        "ws://localhost:8000/ws/gaze-tracking"
    );
}

#[tokio::test]
async fn test_disabled_components_are_not_built() {
    let config = create_test_config("http://localhost:8000".to_string());
    let options = RunOptions {
        video: false,
        gaze: true,
        calibrate: false,
    };
    let mut orchestrator = GazelinkOrchestrator::new(config.clone(), options)
        .await
        .unwrap();
    orchestrator.initialize().await.unwrap();

    assert!(orchestrator.video_stream().is_none());
    assert_eq!(
        orchestrator.get_component_state("video_stream").await,
        None
    );
    assert_eq!(
        orchestrator.get_component_state("camera").await,
        Some(ComponentState::Stopped)
    );

    let options = RunOptions {
        video: true,
        gaze: false,
        calibrate: false,
    };
    let orchestrator = GazelinkOrchestrator::new(config, options).await.unwrap();
    assert!(orchestrator.gaze_client().is_none());
    assert!(orchestrator.dwell_driver().is_none());
    assert_eq!(orchestrator.components(), vec!["video_stream"]);
}

#[cfg(not(all(feature = "camera", target_os = "linux")))]
#[tokio::test]
async fn test_webcam_requires_camera_feature() {
    let mut config = create_test_config("http://localhost:8000".to_string());
    config.camera.source = crate::config::CameraSourceKind::Webcam;

    let result = GazelinkOrchestrator::new(config, RunOptions::default()).await;
    assert!(matches!(
        result,
        Err(crate::error::GazelinkError::Component { .. })
    ));
}

#[tokio::test]
async fn test_component_state_management() {
    let config = create_test_config("http://localhost:8000".to_string());
    let mut orchestrator = GazelinkOrchestrator::new(config, RunOptions::default())
        .await
        .unwrap();

    orchestrator.initialize().await.unwrap();
    let states = orchestrator.get_all_component_states().await;
    assert_eq!(states.len(), 5);
    assert!(states.values().all(|s| *s == ComponentState::Stopped));

    let component = "test_component";
    assert_eq!(orchestrator.get_component_state(component).await, None);

    let mut previous = None;
    for state in [
        ComponentState::Starting,
        ComponentState::Running,
        ComponentState::Stopping,
        ComponentState::Stopped,
    ] {
        let replaced = orchestrator
            .set_component_state(component, state.clone())
            .await;
        assert_eq!(replaced, previous);
        assert_eq!(orchestrator.get_component_state(component).await, Some(state.clone()));
        previous = Some(state);
    }
    assert!(orchestrator.failed_components().await.is_empty());
}

#[tokio::test]
async fn test_start_with_unreachable_backend_degrades() {
    let config = create_test_config(unreachable_backend().await);
    let mut orchestrator = GazelinkOrchestrator::new(config, RunOptions::default())
        .await
        .unwrap();

    orchestrator.initialize().await.unwrap();
    orchestrator.start().await.unwrap();

    assert_eq!(
        orchestrator.get_component_state("camera").await,
        Some(ComponentState::Running)
    );
    assert_eq!(
        orchestrator.get_component_state("gaze_transport").await,
        Some(ComponentState::Failed)
    );
    assert_eq!(
        orchestrator.get_component_state("tracking").await,
        Some(ComponentState::Failed)
    );
    assert_eq!(
        orchestrator.get_component_state("video_stream").await,
        Some(ComponentState::Running)
    );
    assert_eq!(
        orchestrator.failed_components().await,
        vec!["gaze_transport".to_string(), "tracking".to_string()]
    );

    let client = orchestrator.gaze_client().unwrap();
    assert!(!client.connection_state().is_connected);
    assert!(client.connection_state().last_error.is_some());
    assert!(orchestrator.dwell_driver().unwrap().is_running());

    let exit_code = orchestrator.shutdown().await.unwrap();
    assert_eq!(exit_code, 0);

    let states = orchestrator.get_all_component_states().await;
    assert!(states.values().all(|s| *s == ComponentState::Stopped));
    assert!(!orchestrator.camera().unwrap().is_active());
    assert!(!orchestrator.video_stream().unwrap().is_running());
    assert!(!orchestrator.dwell_driver().unwrap().is_running());
}

#[tokio::test]
async fn test_start_tracks_against_live_service() {
    let config = create_test_config(silent_backend().await);
    let options = RunOptions {
        video: false,
        gaze: true,
        calibrate: true,
    };
    let mut orchestrator = GazelinkOrchestrator::new(config, options).await.unwrap();

    orchestrator.initialize().await.unwrap();
    orchestrator.start().await.unwrap();

    let client = orchestrator.gaze_client().unwrap();
    assert_eq!(
        orchestrator.get_component_state("gaze_transport").await,
        Some(ComponentState::Running)
    );
    assert_eq!(
        orchestrator.get_component_state("tracking").await,
        Some(ComponentState::Running)
    );
    assert!(client.is_tracking());
    assert!(client.calibration_state().is_calibrating);

    assert_eq!(orchestrator.shutdown().await.unwrap(), 0);
    assert!(!client.is_tracking());
    assert!(!client.connection_state().is_connected);
    assert!(!client.calibration_state().is_calibrating);
    assert!(!orchestrator.camera().unwrap().is_active());
}

#[tokio::test]
async fn test_run_ends_on_shutdown_trigger() {
    let config = create_test_config(unreachable_backend().await);
    let options = RunOptions {
        video: false,
        gaze: false,
        calibrate: false,
    };
    let mut orchestrator = GazelinkOrchestrator::new(config, options).await.unwrap();
    orchestrator.initialize().await.unwrap();
    orchestrator.start().await.unwrap();

    let trigger = orchestrator.shutdown_trigger();
    let second = trigger.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(trigger.trigger(ShutdownReason::UserRequest).await);
    });

    let exit_code = tokio::time::timeout(Duration::from_secs(10), orchestrator.run())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(exit_code, 0);

    // Only the first trigger counts
    assert!(!second.trigger(ShutdownReason::UserRequest).await);
    // The receiver is consumed by the first run
    assert!(orchestrator.run().await.is_err());
}
