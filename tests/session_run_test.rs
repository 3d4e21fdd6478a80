//! End-to-end runs of the application runner against the mock device.

use capture_core::SessionState;
use capture_driver_mock::MockMode;
use capture_session::{AppConfig, SessionRunner};

fn config_with(mode: MockMode) -> AppConfig {
    let mut config = AppConfig::default();
    config.mock.mode = mode;
    config.mock.seed = Some(1);
    config
}

#[tokio::test]
async fn test_burst_in_instant_mode() {
    let mut config = config_with(MockMode::Instant);
    config.mock.first_request_id = 9;
    let runner = SessionRunner::open(&config).await.unwrap();

    let summary = runner.burst(4).await.unwrap();
    assert_eq!(summary.request_id.0, 9);
    assert_eq!(summary.last_frame, 3);
    assert_eq!(summary.stats.started, 4);
    assert_eq!(summary.stats.completed, 4);
    assert_eq!(summary.stats.errors, 0);

    let session = runner.session().clone();
    runner.close().await.unwrap();
    assert_eq!(session.state().await, SessionState::Closed);
}

#[tokio::test]
async fn test_consecutive_bursts_continue_frame_numbering() {
    let runner = SessionRunner::open(&config_with(MockMode::Instant))
        .await
        .unwrap();
    let first = runner.burst(2).await.unwrap();
    let second = runner.burst(3).await.unwrap();
    assert_eq!(first.last_frame, 1);
    assert_eq!(second.last_frame, 4);
    assert_ne!(first.request_id, second.request_id);
    runner.close().await.unwrap();
}

#[tokio::test]
async fn test_repeat_in_instant_mode_stops_at_last_frame() {
    let runner = SessionRunner::open(&config_with(MockMode::Instant))
        .await
        .unwrap();
    let summary = runner.repeat(5).await.unwrap();
    assert_eq!(summary.last_frame, 4);
    assert_eq!(summary.stats.completed, 5);
    assert_eq!(runner.session().repeating_request().await, None);
    runner.close().await.unwrap();
}

#[tokio::test]
async fn test_repeat_in_realistic_mode() {
    let mut config = config_with(MockMode::Realistic);
    config.mock.frame_interval_ms = 2;
    let runner = SessionRunner::open(&config).await.unwrap();

    let device = runner.device().clone();

    let summary = runner.repeat(5).await.unwrap();
    assert!(summary.last_frame >= 4);
    assert_eq!(summary.stats.completed as i32, summary.last_frame + 1);
    runner.close().await.unwrap();
    assert!(!device.is_connected());
}

#[tokio::test]
async fn test_chaos_burst_completes_despite_failed_frames() {
    let mut config = config_with(MockMode::Chaos);
    config.mock.frame_error_rate = 1.0;
    let runner = SessionRunner::open(&config).await.unwrap();

    let summary = runner.burst(3).await.unwrap();
    assert_eq!(summary.last_frame, 2);
    assert_eq!(summary.stats.completed, 0);
    assert_eq!(summary.stats.errors, 3);
    runner.close().await.unwrap();
}

#[tokio::test]
async fn test_partial_results_are_counted() {
    let mut config = config_with(MockMode::Instant);
    config.mock.partial_results = true;
    let runner = SessionRunner::open(&config).await.unwrap();

    let summary = runner.burst(2).await.unwrap();
    assert_eq!(summary.stats.partials, 2);
    assert_eq!(summary.stats.completed, 2);
    runner.close().await.unwrap();
}
