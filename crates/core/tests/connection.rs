mod common;

use std::time::Duration;

use common::*;
use cuelight_core::{EngineError, Settings};
use tokio::time::sleep;

#[tokio::test(start_paused = true)]
async fn test_two_failures_keep_device_connected() {
    let transport = RecordingTransport::new();
    transport.script_probes(1, &[false, false, true]);
    let engine = engine(show_with(vec![]), &transport);

    for _ in 0..3 {
        assert!(engine.check_device_connection(1).await.unwrap());
    }
    let status = engine.get_connection_status(1).await.unwrap();
    assert!(status.is_connected);
    assert_eq!(status.error_count, 0);
    assert!(status.last_ping_at.is_some());
}

#[tokio::test(start_paused = true)]
async fn test_third_failure_disconnects() {
    let transport = RecordingTransport::new();
    transport.script_probes(1, &[false, false, false]);
    let engine = engine(show_with(vec![]), &transport);

    assert!(engine.check_device_connection(1).await.unwrap());
    assert!(engine.check_device_connection(1).await.unwrap());
    assert!(!engine.check_device_connection(1).await.unwrap());

    let status = engine.get_connection_status(1).await.unwrap();
    assert!(!status.is_connected);
    assert_eq!(status.error_count, 3);
}

#[tokio::test(start_paused = true)]
async fn test_max_error_count_is_configurable() {
    let transport = RecordingTransport::new();
    transport.script_probes(1, &[false]);
    let settings = Settings {
        max_error_count: 1,
        ..Default::default()
    };
    let engine = engine_with(show_with(vec![]), &transport, &settings);

    assert!(!engine.check_device_connection(1).await.unwrap());
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_resets_error_count() {
    let transport = RecordingTransport::new();
    transport.script_probes(2, &[false, false, false, false]);
    let engine = engine(show_with(vec![]), &transport);

    for _ in 0..3 {
        engine.check_device_connection(2).await.unwrap();
    }
    assert!(!engine.get_connection_status(2).await.unwrap().is_connected);

    // A failed reconnect reports the probe as-is.
    assert!(!engine.reconnect_device(2).await.unwrap());
    let status = engine.get_connection_status(2).await.unwrap();
    assert!(!status.is_connected);
    assert_eq!(status.error_count, 1);

    assert!(engine.reconnect_device(2).await.unwrap());
    let status = engine.get_connection_status(2).await.unwrap();
    assert!(status.is_connected);
    assert_eq!(status.error_count, 0);
}

#[tokio::test(start_paused = true)]
async fn test_all_statuses_probe_unchecked_devices() {
    let transport = RecordingTransport::new();
    transport.script_probes(2, &[false]);
    let engine = engine(show_with(vec![]), &transport);

    engine.check_device_connection(3).await.unwrap();
    let statuses = engine.get_all_connection_statuses().await;

    let ids: Vec<_> = statuses.iter().map(|s| s.device_id).collect();
    assert_eq!(ids, vec![1, 2, 3]);
    assert!(statuses.iter().all(|s| s.last_ping_at.is_some()));
    assert_eq!(statuses[1].error_count, 1);
    assert_eq!(transport.probe_count(1), 1);
    assert_eq!(transport.probe_count(3), 1);

    // Already known, no new probes.
    engine.get_all_connection_statuses().await;
    assert_eq!(transport.probe_count(1), 1);
}

#[tokio::test(start_paused = true)]
async fn test_unknown_device_is_not_found() {
    let transport = RecordingTransport::new();
    let engine = engine(show_with(vec![]), &transport);

    assert!(matches!(
        engine.get_connection_status(99).await,
        Err(EngineError::DeviceNotFound(99))
    ));
    assert!(matches!(
        engine.check_device_connection(99).await,
        Err(EngineError::DeviceNotFound(99))
    ));
    assert!(matches!(
        engine.reconnect_device(99).await,
        Err(EngineError::DeviceNotFound(99))
    ));
    assert_eq!(transport.probe_count(99), 0);
}

#[tokio::test(start_paused = true)]
async fn test_monitoring_sweeps_until_stopped() {
    let transport = RecordingTransport::new();
    let engine = engine(show_with(vec![]), &transport);
    let monitor = engine.monitor();

    engine.initialize();
    engine.initialize();
    assert!(monitor.is_monitoring());

    sleep(Duration::from_millis(10)).await;
    assert_eq!(transport.probe_count(1), 1);

    sleep(Duration::from_secs(25)).await;
    for device_id in [1, 2, 3] {
        assert_eq!(transport.probe_count(device_id), 3);
    }

    engine.shutdown();
    engine.shutdown();
    assert!(!monitor.is_monitoring());

    sleep(Duration::from_secs(60)).await;
    assert_eq!(transport.probe_count(1), 3);
}

#[tokio::test(start_paused = true)]
async fn test_sweep_flags_dead_device() {
    let transport = RecordingTransport::new();
    transport.script_probes(3, &[false; 5]);
    let engine = engine(show_with(vec![]), &transport);

    engine.initialize();
    sleep(Duration::from_secs(15)).await;
    assert!(engine.monitor().cached_status(3).unwrap().is_connected);

    sleep(Duration::from_secs(10)).await;
    let status = engine.monitor().cached_status(3).unwrap();
    assert!(!status.is_connected);
    assert_eq!(status.error_count, 3);
    assert!(engine.monitor().cached_status(1).unwrap().is_connected);

    engine.shutdown();
}
