//! End-to-end scenarios exercising the manager through its public API only.

use std::sync::Arc;
use std::time::Duration;

use doppler_fanout::prelude::*;

fn manager_with_blacklist(ranges: Vec<IpRange>) -> Arc<SinkManager> {
    SinkManager::new(
        SinkManagerConfig::default(),
        Blacklist::new(ranges),
        Arc::new(NullWriterFactory),
        Arc::new(SystemClock),
        Arc::new(InstantSleeper),
    )
}

fn log_envelope(app_id: &str, n: u8) -> Envelope {
    Envelope::new_log(n as u64, "origin", app_id, MessageType::Out, vec![n], "APP", "0")
}

/// S1: two per-app sinks both receive a log message fanned out to the same
/// app, and a sink for a different app receives nothing.
#[tokio::test]
async fn s1_fan_out_to_every_sink_for_the_same_app() {
    let manager = manager_with_blacklist(vec![]);
    let (registered_a, sink_a) = manager.register_channel_sink("myApp", "subA", false, false);
    let (registered_b, sink_b) = manager.register_channel_sink("myApp", "subB", false, false);
    let (registered_other, sink_other) = manager.register_channel_sink("otherApp", "subC", false, false);
    assert!(registered_a && registered_b && registered_other);

    manager.send_to("myApp", log_envelope("myApp", 1)).await;
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert_eq!(sink_a.received().len(), 1);
    assert_eq!(sink_b.received().len(), 1);
    assert_eq!(sink_other.received().len(), 0);

    manager.stop().await;
}

/// S2: a slow (gated) consumer buffers in its inbox and still receives every
/// envelope, in order, once it starts draining.
#[tokio::test]
async fn s2_slow_consumer_receives_everything_once_unblocked() {
    let manager = manager_with_blacklist(vec![]);
    let (registered, sink) = manager.register_channel_sink("myApp", "slow", false, true);
    assert!(registered);

    manager.send_to("myApp", log_envelope("myApp", 1)).await;
    manager.send_to("myApp", log_envelope("myApp", 2)).await;
    manager.send_to("myApp", log_envelope("myApp", 3)).await;

    // The gate is still closed: nothing has been drained into `received` yet.
    assert_eq!(sink.received().len(), 0);

    sink.open_gate();
    tokio::time::sleep(Duration::from_millis(20)).await;

    let received = sink.received();
    assert_eq!(received.len(), 3);
    assert_eq!(received[0].as_log().unwrap().message, vec![1]);
    assert_eq!(received[1].as_log().unwrap().message, vec![2]);
    assert_eq!(received[2].as_log().unwrap().message, vec![3]);

    manager.stop().await;
}

/// S3: adding an app-service with a blacklisted drain URL never registers a
/// drain sink, and instead routes an ERROR envelope to error-eligible sinks.
#[tokio::test]
async fn s3_blacklisted_drain_url_is_rejected_and_reported() {
    let manager = manager_with_blacklist(vec![IpRange::new(
        "10.10.10.10".parse().unwrap(),
        "10.10.10.20".parse().unwrap(),
    )]);
    let (registered, error_sink) = manager.register_channel_sink("aptastic", "errsink", true, false);
    assert!(registered);

    let (new_tx, new_rx) = app_service_channel();
    let (_del_tx, del_rx) = app_service_channel();
    manager.start(new_rx, del_rx);

    new_tx.send(AppService::new("aptastic", "syslog://10.10.10.11:884")).unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;

    let received = error_sink.received();
    assert_eq!(received.len(), 1);
    let message = String::from_utf8_lossy(&received[0].as_log().unwrap().message);
    assert!(message.contains("Invalid syslog drain URL"));

    let metrics = manager.emit();
    assert_eq!(metrics.iter().find(|m| m.name == "SyslogSinks").unwrap().value, 0);

    manager.stop().await;
}

/// S4: deleting an app-service removes its drain sink and the sink-count
/// metric returns to baseline; deleting again is a no-op.
#[tokio::test]
async fn s4_app_service_delete_removes_drain_sink_and_resets_counter() {
    let manager = manager_with_blacklist(vec![]);
    let (new_tx, new_rx) = app_service_channel();
    let (del_tx, del_rx) = app_service_channel();
    manager.start(new_rx, del_rx);

    new_tx.send(AppService::new("myApp", "syslog://127.0.0.1:514")).unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(manager.emit().iter().find(|m| m.name == "SyslogSinks").unwrap().value, 1);

    del_tx.send(AppService::new("myApp", "syslog://127.0.0.1:514")).unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(manager.emit().iter().find(|m| m.name == "SyslogSinks").unwrap().value, 0);

    // A second delete of the same app-service must not underflow the counter.
    del_tx.send(AppService::new("myApp", "syslog://127.0.0.1:514")).unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(manager.emit().iter().find(|m| m.name == "SyslogSinks").unwrap().value, 0);

    manager.stop().await;
}

/// S5: the container-metric sink keeps only the newest sample per instance
/// index, reachable through `latest_container_metrics`.
#[tokio::test]
async fn s5_container_metric_sink_tracks_newest_sample_per_instance() {
    let manager = manager_with_blacklist(vec![]);

    let older = Envelope::new_container_metric(1, "origin", "myApp", 0, 10.0, 100, 100);
    let newer = Envelope::new_container_metric(2, "origin", "myApp", 0, 20.0, 200, 200);
    manager.send_to("myApp", older).await;
    manager.send_to("myApp", newer).await;
    tokio::time::sleep(Duration::from_millis(20)).await;

    let latest = manager.latest_container_metrics("myApp");
    assert_eq!(latest.len(), 1);
    let metric = latest[0].as_container_metric().unwrap();
    assert_eq!(metric.cpu, 20.0);

    manager.stop().await;
}

/// S6: when a sink's inbox is saturated, the registry counts the drop
/// instead of blocking the caller, and that count surfaces via `emit()`.
#[tokio::test]
async fn s6_full_inbox_is_dropped_and_counted_not_blocked() {
    let manager = SinkManager::new(
        SinkManagerConfig::builder().inbox_capacity(1).build().unwrap(),
        Blacklist::default(),
        Arc::new(NullWriterFactory),
        Arc::new(SystemClock),
        Arc::new(InstantSleeper),
    );
    let (registered, sink) = manager.register_channel_sink("myApp", "gated", false, true);
    assert!(registered);

    // Capacity 1: the first send fills the inbox, the rest are dropped while
    // the gate stays closed and nothing is draining it.
    for n in 0..5u8 {
        manager.send_to("myApp", log_envelope("myApp", n)).await;
    }
    tokio::time::sleep(Duration::from_millis(20)).await;

    let metrics = manager.emit();
    let total_dropped = metrics.iter().find(|m| m.name == "totalDroppedMessages").unwrap().value;
    assert!(total_dropped >= 1, "expected at least one dropped message, got {total_dropped}");

    sink.open_gate();
    manager.stop().await;
}
