//! Metrics definitions for the room service.
//!
//! All metrics follow Prometheus naming conventions:
//! - `room_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded:
//! - `method`: signaling method names (11 values plus `unknown`)
//! - `status`: `success` or an error code (~15 values)
//! - `notification`: 2 values
//! - `actor_type`: 2 values
//!
//! Room and peer ids never appear as labels.

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Install the Prometheus recorder and return the handle used to render
/// `/metrics`.
///
/// Must be called before any metrics are recorded.
///
/// # Errors
///
/// Returns error if the recorder fails to install (e.g., already installed).
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        // Signaling round trips include engine calls; p99 target 250ms
        .set_buckets_for_metric(
            Matcher::Prefix("room_signaling".to_string()),
            &[
                0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.000, 2.500,
            ],
        )
        .map_err(|e| format!("Failed to set signaling latency buckets: {e}"))?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus metrics recorder: {e}"))
}

// ============================================================================
// Room & Peer Metrics (Gauges)
// ============================================================================

/// Metric: `room_rooms_active`
pub fn set_rooms_active(count: usize) {
    #[allow(clippy::cast_precision_loss)]
    gauge!("room_rooms_active").set(count as f64);
}

/// Metric: `room_peers_active`
///
/// Peers across every room on this instance.
pub fn set_peers_active(count: usize) {
    #[allow(clippy::cast_precision_loss)]
    gauge!("room_peers_active").set(count as f64);
}

// ============================================================================
// Signaling Metrics
// ============================================================================

/// Record one handled signaling request.
///
/// Metrics: `room_signaling_requests_total`, `room_signaling_request_duration_seconds`
/// Labels: `method`, `status` (counter only)
pub fn record_signaling_request(method: &'static str, status: &'static str, duration: Duration) {
    counter!(
        "room_signaling_requests_total",
        "method" => method,
        "status" => status
    )
    .increment(1);
    histogram!("room_signaling_request_duration_seconds", "method" => method)
        .record(duration.as_secs_f64());
}

/// Record a notification dropped because the receiving peer's outbox was
/// full or closed.
///
/// Metric: `room_notifications_dropped_total`
/// Labels: `notification`
pub fn record_notification_dropped(notification: &'static str) {
    counter!("room_notifications_dropped_total", "notification" => notification).increment(1);
}

// ============================================================================
// Worker Metrics (Counters)
// ============================================================================

/// Metric: `room_worker_assignments_total`
pub fn record_worker_assignment() {
    counter!("room_worker_assignments_total").increment(1);
}

/// Metric: `room_worker_faults_total`
pub fn record_worker_fault() {
    counter!("room_worker_faults_total").increment(1);
}

// ============================================================================
// Actor Health
// ============================================================================

/// Metric: `room_actor_panics_total`
/// Labels: `actor_type`
pub fn record_actor_panic(actor_type: &'static str) {
    counter!("room_actor_panics_total", "actor_type" => actor_type).increment(1);
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    // Without a recorder installed these calls are no-ops; they must not panic.

    #[test]
    fn test_gauges_without_recorder() {
        set_rooms_active(0);
        set_rooms_active(12);
        set_peers_active(0);
        set_peers_active(1_000);
    }

    #[test]
    fn test_counters_without_recorder() {
        record_signaling_request("join", "success", Duration::from_millis(3));
        record_signaling_request("consume", "capability-mismatch", Duration::from_millis(1));
        record_notification_dropped("new_producers");
        record_worker_assignment();
        record_worker_fault();
        record_actor_panic("room");
    }

    #[test]
    fn test_metrics_are_recorded() {
        use metrics_util::debugging::{DebugValue, DebuggingRecorder};

        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();

        metrics::with_local_recorder(&recorder, || {
            set_rooms_active(3);
            record_signaling_request("produce", "success", Duration::from_millis(8));
            record_signaling_request("produce", "success", Duration::from_millis(9));
            record_worker_assignment();
        });

        let snapshot = snapshotter.snapshot().into_vec();
        let requests = snapshot
            .iter()
            .find(|(key, _, _, _)| key.key().name() == "room_signaling_requests_total")
            .expect("request counter should be recorded");
        assert_eq!(requests.3, DebugValue::Counter(2));

        let rooms = snapshot
            .iter()
            .find(|(key, _, _, _)| key.key().name() == "room_rooms_active")
            .expect("rooms gauge should be recorded");
        assert!(matches!(rooms.3, DebugValue::Gauge(v) if v.into_inner() == 3.0));
    }
}
