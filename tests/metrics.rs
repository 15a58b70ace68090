#![cfg(feature = "metrics")]
//! Tests for `streamwire` metrics helpers.
//!
//! These tests verify that counters and gauges update as expected using
//! `metrics_util::debugging::DebuggingRecorder`.

use metrics_util::debugging::{DebugValue, DebuggingRecorder, Snapshotter};
use rstest::rstest;
use streamwire::metrics::{self as wire_metrics, Direction};

fn debugging_recorder_setup() -> (Snapshotter, DebuggingRecorder) {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    (snapshotter, recorder)
}

#[rstest]
#[case::inbound(Direction::Inbound, "inbound")]
#[case::outbound(Direction::Outbound, "outbound")]
fn frame_metric_is_labelled_by_direction(#[case] direction: Direction, #[case] label: &str) {
    let (snapshotter, recorder) = debugging_recorder_setup();
    metrics::with_local_recorder(&recorder, || wire_metrics::inc_frames(direction));

    let metrics = snapshotter.snapshot().into_vec();
    let found = metrics.iter().any(|(k, _, _, v)| {
        k.key().name() == wire_metrics::FRAMES_PROCESSED
            && k.key()
                .labels()
                .any(|l| l.key() == "direction" && l.value() == label)
            && matches!(v, DebugValue::Counter(c) if *c > 0)
    });
    assert!(found, "{label} frames metric not recorded");
}

#[rstest]
#[case::errors(wire_metrics::ERRORS_TOTAL, wire_metrics::inc_errors as fn())]
#[case::panics(wire_metrics::HANDLER_PANICS, wire_metrics::inc_handler_panics as fn())]
fn counters_increment(#[case] name: &str, #[case] record: fn()) {
    let (snapshotter, recorder) = debugging_recorder_setup();
    metrics::with_local_recorder(&recorder, record);

    let metrics = snapshotter.snapshot().into_vec();
    let found = metrics.iter().any(|(k, _, _, v)| {
        k.key().name() == name && matches!(v, DebugValue::Counter(c) if *c == 1)
    });
    assert!(found, "{name} not recorded");
}

#[test]
fn connection_gauge_tracks_open_connections() {
    let (snapshotter, recorder) = debugging_recorder_setup();
    metrics::with_local_recorder(&recorder, || {
        wire_metrics::inc_connections();
        wire_metrics::inc_connections();
        wire_metrics::dec_connections();
    });

    let metrics = snapshotter.snapshot().into_vec();
    let found = metrics.iter().any(|(k, _, _, v)| {
        k.key().name() == wire_metrics::CONNECTIONS_ACTIVE
            && matches!(v, DebugValue::Gauge(g) if (g.into_inner() - 1.0).abs() < f64::EPSILON)
    });
    assert!(found, "active connections gauge not recorded");
}
