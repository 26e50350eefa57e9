#![cfg(feature = "metrics")]
//! Tests for `wiregate` metrics helpers.
//!
//! Counters and gauges are observed through
//! `metrics_util::debugging::DebuggingRecorder`.
use metrics::{SharedString, Unit};
use metrics_util::{
    CompositeKey,
    debugging::{DebugValue, DebuggingRecorder, Snapshotter},
};
use rstest::rstest;
use wiregate::{
    codec::StreamCodec,
    connection::DefaultHandler,
    metrics::{self as wg_metrics, Direction},
};
use wiregate_testing::{drive_connection, stream_frame};

fn debugging_recorder_setup() -> (Snapshotter, DebuggingRecorder) {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    (snapshotter, recorder)
}

type Snapshot = Vec<(CompositeKey, Option<Unit>, Option<SharedString>, DebugValue)>;

/// Take the single snapshot a test asserts against; snapshots drain counters.
fn take(snapshotter: &Snapshotter) -> Snapshot { snapshotter.snapshot().into_vec() }

fn counter_with_label(metrics: &Snapshot, name: &str, label: (&str, &str)) -> Option<u64> {
    metrics.iter().find_map(|(key, _, _, value)| {
        let matches = key.key().name() == name
            && key
                .key()
                .labels()
                .any(|l| l.key() == label.0 && l.value() == label.1);
        match value {
            DebugValue::Counter(c) if matches => Some(*c),
            _ => None,
        }
    })
}

fn assert_counter_eq(metrics: &Snapshot, name: &str, expected: u64) {
    assert!(
        metrics.iter().any(|(key, _, _, value)| {
            key.key().name() == name && matches!(value, DebugValue::Counter(c) if *c == expected)
        }),
        "expected {name} == {expected}, got {metrics:#?}"
    );
}

#[rstest]
#[case(Direction::Inbound)]
#[case(Direction::Outbound)]
fn frame_metric_is_labelled_by_direction(#[case] direction: Direction) {
    let (snapshotter, recorder) = debugging_recorder_setup();
    metrics::with_local_recorder(&recorder, || wg_metrics::inc_frames(direction));

    let metrics = take(&snapshotter);
    assert_eq!(
        counter_with_label(
            &metrics,
            wg_metrics::FRAMES_PROCESSED,
            ("direction", direction.as_str())
        ),
        Some(1)
    );
}

#[test]
fn error_metric_is_labelled_by_kind() {
    let (snapshotter, recorder) = debugging_recorder_setup();
    metrics::with_local_recorder(&recorder, || wg_metrics::inc_errors("framing"));
    assert_eq!(
        counter_with_label(&take(&snapshotter), wg_metrics::ERRORS_TOTAL, ("kind", "framing")),
        Some(1)
    );
}

#[rstest]
#[case(1)]
#[case(3)]
fn gateway_counters_count(#[case] expected: u64) {
    let (snapshotter, recorder) = debugging_recorder_setup();
    metrics::with_local_recorder(&recorder, || {
        for _ in 0..expected {
            wg_metrics::inc_dispatched();
            wg_metrics::inc_route_misses();
            wg_metrics::inc_connection_panics();
        }
    });
    let metrics = take(&snapshotter);
    assert_counter_eq(&metrics, wg_metrics::GATEWAY_DISPATCHED, expected);
    assert_counter_eq(&metrics, wg_metrics::ROUTE_MISSES, expected);
    assert_counter_eq(&metrics, wg_metrics::CONNECTION_PANICS, expected);
}

#[test]
fn provider_gauge_holds_the_latest_value() {
    let (snapshotter, recorder) = debugging_recorder_setup();
    metrics::with_local_recorder(&recorder, || {
        wg_metrics::set_providers(4);
        wg_metrics::set_providers(2);
    });
    let found = take(&snapshotter).into_iter().any(|(key, _, _, value)| {
        key.key().name() == wg_metrics::PROVIDERS_REGISTERED
            && matches!(value, DebugValue::Gauge(g) if g.into_inner() == 2.0)
    });
    assert!(found, "provider gauge not recorded");
}

#[tokio::test(flavor = "current_thread")]
async fn connection_records_frames_in_both_directions() {
    let (snapshotter, recorder) = debugging_recorder_setup();
    let _guard = metrics::set_default_local_recorder(&recorder);

    let out = drive_connection(
        StreamCodec::new(),
        &DefaultHandler::new("svc"),
        vec![stream_frame(b"a"), stream_frame(b"b")],
    )
    .await
    .expect("drive connection");
    assert_eq!(out.len(), 2 * stream_frame(b"this is svc.").len());

    let metrics = take(&snapshotter);
    for direction in [Direction::Inbound, Direction::Outbound] {
        assert_eq!(
            counter_with_label(
                &metrics,
                wg_metrics::FRAMES_PROCESSED,
                ("direction", direction.as_str())
            ),
            Some(2)
        );
    }
}
