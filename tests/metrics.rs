#![cfg(feature = "metrics")]
//! Tests for `nlmux` metrics helpers and the counters the multiplexer and
//! client update.
//!
//! These tests verify that counters update as expected using
//! `metrics_util::debugging::DebuggingRecorder`.

use std::time::Duration;

use bytes::Bytes;
use metrics_util::debugging::{DebugValue, DebuggingRecorder, Snapshotter};
use nlmux::{
    Message,
    Mux,
    codec::Header,
    metrics::{
        CALLS_COMPLETED,
        DECODE_ERRORS,
        LISTENER_PANICS,
        MESSAGES_DISPATCHED,
        MESSAGES_UNCLAIMED,
        Outcome,
    },
};
use nlmux_testing::mock_pair;
use rstest::rstest;

/// Creates a debugging recorder and snapshotter for metrics testing.
fn debugging_recorder_setup() -> (Snapshotter, DebuggingRecorder) {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    (snapshotter, recorder)
}

fn counter_value(snapshotter: &Snapshotter, name: &str, label: Option<(&str, &str)>) -> u64 {
    snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .filter(|(k, _, _, _)| {
            k.key().name() == name
                && label.is_none_or(|(key, value)| {
                    k.key()
                        .labels()
                        .any(|l| l.key() == key && l.value() == value)
                })
        })
        .map(|(_, _, _, v)| match v {
            DebugValue::Counter(c) => c,
            _ => 0,
        })
        .sum()
}

#[rstest]
#[case(MESSAGES_DISPATCHED, nlmux::metrics::inc_dispatched as fn())]
#[case(MESSAGES_UNCLAIMED, nlmux::metrics::inc_unclaimed as fn())]
#[case(DECODE_ERRORS, nlmux::metrics::inc_decode_errors as fn())]
#[case(LISTENER_PANICS, nlmux::metrics::inc_listener_panics as fn())]
fn counters_increment(#[case] name: &str, #[case] record: fn()) {
    let (snapshotter, recorder) = debugging_recorder_setup();
    metrics::with_local_recorder(&recorder, || {
        record();
        record();
    });
    assert_eq!(counter_value(&snapshotter, name, None), 2);
}

#[rstest]
#[case(Outcome::Ok, "ok")]
#[case(Outcome::KernelError, "kernel_error")]
#[case(Outcome::Failed, "failed")]
fn calls_are_labelled_by_outcome(#[case] outcome: Outcome, #[case] label: &str) {
    let (snapshotter, recorder) = debugging_recorder_setup();
    metrics::with_local_recorder(&recorder, || nlmux::metrics::inc_calls(outcome));
    assert_eq!(
        counter_value(&snapshotter, CALLS_COMPLETED, Some(("outcome", label))),
        1
    );
}

#[test]
fn dispatch_counts_claimed_and_unclaimed_messages() {
    let (snapshotter, recorder) = debugging_recorder_setup();
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("runtime");

    // The local recorder covers every task, since all of them run on this
    // thread inside `block_on`.
    metrics::with_local_recorder(&recorder, || {
        runtime.block_on(async {
            let (conn, kernel) = mock_pair().expect("mock pair");
            let mux = Mux::new().expect("create mux");
            let serving = tokio::spawn({
                let mux = mux.clone();
                async move { mux.serve().await }
            });
            let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
            mux.push_listener(conn, move |message: &Message| {
                message.seq() == 1 && tx.send(()).is_ok()
            })
            .expect("push");

            let messages: Vec<Message> = [1, 2]
                .into_iter()
                .map(|seq| {
                    let mut header = Header::new(16, 0);
                    header.seq = seq;
                    Message::new(header, Bytes::new()).expect("message")
                })
                .collect();
            kernel.send(&messages).await.expect("send");

            tokio::time::timeout(Duration::from_secs(5), rx.recv())
                .await
                .expect("delivered")
                .expect("open");
            mux.close();
            serving.await.expect("serve task").expect("serve result");
        });
    });

    assert_eq!(counter_value(&snapshotter, MESSAGES_DISPATCHED, None), 1);
    assert_eq!(counter_value(&snapshotter, MESSAGES_UNCLAIMED, None), 1);
}
