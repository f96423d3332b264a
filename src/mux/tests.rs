//! Unit tests for the multiplexer.

use std::{
    io,
    os::{
        fd::{AsRawFd, RawFd},
        unix::net::UnixDatagram,
    },
    sync::Arc,
    time::Duration,
};

use bytes::{Bytes, BytesMut};
use rstest::{fixture, rstest};
use tokio::{sync::mpsc, task::JoinHandle, time::timeout};
use tracing_test::traced_test;

use super::*;
use crate::codec::{Header, Message};

const WAIT: Duration = Duration::from_secs(2);

struct PairSocket(UnixDatagram);

impl Socket for PairSocket {
    fn fd(&self) -> RawFd { self.0.as_raw_fd() }

    fn recv(&self, buf: &mut [u8]) -> io::Result<usize> { self.0.recv(buf) }
}

struct Harness {
    mux: Mux,
    socket: Arc<PairSocket>,
    peer: UnixDatagram,
    serving: JoinHandle<Result<(), MuxError>>,
}

impl Harness {
    fn send(&self, messages: &[Message]) {
        let mut batch = BytesMut::new();
        for message in messages {
            batch.extend_from_slice(&message.to_bytes());
        }
        self.peer.send(&batch).expect("send batch");
    }

    async fn shutdown(self) {
        self.mux.close();
        timeout(WAIT, self.serving)
            .await
            .expect("serve stops after close")
            .expect("serve task")
            .expect("serve result");
    }
}

#[fixture]
fn harness() -> Harness {
    let (local, peer) = UnixDatagram::pair().expect("socket pair");
    local.set_nonblocking(true).expect("non-blocking");
    let mux = Mux::new().expect("create mux");
    let serving = tokio::spawn({
        let mux = mux.clone();
        async move { mux.serve().await }
    });
    Harness {
        mux,
        socket: Arc::new(PairSocket(local)),
        peer,
        serving,
    }
}

fn message(kind: u16, seq: u32) -> Message {
    let mut header = Header::new(kind, 0);
    header.seq = seq;
    header.pid = 1;
    Message::new(header, Bytes::from_static(&[0; 4])).expect("build message")
}

fn forwarder(
    tx: mpsc::UnboundedSender<(u16, u32)>,
    accept: impl Fn(&Message) -> bool + Send + Sync,
) -> impl Listener {
    move |message: &Message| {
        if !accept(message) {
            return false;
        }
        let _ = tx.send((message.kind(), message.seq()));
        true
    }
}

async fn next<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> T {
    timeout(WAIT, rx.recv())
        .await
        .expect("message delivered in time")
        .expect("channel open")
}

#[rstest]
#[tokio::test]
async fn registration_bookkeeping(harness: Harness) {
    let fd = harness.socket.fd();
    assert!(!harness.mux.pop_listener(harness.socket.as_ref()).expect("pop"));

    let first = harness
        .mux
        .push_listener(harness.socket.clone(), |_: &Message| false)
        .expect("push first");
    let second = harness
        .mux
        .push_listener(harness.socket.clone(), |_: &Message| false)
        .expect("push second");
    assert_ne!(first, second);
    assert_eq!(harness.mux.watched_sockets(), 1);
    assert_eq!(harness.mux.listener_count(fd), 2);

    assert!(harness.mux.pop_listener(harness.socket.as_ref()).expect("pop"));
    assert_eq!(harness.mux.listener_count(fd), 1);
    assert!(!harness.mux.remove_listener(fd, second).expect("already popped"));
    assert!(harness.mux.remove_listener(fd, first).expect("remove first"));
    assert_eq!(harness.mux.watched_sockets(), 0);
    assert_eq!(harness.mux.listener_count(fd), 0);

    harness.shutdown().await;
}

#[rstest]
#[tokio::test]
async fn newest_listener_is_offered_first(harness: Harness) {
    let (bottom_tx, mut bottom_rx) = mpsc::unbounded_channel();
    let (top_tx, mut top_rx) = mpsc::unbounded_channel();
    harness
        .mux
        .push_listener(harness.socket.clone(), forwarder(bottom_tx, |_| true))
        .expect("push bottom");
    harness
        .mux
        .push_listener(harness.socket.clone(), forwarder(top_tx, |m| m.kind() == 20))
        .expect("push top");

    harness.send(&[message(20, 1), message(21, 2), message(20, 3)]);

    assert_eq!(next(&mut top_rx).await, (20, 1));
    assert_eq!(next(&mut bottom_rx).await, (21, 2));
    assert_eq!(next(&mut top_rx).await, (20, 3));
    assert!(bottom_rx.try_recv().is_err());

    harness.shutdown().await;
}

#[rstest]
#[tokio::test]
async fn popping_exposes_the_listener_below(harness: Harness) {
    let (bottom_tx, mut bottom_rx) = mpsc::unbounded_channel();
    let (top_tx, mut top_rx) = mpsc::unbounded_channel();
    harness
        .mux
        .push_listener(harness.socket.clone(), forwarder(bottom_tx, |_| true))
        .expect("push bottom");
    harness
        .mux
        .push_listener(harness.socket.clone(), forwarder(top_tx, |_| true))
        .expect("push top");

    harness.send(&[message(16, 1)]);
    assert_eq!(next(&mut top_rx).await, (16, 1));

    assert!(harness.mux.pop_listener(harness.socket.as_ref()).expect("pop"));
    harness.send(&[message(16, 2)]);
    assert_eq!(next(&mut bottom_rx).await, (16, 2));
    assert!(top_rx.try_recv().is_err());

    harness.shutdown().await;
}

#[rstest]
#[tokio::test]
async fn unclaimed_messages_do_not_block_the_batch(harness: Harness) {
    let (tx, mut rx) = mpsc::unbounded_channel();
    harness
        .mux
        .push_listener(harness.socket.clone(), forwarder(tx, |m| m.seq() % 2 == 0))
        .expect("push");

    harness.send(&[message(16, 1), message(16, 2), message(16, 3), message(16, 4)]);
    assert_eq!(next(&mut rx).await, (16, 2));
    assert_eq!(next(&mut rx).await, (16, 4));

    harness.shutdown().await;
}

#[rstest]
#[traced_test]
#[tokio::test]
async fn malformed_batch_is_dropped_but_socket_stays_registered(harness: Harness) {
    let (tx, mut rx) = mpsc::unbounded_channel();
    harness
        .mux
        .push_listener(harness.socket.clone(), forwarder(tx, |_| true))
        .expect("push");

    let mut batch = BytesMut::from(message(16, 1).to_bytes().as_ref());
    let mut bogus = Header::new(16, 0);
    bogus.len = 0;
    batch.extend_from_slice(&bogus.to_bytes());
    batch.extend_from_slice(&message(16, 2).to_bytes());
    harness.peer.send(&batch).expect("send batch");

    assert_eq!(next(&mut rx).await, (16, 1));
    harness.send(&[message(16, 3)]);
    assert_eq!(next(&mut rx).await, (16, 3));
    assert_eq!(harness.mux.watched_sockets(), 1);

    harness.shutdown().await;
    assert!(logs_contain("malformed message"));
}

#[rstest]
#[tokio::test]
async fn empty_datagram_keeps_socket_watched(harness: Harness) {
    let (tx, mut rx) = mpsc::unbounded_channel();
    harness
        .mux
        .push_listener(harness.socket.clone(), forwarder(tx, |_| true))
        .expect("push");

    harness.peer.send(&[]).expect("send empty datagram");
    harness.send(&[message(16, 5)]);
    assert_eq!(next(&mut rx).await, (16, 5));
    assert_eq!(harness.mux.listener_count(harness.socket.fd()), 1);

    harness.shutdown().await;
}

#[rstest]
#[traced_test]
#[tokio::test]
async fn listener_panic_is_logged_and_socket_rewatched(harness: Harness) {
    let (tx, mut rx) = mpsc::unbounded_channel();
    harness
        .mux
        .push_listener(harness.socket.clone(), forwarder(tx, |_| true))
        .expect("push");
    harness
        .mux
        .push_listener(harness.socket.clone(), |message: &Message| {
            assert!(message.seq() != 1, "listener exploded");
            false
        })
        .expect("push panicking listener");

    harness.send(&[message(16, 1)]);
    harness.send(&[message(16, 2)]);
    assert_eq!(next(&mut rx).await, (16, 2));

    harness.shutdown().await;
    logs_assert(|lines: &[&str]| {
        lines
            .iter()
            .find(|line| line.contains("listener panicked") && line.contains("listener exploded"))
            .map(|_| ())
            .ok_or_else(|| "panic not logged".to_string())
    });
}

#[rstest]
#[tokio::test]
async fn listener_may_remove_itself(harness: Harness) {
    let mux = harness.mux.clone();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let socket: Arc<dyn Socket> = harness.socket.clone();
    let fd = socket.fd();
    let slot = Arc::new(Mutex::new(None::<ListenerId>));
    let id = harness
        .mux
        .push_listener(Arc::clone(&socket), {
            let slot = Arc::clone(&slot);
            move |message: &Message| {
                let _ = tx.send(message.seq());
                if let Some(id) = *slot.lock().expect("lock") {
                    mux.remove_listener(fd, id).expect("remove self");
                }
                true
            }
        })
        .expect("push");
    *slot.lock().expect("lock") = Some(id);

    harness.send(&[message(16, 7)]);
    assert_eq!(next(&mut rx).await, 7);
    assert_eq!(harness.mux.watched_sockets(), 0);

    harness.shutdown().await;
}

#[tokio::test]
async fn close_before_serve_returns_immediately() {
    let mux = Mux::new().expect("create mux");
    mux.close();
    assert!(mux.is_closed());
    timeout(WAIT, mux.serve())
        .await
        .expect("serve returns")
        .expect("clean shutdown");
}

#[rstest]
#[case(0, MIN_READ_BUFFER)]
#[case(DEFAULT_READ_BUFFER, DEFAULT_READ_BUFFER)]
#[case(usize::MAX, MAX_READ_BUFFER)]
fn read_buffer_is_clamped(#[case] requested: usize, #[case] expected: usize) {
    let mux = Mux::with_config(MuxConfig::default().read_buffer(requested)).expect("create mux");
    assert_eq!(mux.config().read_buffer_len(), expected);
}

#[test]
fn max_events_has_a_floor() {
    assert_eq!(MuxConfig::default().max_events(0).max_events_per_wait(), 1);
    assert_eq!(MuxConfig::default().max_events_per_wait(), DEFAULT_MAX_EVENTS);
}

#[rstest]
#[case::static_str(Box::new("listener exploded"), "listener exploded")]
#[case::owned(Box::new(String::from("bad seq")), "bad seq")]
#[case::other(Box::new(5_u32), "non-string panic payload")]
fn panic_payload_text(#[case] payload: Box<dyn Any + Send>, #[case] expected: &str) {
    assert_eq!(panic_message(&*payload), expected);
}
