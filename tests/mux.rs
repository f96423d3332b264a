//! Integration tests for [`nlmux::Mux`] with real and flaky sockets.

use std::{
    io,
    os::{
        fd::{AsRawFd, RawFd},
        unix::net::UnixDatagram,
    },
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use nlmux::{
    Message,
    Mux,
    codec::Header,
    socket::{NETLINK_ROUTE, NetlinkSocket, Socket},
};
use nlmux_testing::{LoggerHandle, logger};
use rstest::rstest;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(5);

/// Fails the first read, leaving the datagram queued.
struct FlakySocket {
    inner: UnixDatagram,
    fail_next: AtomicBool,
}

impl Socket for FlakySocket {
    fn fd(&self) -> RawFd { self.inner.as_raw_fd() }

    fn recv(&self, buf: &mut [u8]) -> io::Result<usize> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(io::Error::other("injected read failure"));
        }
        self.inner.recv(buf)
    }
}

#[tokio::test]
async fn register_and_close_route_sockets_repeatedly() {
    for _ in 0..200 {
        let mux = Mux::new().expect("create mux");
        let serving = tokio::spawn({
            let mux = mux.clone();
            async move { mux.serve().await }
        });
        let conn = Arc::new(NetlinkSocket::open(NETLINK_ROUTE, &[]).expect("open route socket"));
        mux.push_listener(conn.clone(), |_: &Message| false)
            .expect("push");
        assert!(mux.pop_listener(conn.as_ref()).expect("pop"));
        drop(conn);
        mux.close();
        timeout(WAIT, serving)
            .await
            .expect("serve stops")
            .expect("serve task")
            .expect("serve result");
    }
}

#[rstest]
#[tokio::test]
async fn read_failure_drops_batch_and_rewatches(mut logger: LoggerHandle) {
    let (local, peer) = UnixDatagram::pair().expect("socket pair");
    local.set_nonblocking(true).expect("non-blocking");
    let socket = Arc::new(FlakySocket {
        inner: local,
        fail_next: AtomicBool::new(true),
    });

    let mux = Mux::new().expect("create mux");
    let serving = tokio::spawn({
        let mux = mux.clone();
        async move { mux.serve().await }
    });
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    mux.push_listener(socket, move |message: &Message| tx.send(message.seq()).is_ok())
        .expect("push");

    let mut header = Header::new(16, 0);
    header.seq = 9;
    let message = Message::new(header, bytes::Bytes::new()).expect("message");
    peer.send(&message.to_bytes()).expect("send");

    let seq = timeout(WAIT, rx.recv()).await.expect("delivered").expect("open");
    assert_eq!(seq, 9);

    mux.close();
    timeout(WAIT, serving)
        .await
        .expect("serve stops")
        .expect("serve task")
        .expect("serve result");
    assert!(logger.contains("socket read failed"), "read failure not logged");
}
