//! Socketpair-backed stand-in for a netlink socket and the kernel behind it.

use std::{
    io::{self, IoSlice},
    os::{
        fd::{AsRawFd, RawFd},
        unix::net,
    },
    sync::Arc,
};

use bytes::{BufMut, Bytes, BytesMut};
use nlmux::{
    codec::{Header, Message, MessageIter, NLM_F_MULTI, NLMSG_DONE, NLMSG_ERROR},
    socket::{Connection, SequenceCounter, Socket},
};
use tokio::net::UnixDatagram;

/// Port id stamped on every reply built by this module.
pub const KERNEL_PID: u32 = 4242;

const MAX_DATAGRAM: usize = 64 * 1024;

/// Client side of a mock netlink socket.
#[derive(Debug)]
pub struct MockConnection {
    local: net::UnixDatagram,
    seq: SequenceCounter,
}

impl Socket for MockConnection {
    fn fd(&self) -> RawFd { self.local.as_raw_fd() }

    fn recv(&self, buf: &mut [u8]) -> io::Result<usize> { self.local.recv(buf) }
}

impl Connection for MockConnection {
    fn send_segments(&self, segments: &[IoSlice<'_>]) -> io::Result<usize> {
        let datagram: Vec<u8> = segments.iter().flat_map(|s| s.iter().copied()).collect();
        self.local.send(&datagram)
    }

    fn next_sequence(&self) -> u32 { self.seq.next() }
}

/// Kernel side of a mock netlink socket.
#[derive(Debug)]
pub struct MockKernel {
    peer: UnixDatagram,
}

/// Create a connected [`MockConnection`] and [`MockKernel`].
///
/// # Errors
///
/// Returns the OS error if the socket pair cannot be created. Must be called
/// inside a Tokio runtime.
pub fn mock_pair() -> io::Result<(Arc<MockConnection>, MockKernel)> {
    let (local, peer) = net::UnixDatagram::pair()?;
    local.set_nonblocking(true)?;
    peer.set_nonblocking(true)?;
    let conn = MockConnection {
        local,
        seq: SequenceCounter::new(),
    };
    let kernel = MockKernel {
        peer: UnixDatagram::from_std(peer)?,
    };
    Ok((Arc::new(conn), kernel))
}

impl MockKernel {
    /// Wait for the next request the client sends.
    ///
    /// # Errors
    ///
    /// Returns the OS error from the socket, or `InvalidData` if the datagram
    /// does not hold a well-formed message.
    pub async fn recv_request(&self) -> io::Result<Message> {
        let mut buf = vec![0u8; MAX_DATAGRAM];
        let len = self.peer.recv(&mut buf).await?;
        buf.truncate(len);
        MessageIter::new(Bytes::from(buf))
            .next()
            .unwrap_or_else(|| Err(nlmux::CodecError::Truncated { need: 16, have: 0 }))
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }

    /// Send `messages` back-to-back in one datagram.
    ///
    /// # Errors
    ///
    /// Returns the OS error from the socket.
    pub async fn send(&self, messages: &[Message]) -> io::Result<()> {
        let mut batch = BytesMut::new();
        for message in messages {
            batch.extend_from_slice(&message.to_bytes());
        }
        self.peer.send(&batch).await.map(drop)
    }

    /// Send raw bytes as one datagram.
    ///
    /// # Errors
    ///
    /// Returns the OS error from the socket.
    pub async fn send_raw(&self, bytes: &[u8]) -> io::Result<()> { self.peer.send(bytes).await.map(drop) }

    /// Answer every request with the datagrams `respond` returns.
    ///
    /// Each inner vector is sent as one datagram. Runs until the client side
    /// closes or a socket error occurs.
    pub async fn respond<F>(self, mut respond: F)
    where
        F: FnMut(&Message) -> Vec<Vec<Message>> + Send,
    {
        while let Ok(request) = self.recv_request().await {
            for datagram in respond(&request) {
                if self.send(&datagram).await.is_err() {
                    return;
                }
            }
        }
    }
}

fn answer(request: &Message, kind: u16, flags: u16, body: Bytes) -> Message {
    let mut header = Header::new(kind, flags);
    header.seq = request.seq();
    header.pid = KERNEL_PID;
    Message::new(header, body).unwrap_or_else(|e| panic!("reply body too large: {e}"))
}

/// Data reply of type `kind` to `request`, flagged as part of a multi-part
/// answer.
#[must_use]
pub fn reply_data(request: &Message, kind: u16, body: impl Into<Bytes>) -> Message {
    answer(request, kind, NLM_F_MULTI, body.into())
}

/// `NLMSG_DONE` ending a dump; `status` is zero or a negative errno.
#[must_use]
pub fn reply_done(request: &Message, status: i32) -> Message {
    answer(
        request,
        NLMSG_DONE,
        NLM_F_MULTI,
        Bytes::copy_from_slice(&status.to_ne_bytes()),
    )
}

/// `NLMSG_ERROR` carrying `status` and the echoed request header.
///
/// A zero status is an acknowledgement.
#[must_use]
pub fn reply_ack(request: &Message, status: i32) -> Message {
    let mut body = BytesMut::with_capacity(4 + 16);
    body.put_i32_ne(status);
    body.put_slice(&request.header.to_bytes());
    answer(request, NLMSG_ERROR, 0, body.freeze())
}
