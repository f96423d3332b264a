//! Request/response client layered on the multiplexer.
//!
//! [`Client::call`] sends one [`Request`] and waits for the kernel's answer:
//! a single reply, a multi-part dump ended by `NLMSG_DONE`, an
//! acknowledgement, or an error status. Replies are matched by sequence
//! number through a short-lived listener pushed onto the socket's stack for
//! the duration of the call.

mod correlator;
mod error;

use std::{os::fd::RawFd, sync::Arc};

use correlator::Correlator;
pub use error::ClientError;
use log::warn;
use tokio::sync::mpsc;
use tracing::{Instrument, field};

use crate::{
    codec::Message,
    metrics::{self, Outcome},
    mux::{ListenerId, Mux},
    request::Request,
    socket::{Connection, Socket},
};

/// Issues requests on one connection and collects the replies.
///
/// Calls may run concurrently on the same client; each is correlated by its
/// own sequence number.
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
///
/// use nlmux::{
///     client::Client,
///     codec::NLM_F_DUMP,
///     mux::Mux,
///     request::Request,
///     socket::{NETLINK_ROUTE, NetlinkSocket},
/// };
///
/// const RTM_GETLINK: u16 = 18;
/// const RTM_NEWLINK: u16 = 16;
///
/// # async fn run() -> Result<(), Box<dyn std::error::Error>> {
/// let mux = Mux::new()?;
/// tokio::spawn({
///     let mux = mux.clone();
///     async move { mux.serve().await }
/// });
/// let client = Client::new(mux, Arc::new(NetlinkSocket::open(NETLINK_ROUTE, &[])?));
///
/// let mut request = Request::new(RTM_GETLINK, NLM_F_DUMP);
/// request.append_bytes(vec![0u8; 16])?;
/// request.append_reply_kind(RTM_NEWLINK);
/// let links = client.call(&mut request).await?;
/// println!("{} links", links.len());
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Client<C> {
    mux: Mux,
    conn: Arc<C>,
}

impl<C> Clone for Client<C> {
    fn clone(&self) -> Self {
        Self {
            mux: self.mux.clone(),
            conn: Arc::clone(&self.conn),
        }
    }
}

impl<C> Client<C>
where
    C: Connection + 'static,
{
    /// Create a client sending on `conn` and receiving through `mux`.
    ///
    /// The multiplexer must be serving for calls to complete.
    #[must_use]
    pub fn new(mux: Mux, conn: Arc<C>) -> Self { Self { mux, conn } }

    /// Connection requests are sent on.
    #[must_use]
    pub fn connection(&self) -> &Arc<C> { &self.conn }

    /// Multiplexer replies are received through.
    #[must_use]
    pub fn mux(&self) -> &Mux { &self.mux }

    /// Send `request` and wait for the exchange to finish.
    ///
    /// The request is committed with a fresh sequence number first. Data
    /// replies are returned in arrival order once the kernel signals the end
    /// of the exchange. Without the dump flag the first data reply ends the
    /// exchange.
    ///
    /// There is no built-in timeout; wrap the call in
    /// `tokio::time::timeout` if needed. Dropping the future removes the
    /// reply listener.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Kernel`] for a non-zero kernel status,
    /// [`ClientError::Io`] if the send fails, [`ClientError::Mux`] if the
    /// listener cannot be registered, [`ClientError::Codec`] for an
    /// undecodable status and [`ClientError::Disconnected`] if the reply
    /// stream ends early.
    pub async fn call(&self, request: &mut Request) -> Result<Vec<Message>, ClientError> {
        let seq = self.conn.next_sequence();
        request.commit(seq);
        let span = tracing::debug_span!(
            "client.call",
            kind = request.header().kind,
            seq,
            dump = request.is_dump(),
            replies = field::Empty,
            result = field::Empty,
        );
        let result = self.exchange(request).instrument(span.clone()).await;
        match &result {
            Ok(replies) => {
                span.record("replies", replies.len());
                span.record("result", "ok");
                metrics::inc_calls(Outcome::Ok);
            }
            Err(ClientError::Kernel { source, .. }) => {
                span.record("result", field::display(source));
                metrics::inc_calls(Outcome::KernelError);
            }
            Err(e) => {
                span.record("result", field::display(e));
                metrics::inc_calls(Outcome::Failed);
            }
        }
        result
    }

    async fn exchange(&self, request: &Request) -> Result<Vec<Message>, ClientError> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let socket: Arc<dyn Socket> = Arc::<C>::clone(&self.conn);
        let fd = socket.fd();
        let id = self
            .mux
            .push_listener(socket, Correlator::new(request, tx))?;
        let _release = Release {
            mux: &self.mux,
            fd,
            id,
        };

        self.conn.send_segments(&request.io_slices())?;

        let mut replies = Vec::new();
        while let Some(message) = rx.recv().await {
            if !message.is_terminal() {
                replies.push(message);
                continue;
            }
            return match message.status()? {
                None => Ok(replies),
                Some(source) => Err(ClientError::Kernel { source, replies }),
            };
        }
        if request.is_dump() || replies.is_empty() {
            return Err(ClientError::Disconnected);
        }
        Ok(replies)
    }
}

/// Removes the call's listener on every exit path.
struct Release<'a> {
    mux: &'a Mux,
    fd: RawFd,
    id: ListenerId,
}

impl Drop for Release<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.mux.remove_listener(self.fd, self.id) {
            warn!("failed to remove reply listener: fd={}, id={}, error={e}", self.fd, self.id);
        }
    }
}
