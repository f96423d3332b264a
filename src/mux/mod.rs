//! Socket multiplexer.
//!
//! A [`Mux`] watches many sockets for readability from a single serve loop.
//! Every registered socket owns a read buffer and a stack of [`Listener`]s;
//! each readable batch is decoded into messages on a dispatch task and every
//! message is offered to the stack, newest listener first, until one claims
//! it. A socket is taken out of the readiness set while its batch is being
//! dispatched and only re-watched afterwards, so messages from one socket are
//! always delivered in order.

mod config;
mod error;
mod listener;
mod poller;

use std::{
    any::Any,
    collections::{HashMap, hash_map},
    fmt,
    io,
    mem,
    os::fd::{AsRawFd, RawFd},
    panic::AssertUnwindSafe,
    sync::{
        Arc,
        Mutex,
        MutexGuard,
        PoisonError,
        atomic::{AtomicU64, Ordering},
    },
};

use bytes::Bytes;
pub use config::{DEFAULT_MAX_EVENTS, DEFAULT_READ_BUFFER, MAX_READ_BUFFER, MIN_READ_BUFFER, MuxConfig};
pub use error::MuxError;
use futures::FutureExt;
pub use listener::{Listener, ListenerId};
use log::{debug, error, info, warn};
use poller::{Poller, Ready};
use tokio::{
    io::{Interest, unix::AsyncFd},
    select,
};
use tokio_util::{sync::CancellationToken, task::TaskTracker};

use crate::{codec::MessageIter, metrics, socket::Socket};

type ListenerStack = Vec<(ListenerId, Arc<dyn Listener>)>;

struct Entry {
    socket: Arc<dyn Socket>,
    buf: Vec<u8>,
    listeners: ListenerStack,
}

struct Shared {
    poller: Poller,
    config: MuxConfig,
    entries: Mutex<HashMap<RawFd, Entry>>,
    next_id: AtomicU64,
    shutdown: CancellationToken,
    tracker: TaskTracker,
}

/// Readiness-driven dispatcher for netlink sockets.
///
/// `Mux` is a cheap handle; clones share the same sockets and listeners. Run
/// [`serve`](Self::serve) on a task of its own and register listeners from
/// anywhere.
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
///
/// use nlmux::{
///     codec::Message,
///     mux::Mux,
///     socket::{NETLINK_ROUTE, NetlinkSocket},
/// };
///
/// # async fn run() -> Result<(), Box<dyn std::error::Error>> {
/// let mux = Mux::new()?;
/// let serving = tokio::spawn({
///     let mux = mux.clone();
///     async move { mux.serve().await }
/// });
///
/// let events = Arc::new(NetlinkSocket::open(NETLINK_ROUTE, &[1])?);
/// mux.push_listener(events, |message: &Message| {
///     println!("link event: type={}", message.kind());
///     true
/// })?;
///
/// mux.close();
/// serving.await??;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Mux {
    shared: Arc<Shared>,
}

impl fmt::Debug for Mux {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mux")
            .field("config", &self.shared.config)
            .field("watched_sockets", &self.watched_sockets())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

impl Mux {
    /// Create a multiplexer with the default [`MuxConfig`].
    ///
    /// # Errors
    ///
    /// Returns [`MuxError::Create`] if the epoll instance cannot be created.
    pub fn new() -> Result<Self, MuxError> { Self::with_config(MuxConfig::default()) }

    /// Create a multiplexer with `config`.
    ///
    /// # Errors
    ///
    /// Returns [`MuxError::Create`] if the epoll instance cannot be created.
    pub fn with_config(config: MuxConfig) -> Result<Self, MuxError> {
        let poller = Poller::new().map_err(MuxError::Create)?;
        Ok(Self {
            shared: Arc::new(Shared {
                poller,
                config,
                entries: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                shutdown: CancellationToken::new(),
                tracker: TaskTracker::new(),
            }),
        })
    }

    /// Configuration this multiplexer was created with.
    #[must_use]
    pub fn config(&self) -> &MuxConfig { &self.shared.config }

    /// Push `listener` on top of the stack for `socket`.
    ///
    /// The first registration for a socket creates its entry and starts
    /// watching it; later registrations shadow earlier ones.
    ///
    /// # Errors
    ///
    /// Returns [`MuxError::Watch`] if a new socket cannot be added to the
    /// readiness set. Nothing is registered in that case.
    pub fn push_listener<L>(&self, socket: Arc<dyn Socket>, listener: L) -> Result<ListenerId, MuxError>
    where
        L: Listener + 'static,
    {
        let id = ListenerId(self.shared.next_id.fetch_add(1, Ordering::Relaxed));
        let fd = socket.fd();
        let listener: Arc<dyn Listener> = Arc::new(listener);
        let mut entries = self.shared.entries();
        match entries.entry(fd) {
            hash_map::Entry::Occupied(mut occupied) => occupied.get_mut().listeners.insert(0, (id, listener)),
            hash_map::Entry::Vacant(vacant) => {
                self.shared
                    .poller
                    .watch(fd)
                    .map_err(|source| MuxError::Watch { fd, source })?;
                vacant.insert(Entry {
                    socket,
                    buf: vec![0; self.shared.config.read_buffer_len()],
                    listeners: vec![(id, listener)],
                });
                debug!("watching socket: fd={fd}");
            }
        }
        Ok(id)
    }

    /// Remove the most recently pushed listener for `socket`.
    ///
    /// Removing the last listener stops watching the socket and drops its
    /// entry. Returns `false` if the socket had no listeners.
    ///
    /// # Errors
    ///
    /// Returns [`MuxError::Watch`] if the socket cannot be removed from the
    /// readiness set; the entry is dropped regardless.
    pub fn pop_listener<S>(&self, socket: &S) -> Result<bool, MuxError>
    where
        S: Socket + ?Sized,
    {
        self.shared
            .remove(socket.fd(), |stack| (!stack.is_empty()).then_some(0))
    }

    /// Remove the listener registered as `id` on socket `fd`.
    ///
    /// Same teardown rules as [`pop_listener`](Self::pop_listener). Returns
    /// `false` if no such listener is registered.
    ///
    /// # Errors
    ///
    /// Returns [`MuxError::Watch`] if the socket cannot be removed from the
    /// readiness set; the entry is dropped regardless.
    pub fn remove_listener(&self, fd: RawFd, id: ListenerId) -> Result<bool, MuxError> {
        self.shared
            .remove(fd, |stack| stack.iter().position(|(entry_id, _)| *entry_id == id))
    }

    /// Number of sockets with at least one listener.
    #[must_use]
    pub fn watched_sockets(&self) -> usize { self.shared.entries().len() }

    /// Number of listeners stacked on socket `fd`.
    #[must_use]
    pub fn listener_count(&self, fd: RawFd) -> usize {
        self.shared
            .entries()
            .get(&fd)
            .map_or(0, |entry| entry.listeners.len())
    }

    /// Ask [`serve`](Self::serve) to stop.
    ///
    /// Registered sockets are left alone; in-flight batches finish
    /// dispatching before `serve` returns.
    pub fn close(&self) { self.shared.shutdown.cancel(); }

    /// Report whether [`close`](Self::close) has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool { self.shared.shutdown.is_cancelled() }

    /// Dispatch readable sockets until [`close`](Self::close) is called.
    ///
    /// Must run inside a Tokio runtime with I/O enabled. Per-socket read
    /// failures only drop the affected batch; they are logged and the socket
    /// is watched again.
    ///
    /// # Errors
    ///
    /// Returns [`MuxError::Register`] if the readiness context cannot be
    /// registered with the runtime and [`MuxError::Wait`] if waiting fails
    /// with anything but `EINTR`.
    #[expect(
        clippy::integer_division_remainder_used,
        reason = "tokio::select! expands to modulus internally"
    )]
    pub async fn serve(&self) -> Result<(), MuxError> {
        let shared = &self.shared;
        let readiness = AsyncFd::with_interest(shared.poller.as_raw_fd(), Interest::READABLE)
            .map_err(MuxError::Register)?;
        let mut events = vec![libc::epoll_event { events: 0, u64: 0 }; shared.config.max_events_per_wait()];
        let mut ready = Vec::with_capacity(events.len());
        info!("mux serving: max_events={}", events.len());

        let result = loop {
            select! {
                biased;

                () = shared.shutdown.cancelled() => break Ok(()),
                guard = readiness.readable() => {
                    let mut guard = match guard {
                        Ok(guard) => guard,
                        Err(e) => break Err(MuxError::Wait(e)),
                    };
                    match guard.try_io(|_| shared.poller.poll(&mut events, &mut ready)) {
                        Ok(Ok(())) => {}
                        Ok(Err(e)) if e.kind() == io::ErrorKind::Interrupted => continue,
                        Ok(Err(e)) => break Err(MuxError::Wait(e)),
                        Err(_would_block) => continue,
                    }
                }
            }
            for &event in &ready {
                shared.read_ready(event);
            }
        };

        shared.tracker.close();
        shared.tracker.wait().await;
        info!("mux stopped");
        result
    }
}

impl Shared {
    fn entries(&self) -> MutexGuard<'_, HashMap<RawFd, Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn remove<F>(&self, fd: RawFd, pick: F) -> Result<bool, MuxError>
    where
        F: FnOnce(&ListenerStack) -> Option<usize>,
    {
        let mut entries = self.entries();
        let Some(entry) = entries.get_mut(&fd) else {
            return Ok(false);
        };
        let Some(index) = pick(&entry.listeners) else {
            return Ok(false);
        };
        entry.listeners.remove(index);
        if entry.listeners.is_empty() {
            let unwatched = self.poller.unwatch(fd);
            entries.remove(&fd);
            unwatched.map_err(|source| MuxError::Watch { fd, source })?;
            debug!("stopped watching socket: fd={fd}");
        }
        Ok(true)
    }

    /// Unwatch `fd` and lend out its socket and read buffer.
    fn begin_read(&self, fd: RawFd) -> Option<(Arc<dyn Socket>, Vec<u8>)> {
        let mut entries = self.entries();
        if let Err(e) = self.poller.unwatch(fd) {
            warn!("failed to unwatch ready socket: fd={fd}, error={e}");
        }
        let entry = entries.get_mut(&fd)?;
        Some((Arc::clone(&entry.socket), mem::take(&mut entry.buf)))
    }

    fn finish_read(&self, fd: RawFd, buf: Vec<u8>) {
        if let Some(entry) = self.entries().get_mut(&fd) {
            entry.buf = buf;
        }
    }

    fn rewatch(&self, fd: RawFd) {
        let entries = self.entries();
        if entries.contains_key(&fd)
            && let Err(e) = self.poller.watch(fd)
        {
            error!("failed to watch socket again: fd={fd}, error={e}");
        }
    }

    fn read_ready(self: &Arc<Self>, Ready { fd, hung_up }: Ready) {
        let Some((socket, mut buf)) = self.begin_read(fd) else {
            return;
        };
        buf.resize(self.config.read_buffer_len(), 0);
        let received = socket
            .recv(&mut buf)
            .map(|len| Bytes::copy_from_slice(&buf[..len]));
        self.finish_read(fd, buf);

        match received {
            Ok(batch) if !batch.is_empty() => self.spawn_dispatch(fd, batch),
            Ok(_) if hung_up => debug!("peer hung up; socket left unwatched: fd={fd}"),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock && hung_up => {
                debug!("peer hung up; socket left unwatched: fd={fd}");
            }
            Ok(_) => {
                debug!("empty datagram ignored: fd={fd}");
                self.rewatch(fd);
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => self.rewatch(fd),
            Err(e) => {
                warn!("socket read failed; batch dropped: fd={fd}, error={e}");
                self.rewatch(fd);
            }
        }
    }

    fn spawn_dispatch(self: &Arc<Self>, fd: RawFd, batch: Bytes) {
        let shared = Arc::clone(self);
        self.tracker.spawn(async move {
            let fut = AssertUnwindSafe(async { shared.dispatch(fd, batch) }).catch_unwind();
            if let Err(panic) = fut.await {
                metrics::inc_listener_panics();
                let panic_msg = panic_message(&*panic);
                // Reported through both facades.
                error!("listener panicked; rest of batch dropped: panic={panic_msg}, fd={fd}");
                tracing::error!(panic = %panic_msg, fd, "listener panicked");
            }
            shared.rewatch(fd);
        });
    }

    fn dispatch(&self, fd: RawFd, batch: Bytes) {
        for decoded in MessageIter::new(batch) {
            let message = match decoded {
                Ok(message) => message,
                Err(e) => {
                    metrics::inc_decode_errors();
                    tracing::warn!(fd, error = %e, "malformed message; rest of batch dropped");
                    return;
                }
            };
            let listeners = self.listeners(fd);
            if listeners.iter().any(|listener| listener.claim(&message)) {
                metrics::inc_dispatched();
            } else {
                metrics::inc_unclaimed();
                tracing::debug!(
                    fd,
                    kind = message.kind(),
                    seq = message.seq(),
                    pid = message.pid(),
                    "message unclaimed"
                );
            }
        }
    }

    /// Snapshot of the stack for `fd`, newest first.
    fn listeners(&self, fd: RawFd) -> Vec<Arc<dyn Listener>> {
        self.entries().get(&fd).map_or_else(Vec::new, |entry| {
            entry
                .listeners
                .iter()
                .map(|(_, listener)| Arc::clone(listener))
                .collect()
        })
    }
}

/// Text carried by a listener's panic payload.
fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| payload.downcast_ref::<&'static str>().copied())
        .unwrap_or("non-string panic payload")
}

#[cfg(test)]
mod tests;
