//! Thin wrapper over a Linux epoll instance.

use std::{
    io,
    os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd},
};

const READABLE: u32 = libc::EPOLLIN.unsigned_abs();
const HANGUP: u32 = libc::EPOLLHUP.unsigned_abs() | libc::EPOLLERR.unsigned_abs();

/// A descriptor reported by [`Poller::poll`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(super) struct Ready {
    pub(super) fd: RawFd,
    /// The peer hung up or the socket has a pending error.
    pub(super) hung_up: bool,
}

#[derive(Debug)]
pub(super) struct Poller {
    epoll: OwnedFd,
}

impl Poller {
    pub(super) fn new() -> io::Result<Self> {
        // SAFETY: epoll_create1 takes no pointers.
        let raw = unsafe { libc::epoll_create1(libc::EPOLL_CLOEXEC) };
        if raw < 0 {
            return Err(io::Error::last_os_error());
        }
        // SAFETY: `raw` was just returned by epoll_create1 and is not owned elsewhere.
        let epoll = unsafe { OwnedFd::from_raw_fd(raw) };
        Ok(Self { epoll })
    }

    /// Start reporting readability of `fd`. Already watched is not an error.
    pub(super) fn watch(&self, fd: RawFd) -> io::Result<()> {
        let mut event = libc::epoll_event {
            events: READABLE,
            u64: token(fd),
        };
        // SAFETY: `event` is a valid epoll_event for the duration of the call.
        let rc = unsafe { libc::epoll_ctl(self.epoll.as_raw_fd(), libc::EPOLL_CTL_ADD, fd, &raw mut event) };
        match rc {
            0 => Ok(()),
            _ => match io::Error::last_os_error() {
                e if e.raw_os_error() == Some(libc::EEXIST) => Ok(()),
                e => Err(e),
            },
        }
    }

    /// Stop reporting `fd`. Not being watched is not an error.
    pub(super) fn unwatch(&self, fd: RawFd) -> io::Result<()> {
        // SAFETY: EPOLL_CTL_DEL ignores the event pointer, which may be null.
        let rc = unsafe { libc::epoll_ctl(self.epoll.as_raw_fd(), libc::EPOLL_CTL_DEL, fd, std::ptr::null_mut()) };
        match rc {
            0 => Ok(()),
            _ => match io::Error::last_os_error() {
                e if matches!(e.raw_os_error(), Some(libc::ENOENT | libc::EBADF)) => Ok(()),
                e => Err(e),
            },
        }
    }

    /// Collect ready descriptors into `ready` without blocking.
    ///
    /// Returns `WouldBlock` when nothing is ready so callers can clear
    /// readiness on the epoll descriptor itself.
    pub(super) fn poll(&self, events: &mut [libc::epoll_event], ready: &mut Vec<Ready>) -> io::Result<()> {
        let max = libc::c_int::try_from(events.len()).unwrap_or(libc::c_int::MAX);
        // SAFETY: `events` is writable for `max` entries.
        let rc = unsafe { libc::epoll_wait(self.epoll.as_raw_fd(), events.as_mut_ptr(), max, 0) };
        let count = usize::try_from(rc).map_err(|_| io::Error::last_os_error())?;
        if count == 0 {
            return Err(io::ErrorKind::WouldBlock.into());
        }
        ready.clear();
        ready.extend(events[..count].iter().filter_map(|event| {
            let (data, flags) = (event.u64, event.events);
            let fd = RawFd::try_from(data).ok()?;
            Some(Ready {
                fd,
                hung_up: flags & HANGUP != 0,
            })
        }));
        Ok(())
    }
}

impl AsRawFd for Poller {
    fn as_raw_fd(&self) -> RawFd { self.epoll.as_raw_fd() }
}

#[expect(clippy::cast_sign_loss, reason = "descriptors are non-negative")]
fn token(fd: RawFd) -> u64 { fd as u64 }
