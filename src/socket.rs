//! Socket capabilities consumed by the multiplexer and client.
//!
//! The core only needs a handful of operations from a socket: a stable
//! descriptor, a non-blocking receive, an atomic scatter-gather send and a
//! sequence counter. [`Socket`] and [`Connection`] capture those operations;
//! [`NetlinkSocket`] implements them over a Linux `AF_NETLINK` socket.

use std::{
    ffi::CString,
    io::{self, IoSlice},
    mem,
    os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd},
    sync::atomic::{AtomicU32, Ordering},
};

/// Routing and link configuration (`NETLINK_ROUTE`).
pub const NETLINK_ROUTE: i32 = libc::NETLINK_ROUTE;
/// Netfilter subsystem (`NETLINK_NETFILTER`).
pub const NETLINK_NETFILTER: i32 = libc::NETLINK_NETFILTER;
/// Generic netlink (`NETLINK_GENERIC`).
pub const NETLINK_GENERIC: i32 = libc::NETLINK_GENERIC;

const SOCKADDR_NL_LEN: libc::socklen_t = 12;
const _: () = assert!(mem::size_of::<libc::sockaddr_nl>() == SOCKADDR_NL_LEN as usize);

/// Readable socket watched by the multiplexer.
pub trait Socket: Send + Sync {
    /// Descriptor identifying the socket; stable for its lifetime.
    fn fd(&self) -> RawFd;

    /// Receive one datagram into `buf` without blocking.
    ///
    /// # Errors
    ///
    /// Returns the OS error, including `WouldBlock` when nothing is queued.
    fn recv(&self, buf: &mut [u8]) -> io::Result<usize>;
}

/// Socket able to issue requests.
pub trait Connection: Socket {
    /// Send all `segments` as one datagram.
    ///
    /// # Errors
    ///
    /// Returns the OS error if the send fails.
    fn send_segments(&self, segments: &[IoSlice<'_>]) -> io::Result<usize>;

    /// Allocate the next sequence number.
    ///
    /// Numbers must be unique among exchanges still outstanding on this
    /// connection, even when called from several tasks at once.
    fn next_sequence(&self) -> u32;
}

/// Sequence numbers starting at 1, safe to share between tasks.
#[derive(Debug)]
pub struct SequenceCounter(AtomicU32);

impl SequenceCounter {
    /// Create a counter whose first value is 1.
    #[must_use]
    pub fn new() -> Self { Self(AtomicU32::new(1)) }

    /// Return the next value.
    ///
    /// Relaxed ordering suffices: only uniqueness of the returned values is
    /// required, and `fetch_add` is atomic under any ordering.
    pub fn next(&self) -> u32 { self.0.fetch_add(1, Ordering::Relaxed) }
}

impl Default for SequenceCounter {
    fn default() -> Self { Self::new() }
}

/// A bound `AF_NETLINK` socket.
///
/// # Examples
///
/// ```no_run
/// use nlmux::socket::{NETLINK_ROUTE, NetlinkSocket};
///
/// // Subscribe to RTNLGRP_LINK notifications.
/// let socket = NetlinkSocket::open(NETLINK_ROUTE, &[1])?;
/// # Ok::<(), std::io::Error>(())
/// ```
#[derive(Debug)]
pub struct NetlinkSocket {
    fd: OwnedFd,
    seq: SequenceCounter,
}

impl NetlinkSocket {
    /// Open a socket for `protocol` and join the multicast `groups`.
    ///
    /// Group numbers start at 1, matching the kernel's `RTNLGRP_*` style
    /// constants.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for a group outside `1..=32`, otherwise the OS
    /// error from `socket(2)` or `bind(2)`.
    pub fn open(protocol: i32, groups: &[u32]) -> io::Result<Self> {
        let mask = group_mask(groups)?;
        // SAFETY: socket(2) takes no pointers; a non-negative result is a
        // fresh descriptor owned by nothing else.
        let raw = unsafe { libc::socket(libc::AF_NETLINK, libc::SOCK_RAW | libc::SOCK_CLOEXEC, protocol) };
        if raw < 0 {
            return Err(io::Error::last_os_error());
        }
        // SAFETY: `raw` was just returned by socket(2) and is not owned elsewhere.
        let fd = unsafe { OwnedFd::from_raw_fd(raw) };

        let mut addr = empty_addr();
        addr.nl_groups = mask;
        // SAFETY: `addr` is a valid sockaddr_nl and the length matches its size.
        let rc = unsafe {
            libc::bind(
                fd.as_raw_fd(),
                (&raw const addr).cast::<libc::sockaddr>(),
                SOCKADDR_NL_LEN,
            )
        };
        if rc < 0 {
            return Err(io::Error::last_os_error());
        }
        log::debug!("opened netlink socket: fd={raw}, protocol={protocol}, groups={mask:#x}");
        Ok(Self {
            fd,
            seq: SequenceCounter::new(),
        })
    }

    /// Port id the kernel assigned to this socket.
    ///
    /// # Errors
    ///
    /// Returns the OS error from `getsockname(2)`.
    pub fn local_port(&self) -> io::Result<u32> {
        let mut addr = empty_addr();
        let mut len = SOCKADDR_NL_LEN;
        // SAFETY: `addr` and `len` describe a writable sockaddr_nl.
        let rc = unsafe {
            libc::getsockname(
                self.fd.as_raw_fd(),
                (&raw mut addr).cast::<libc::sockaddr>(),
                &raw mut len,
            )
        };
        if rc < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(addr.nl_pid)
    }
}

impl Socket for NetlinkSocket {
    fn fd(&self) -> RawFd { self.fd.as_raw_fd() }

    fn recv(&self, buf: &mut [u8]) -> io::Result<usize> {
        let mut from = empty_addr();
        let mut len = SOCKADDR_NL_LEN;
        // SAFETY: `buf` is writable for its length and `from`/`len` describe a
        // writable sockaddr_nl.
        let rc = unsafe {
            libc::recvfrom(
                self.fd.as_raw_fd(),
                buf.as_mut_ptr().cast::<libc::c_void>(),
                buf.len(),
                libc::MSG_DONTWAIT,
                (&raw mut from).cast::<libc::sockaddr>(),
                &raw mut len,
            )
        };
        let n = cvt(rc)?;
        if i32::from(from.nl_family) != libc::AF_NETLINK {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("datagram from non-netlink address family {family}", family = from.nl_family),
            ));
        }
        Ok(n)
    }
}

impl Connection for NetlinkSocket {
    fn send_segments(&self, segments: &[IoSlice<'_>]) -> io::Result<usize> {
        let mut kernel = empty_addr();
        // SAFETY: msghdr is plain data; every field the kernel reads is set
        // below and the rest stay zeroed.
        let mut msg: libc::msghdr = unsafe { mem::zeroed() };
        msg.msg_name = (&raw mut kernel).cast::<libc::c_void>();
        msg.msg_namelen = SOCKADDR_NL_LEN;
        // IoSlice is ABI-compatible with iovec on unix.
        msg.msg_iov = segments.as_ptr().cast_mut().cast::<libc::iovec>();
        msg.msg_iovlen = segments.len() as _;
        // SAFETY: `msg` points at live segments and a sockaddr_nl for the
        // duration of the call; sendmsg does not write through them.
        let rc = unsafe { libc::sendmsg(self.fd.as_raw_fd(), &raw const msg, 0) };
        cvt(rc)
    }

    fn next_sequence(&self) -> u32 { self.seq.next() }
}

/// Resolve an interface name to its index.
///
/// # Errors
///
/// Returns `InvalidInput` if `name` contains a NUL byte, otherwise the OS
/// error when no interface carries the name.
pub fn interface_index(name: &str) -> io::Result<u32> {
    let name = CString::new(name).map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
    // SAFETY: `name` is a valid NUL-terminated string for the call.
    let index = unsafe { libc::if_nametoindex(name.as_ptr()) };
    if index == 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(index)
}

fn empty_addr() -> libc::sockaddr_nl {
    // SAFETY: sockaddr_nl is plain data for which all-zero is valid.
    let mut addr: libc::sockaddr_nl = unsafe { mem::zeroed() };
    addr.nl_family = libc::sa_family_t::try_from(libc::AF_NETLINK).unwrap_or_default();
    addr
}

fn group_mask(groups: &[u32]) -> io::Result<u32> {
    groups.iter().try_fold(0u32, |mask, &group| match group {
        1..=32 => Ok(mask | (1 << (group - 1))),
        _ => Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("multicast group {group} outside 1..=32"),
        )),
    })
}

fn cvt(rc: isize) -> io::Result<usize> { usize::try_from(rc).map_err(|_| io::Error::last_os_error()) }

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(&[], 0)]
    #[case(&[1], 0b1)]
    #[case(&[1, 3], 0b101)]
    #[case(&[32], 1 << 31)]
    fn groups_map_to_bitmask(#[case] groups: &[u32], #[case] mask: u32) {
        assert_eq!(group_mask(groups).expect("valid groups"), mask);
    }

    #[rstest]
    #[case(0)]
    #[case(33)]
    fn out_of_range_groups_are_rejected(#[case] group: u32) {
        let err = group_mask(&[group]).expect_err("group is out of range");
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[test]
    fn sequence_counter_starts_at_one() {
        let counter = SequenceCounter::new();
        assert_eq!(counter.next(), 1);
        assert_eq!(counter.next(), 2);
    }

    #[test]
    fn loopback_has_an_index() {
        assert!(interface_index("lo").expect("loopback index") > 0);
        assert!(interface_index("no-such-if0").is_err());
        assert_eq!(
            interface_index("bad\0name").expect_err("nul in name").kind(),
            io::ErrorKind::InvalidInput
        );
    }

    #[test]
    fn route_socket_binds_and_allocates_sequences() {
        let socket = NetlinkSocket::open(NETLINK_ROUTE, &[]).expect("open route socket");
        assert!(socket.fd() >= 0);
        assert!(socket.local_port().expect("local port") > 0);
        assert_eq!(socket.next_sequence(), 1);
        let mut buf = [0u8; 64];
        let err = socket.recv(&mut buf).expect_err("nothing queued");
        assert_eq!(err.kind(), io::ErrorKind::WouldBlock);
    }
}
