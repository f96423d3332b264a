//! Errors raised by [`Mux`](super::Mux) operations.

use std::{io, os::fd::RawFd};

use thiserror::Error;

/// Errors that may occur while registering sockets or serving them.
#[derive(Debug, Error)]
pub enum MuxError {
    /// The epoll instance could not be created.
    #[error("failed to create readiness context: {0}")]
    Create(#[source] io::Error),
    /// The readiness context could not be registered with the runtime.
    #[error("failed to register readiness context with the runtime: {0}")]
    Register(#[source] io::Error),
    /// Adding a socket to, or removing it from, the readiness set failed.
    #[error("failed to update readiness watch for fd {fd}: {source}")]
    Watch {
        /// Descriptor being watched or unwatched.
        fd: RawFd,
        /// Underlying OS error.
        #[source]
        source: io::Error,
    },
    /// Waiting for readiness failed with something other than `EINTR`.
    #[error("readiness wait failed: {0}")]
    Wait(#[source] io::Error),
}
