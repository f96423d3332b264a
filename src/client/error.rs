//! Error types for netlink client calls.

use std::io;

use crate::{
    codec::{CodecError, Message},
    mux::MuxError,
};

/// Errors emitted by [`Client::call`](super::Client::call).
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Sending the request failed.
    #[error("transport error: {0}")]
    Io(#[from] io::Error),
    /// The kernel answered with a non-zero status.
    #[error("kernel rejected request: {source}")]
    Kernel {
        /// Decoded errno.
        #[source]
        source: io::Error,
        /// Data replies received before the error, in arrival order.
        replies: Vec<Message>,
    },
    /// A status reply was too short to decode.
    #[error("malformed status reply: {0}")]
    Codec(#[from] CodecError),
    /// The reply listener could not be registered.
    #[error("failed to register reply listener: {0}")]
    Mux(#[from] MuxError),
    /// The reply stream ended before a terminal message, for example because
    /// the listener was removed from the multiplexer.
    #[error("reply stream ended without a terminal message")]
    Disconnected,
}

impl ClientError {
    /// Errno carried by a kernel or transport error.
    #[must_use]
    pub fn raw_os_error(&self) -> Option<i32> {
        match self {
            Self::Io(source) | Self::Kernel { source, .. } => source.raw_os_error(),
            Self::Codec(_) | Self::Mux(_) | Self::Disconnected => None,
        }
    }

    /// Replies that arrived before a kernel error; empty otherwise.
    #[must_use]
    pub fn replies(&self) -> &[Message] {
        match self {
            Self::Kernel { replies, .. } => replies,
            _ => &[],
        }
    }
}
