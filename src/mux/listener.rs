//! Message listeners registered with the multiplexer.

use std::fmt;

use crate::codec::Message;

/// Receives messages read from a watched socket.
///
/// Listeners form a stack per socket. Each decoded message is offered to the
/// most recently pushed listener first and moves down the stack until one
/// returns `true`.
///
/// Closures of the form `Fn(&Message) -> bool` are listeners too:
///
/// ```
/// use nlmux::{codec::Message, mux::Listener};
///
/// let only_links = |message: &Message| message.kind() == 16;
/// let listener: &dyn Listener = &only_links;
/// # let _ = listener;
/// ```
pub trait Listener: Send + Sync {
    /// Return `true` to claim `message` and stop the offer.
    ///
    /// Called on a dispatch task without any multiplexer lock held; a
    /// listener may push or remove listeners, including itself.
    fn claim(&self, message: &Message) -> bool;
}

impl<F> Listener for F
where
    F: Fn(&Message) -> bool + Send + Sync,
{
    fn claim(&self, message: &Message) -> bool { self(message) }
}

/// Handle naming one registration, returned by
/// [`Mux::push_listener`](super::Mux::push_listener).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(pub(super) u64);

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "listener#{}", self.0) }
}
