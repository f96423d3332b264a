//! Listener that routes one exchange's replies to the waiting call.

use std::{
    collections::HashSet,
    sync::{Mutex, PoisonError},
};

use tokio::sync::mpsc::UnboundedSender;

use crate::{
    codec::{Message, NLMSG_DONE, NLMSG_ERROR},
    mux::Listener,
    request::Request,
};

/// Claims messages answering a committed request and forwards them.
///
/// A message matches when its type is a sentinel or a registered reply type,
/// its sequence number is the request's and its sender pid is non-zero. The
/// delivery channel closes after a sentinel, or after the first data reply
/// unless the request is a dump; a closed correlator declines everything.
#[derive(Debug)]
pub(crate) struct Correlator {
    seq: u32,
    dump: bool,
    reply_kinds: HashSet<u16>,
    tx: Mutex<Option<UnboundedSender<Message>>>,
}

impl Correlator {
    /// Build a correlator for `request`, which must already be committed.
    pub(crate) fn new(request: &Request, tx: UnboundedSender<Message>) -> Self {
        Self {
            seq: request.header().seq,
            dump: request.is_dump(),
            reply_kinds: request.reply_kinds().clone(),
            tx: Mutex::new(Some(tx)),
        }
    }

    fn matches(&self, message: &Message) -> bool {
        let kind = message.kind();
        (kind == NLMSG_DONE || kind == NLMSG_ERROR || self.reply_kinds.contains(&kind))
            && message.seq() == self.seq
            && message.pid() != 0
    }

    #[cfg(test)]
    pub(crate) fn is_closed(&self) -> bool {
        self.tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }
}

impl Listener for Correlator {
    fn claim(&self, message: &Message) -> bool {
        if !self.matches(message) {
            return false;
        }
        let mut tx = self.tx.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(sender) = tx.as_ref() else {
            return false;
        };
        if sender.send(message.clone()).is_err() {
            *tx = None;
            return false;
        }
        if message.is_terminal() || !self.dump {
            *tx = None;
        }
        true
    }
}
