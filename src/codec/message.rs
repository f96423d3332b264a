//! Whole netlink messages and the kernel's status replies.

use std::io;

use bytes::{Buf, Bytes, BytesMut};

use super::{AttrIter, CodecError, HEADER_LEN, Header, NLMSG_DONE, NLMSG_ERROR, take};

/// A decoded netlink message.
///
/// The body is a zero-copy view into the batch the message was decoded
/// from; the header's `len` field still describes the original framing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    /// Message header as received.
    pub header: Header,
    /// Bytes following the header, up to the declared length.
    pub body: Bytes,
}

impl Message {
    /// Build a message from a header and body, fixing up the declared length.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::InvalidLength`] if the body does not fit the
    /// 32-bit length field.
    pub fn new(mut header: Header, body: Bytes) -> Result<Self, CodecError> {
        let total = HEADER_LEN + body.len();
        header.len = u32::try_from(total).map_err(|_| CodecError::InvalidLength {
            len: total,
            available: total,
        })?;
        Ok(Self { header, body })
    }

    /// Decode one message from the front of `bytes`.
    ///
    /// Returns the message and the number of bytes it occupies, which is the
    /// length the sender declared in the header. Callers advance by that
    /// amount to reach the next message.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Truncated`] when fewer than [`HEADER_LEN`] bytes
    /// remain, and [`CodecError::InvalidLength`] when the declared length is
    /// shorter than the header or longer than the input.
    ///
    /// # Examples
    ///
    /// ```
    /// use bytes::Bytes;
    /// use nlmux::codec::{Header, Message};
    ///
    /// let msg = Message::new(Header::new(20, 0), Bytes::from_static(&[1, 2, 3, 4]))
    ///     .expect("build message");
    /// let (decoded, consumed) = Message::decode(&msg.to_bytes()).expect("decode");
    /// assert_eq!(consumed, 20);
    /// assert_eq!(decoded.body.as_ref(), &[1, 2, 3, 4]);
    /// ```
    pub fn decode(bytes: &Bytes) -> Result<(Self, usize), CodecError> {
        let (header, consumed) = Header::decode(bytes)?;
        let len = header.len as usize;
        if len < consumed || len > bytes.len() {
            return Err(CodecError::InvalidLength {
                len,
                available: bytes.len(),
            });
        }
        let body = bytes.slice(consumed..len);
        Ok((Self { header, body }, len))
    }

    /// Message type.
    #[must_use]
    pub fn kind(&self) -> u16 { self.header.kind }

    /// Sequence number.
    #[must_use]
    pub fn seq(&self) -> u32 { self.header.seq }

    /// Sender port id.
    #[must_use]
    pub fn pid(&self) -> u32 { self.header.pid }

    /// `true` for the `NLMSG_DONE` and `NLMSG_ERROR` sentinels.
    #[must_use]
    pub fn is_terminal(&self) -> bool { matches!(self.header.kind, NLMSG_DONE | NLMSG_ERROR) }

    /// Decode the status carried by a `NLMSG_DONE` or `NLMSG_ERROR` message.
    ///
    /// A `DONE` body too short to carry a status is a clean end of dump.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Truncated`] if an `ERROR` body is shorter than
    /// the four-byte status.
    pub fn status(&self) -> Result<Option<io::Error>, CodecError> {
        if self.header.kind == NLMSG_DONE && self.body.len() < 4 {
            return Ok(None);
        }
        decode_status(&self.body)
    }

    /// Iterate the attributes following a family header of `offset` bytes.
    ///
    /// Returns an empty iterator when the body is shorter than `offset`.
    #[must_use]
    pub fn attrs(&self, offset: usize) -> AttrIter {
        let start = offset.min(self.body.len());
        AttrIter::new(self.body.slice(start..))
    }

    /// Return the wire representation of the message.
    #[must_use]
    pub fn to_bytes(&self) -> Bytes {
        let mut out = BytesMut::with_capacity(HEADER_LEN + self.body.len());
        out.extend_from_slice(&self.header.to_bytes());
        out.extend_from_slice(&self.body);
        out.freeze()
    }
}

/// Iterator over the messages packed into one received batch.
///
/// Stops after the first decode error; the remainder of the batch cannot be
/// framed once one length is wrong.
#[derive(Debug)]
pub struct MessageIter {
    remaining: Bytes,
}

impl MessageIter {
    /// Iterate the messages in `batch`.
    #[must_use]
    pub fn new(batch: Bytes) -> Self { Self { remaining: batch } }
}

impl Iterator for MessageIter {
    type Item = Result<Message, CodecError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining.is_empty() {
            return None;
        }
        match Message::decode(&self.remaining) {
            Ok((message, consumed)) => {
                self.remaining.advance(consumed);
                Some(Ok(message))
            }
            Err(e) => {
                self.remaining.clear();
                Some(Err(e))
            }
        }
    }
}

/// Decode the signed status at the front of an error or done body.
///
/// Zero maps to `None`; a negative status `-e` maps to the OS error `e`.
///
/// # Errors
///
/// Returns [`CodecError::Truncated`] if `body` is shorter than four bytes.
///
/// # Examples
///
/// ```
/// use nlmux::codec::decode_status;
///
/// assert!(decode_status(&0i32.to_ne_bytes()).expect("status").is_none());
/// let err = decode_status(&(-2i32).to_ne_bytes())
///     .expect("status")
///     .expect("error");
/// assert_eq!(err.raw_os_error(), Some(2));
/// ```
pub fn decode_status(body: &[u8]) -> Result<Option<io::Error>, CodecError> {
    let status = i32::from_ne_bytes(take(body)?);
    Ok(errno(status))
}

fn errno(status: i32) -> Option<io::Error> {
    (status != 0).then(|| io::Error::from_raw_os_error(status.saturating_neg()))
}

/// Body of an `NLMSG_ERROR` message.
///
/// The kernel echoes the header of the request that failed after the status
/// so that replies can be matched even without sequence bookkeeping.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ErrorMessage {
    /// Signed status; zero is an acknowledgement, negative values are errnos.
    pub status: i32,
    /// Header of the offending request, when the kernel included it.
    pub request: Option<Header>,
}

impl ErrorMessage {
    /// Decode an error body.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Truncated`] if the status is missing.
    pub fn decode(body: &[u8]) -> Result<Self, CodecError> {
        let status = i32::from_ne_bytes(take(body)?);
        let request = Header::decode(&body[4..]).ok().map(|(header, _)| header);
        Ok(Self { status, request })
    }

    /// Convert the status into an OS error; `None` for acknowledgements.
    #[must_use]
    pub fn error(&self) -> Option<io::Error> { errno(self.status) }
}
