//! Outbound request builder.
//!
//! A [`Request`] is the header followed by an ordered list of encoded
//! segments, ready for a single scatter-gather send. It also records which
//! message types count as data replies so the client's correlation listener
//! can tell replies apart from unrelated traffic.

use std::{collections::HashSet, io::IoSlice};

use bytes::{Bytes, BytesMut};

use crate::codec::{CodecError, Encode, HEADER_LEN, Header, NLM_F_DUMP, NLM_F_REQUEST};

/// A netlink request under construction.
///
/// # Examples
///
/// ```
/// use nlmux::{
///     codec::{Attr, NLM_F_ACK},
///     request::Request,
/// };
///
/// let mut request = Request::new(16, NLM_F_ACK);
/// request.append(&Attr::new(3, "gtp5g0")).expect("append name");
/// request.commit(7);
/// assert_eq!(request.header().len, 28);
/// assert_eq!(request.header().seq, 7);
/// assert!(request.contains_reply_kind(16));
/// ```
#[derive(Clone, Debug)]
pub struct Request {
    header: Header,
    encoded_header: [u8; HEADER_LEN],
    segments: Vec<Bytes>,
    reply_kinds: HashSet<u16>,
}

impl Request {
    /// Start a request of type `kind`.
    ///
    /// `NLM_F_REQUEST` is always added to `flags`, and `kind` is registered as
    /// an acceptable reply type.
    #[must_use]
    pub fn new(kind: u16, flags: u16) -> Self {
        let header = Header::new(kind, NLM_F_REQUEST | flags);
        Self {
            header,
            encoded_header: header.to_bytes(),
            segments: Vec::new(),
            reply_kinds: HashSet::from([kind]),
        }
    }

    /// Encode `value` into a new segment and append it.
    ///
    /// # Errors
    ///
    /// Propagates the encoder's [`CodecError`], or returns
    /// [`CodecError::InvalidLength`] if the message would outgrow the 32-bit
    /// length field. The request is unchanged on error.
    pub fn append(&mut self, value: &impl Encode) -> Result<(), CodecError> {
        let mut buf = BytesMut::zeroed(value.encoded_len());
        value.encode(&mut buf)?;
        self.append_bytes(buf.freeze())
    }

    /// Append pre-encoded bytes, such as a fixed family header.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::InvalidLength`] if the message would outgrow the
    /// 32-bit length field.
    pub fn append_bytes(&mut self, bytes: impl Into<Bytes>) -> Result<(), CodecError> {
        let bytes = bytes.into();
        let total = self.header.len as usize + bytes.len();
        self.header.len = u32::try_from(total).map_err(|_| CodecError::InvalidLength {
            len: total,
            available: u32::MAX as usize,
        })?;
        self.encoded_header = self.header.to_bytes();
        self.segments.push(bytes);
        Ok(())
    }

    /// Accept replies of type `kind` in addition to the request's own type.
    pub fn append_reply_kind(&mut self, kind: u16) { self.reply_kinds.insert(kind); }

    /// Report whether `kind` counts as a data reply to this request.
    #[must_use]
    pub fn contains_reply_kind(&self, kind: u16) -> bool { self.reply_kinds.contains(&kind) }

    pub(crate) fn reply_kinds(&self) -> &HashSet<u16> { &self.reply_kinds }

    /// Stamp the sequence number allocated by the connection.
    ///
    /// Call once, immediately before the request is sent.
    pub fn commit(&mut self, seq: u32) {
        self.header.seq = seq;
        self.encoded_header = self.header.to_bytes();
    }

    /// Current header, reflecting appended segments and the committed sequence.
    #[must_use]
    pub fn header(&self) -> &Header { &self.header }

    /// Report whether the request asks for a multi-part dump.
    #[must_use]
    pub fn is_dump(&self) -> bool { self.header.flags & NLM_F_DUMP != 0 }

    /// Outbound segments: the header followed by every appended segment.
    #[must_use]
    pub fn io_slices(&self) -> Vec<IoSlice<'_>> {
        std::iter::once(IoSlice::new(&self.encoded_header))
            .chain(self.segments.iter().map(|segment| IoSlice::new(segment)))
            .collect()
    }

    /// Concatenate all segments into one buffer.
    #[must_use]
    pub fn to_bytes(&self) -> Bytes {
        let mut out = BytesMut::with_capacity(self.header.len as usize);
        out.extend_from_slice(&self.encoded_header);
        for segment in &self.segments {
            out.extend_from_slice(segment);
        }
        out.freeze()
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use rstest::rstest;

    use super::*;
    use crate::codec::{Attr, AttrList, Message, NLM_F_ACK, NLM_F_MATCH, NLM_F_ROOT};

    #[test]
    fn new_request_declares_header_only() {
        let request = Request::new(20, 0);
        assert_eq!(request.header().len as usize, HEADER_LEN);
        assert_eq!(request.header().flags, NLM_F_REQUEST);
        assert_eq!(request.io_slices().len(), 1);
        assert!(request.contains_reply_kind(20));
        assert!(!request.contains_reply_kind(21));
    }

    #[test]
    fn append_grows_length_and_segments() {
        let mut request = Request::new(20, NLM_F_ACK);
        request
            .append_bytes(Bytes::from_static(&[0; 4]))
            .expect("append family header");
        request
            .append(&Attr::new(1, AttrList::new().with(Attr::new(2, 7_u32))))
            .expect("append nested attribute");
        assert_eq!(request.header().len, 16 + 4 + 12);
        assert_eq!(request.io_slices().len(), 3);

        let total: usize = request.io_slices().iter().map(|s| s.len()).sum();
        assert_eq!(total, request.header().len as usize);
    }

    #[test]
    fn commit_is_reflected_in_the_header_segment() {
        let mut request = Request::new(20, 0);
        request.append(&Attr::new(1, 5_u8)).expect("append");
        request.commit(99);

        let (message, consumed) = Message::decode(&request.to_bytes()).expect("decode request");
        assert_eq!(consumed, request.header().len as usize);
        assert_eq!(message.header.seq, 99);
        let first = request.io_slices()[0].to_vec();
        assert_eq!(first, request.header().to_bytes());
    }

    #[test]
    fn reply_kinds_can_be_widened() {
        let mut request = Request::new(18, NLM_F_DUMP);
        request.append_reply_kind(16);
        assert!(request.contains_reply_kind(16));
        assert!(request.contains_reply_kind(18));
    }

    #[rstest]
    #[case::plain(0, false)]
    #[case::ack(NLM_F_ACK, false)]
    #[case::dump(NLM_F_DUMP, true)]
    #[case::root(NLM_F_ROOT, true)]
    #[case::matching(NLM_F_MATCH, true)]
    fn dump_detection(#[case] flags: u16, #[case] dump: bool) {
        assert_eq!(Request::new(20, flags).is_dump(), dump);
    }

    #[test]
    fn failed_append_leaves_request_unchanged() {
        let mut request = Request::new(20, 0);
        let err = request
            .append(&Attr::new(1, Bytes::from(vec![0u8; 70_000])))
            .expect_err("attribute too long");
        assert!(matches!(err, CodecError::AttrTooLong { .. }));
        assert_eq!(request.header().len as usize, HEADER_LEN);
        assert_eq!(request.io_slices().len(), 1);
    }
}
