//! Type-length-value attributes (`nlattr`).
//!
//! Outbound attributes are built from [`Attr`] values whose payload is any
//! [`Encode`] implementation; an [`AttrList`] payload nests a further level of
//! attributes. Inbound attributes are walked with [`AttrIter`], which yields
//! [`RawAttr`] views over the received bytes.
//!
//! The length stored on the wire excludes padding; every attribute still
//! starts on a four-byte boundary, so encoders zero-fill and decoders skip up
//! to [`align4`] of the stored length.

use std::{borrow::Cow, fmt};

use bytes::{Buf, Bytes};

use super::{
    ATTR_HEADER_LEN,
    CodecError,
    NLA_F_NESTED,
    NLA_F_NET_BYTEORDER,
    NLA_TYPE_MASK,
    align4,
    reserve,
    take,
};
use crate::byte_order::{
    read_native_u16,
    read_native_u32,
    read_native_u64,
    read_network_u16,
    read_network_u32,
    read_network_u64,
    write_native_u16,
    write_native_u32,
    write_native_u64,
    write_network_u16,
    write_network_u32,
    write_network_u64,
};

/// A value that knows its encoded size and how to write itself.
pub trait Encode: fmt::Debug + Send + Sync {
    /// Number of bytes [`encode`](Self::encode) writes.
    fn encoded_len(&self) -> usize;

    /// Write the value into the front of `buf`, returning the bytes written.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::ShortBuffer`] if `buf` is smaller than
    /// [`encoded_len`](Self::encoded_len).
    fn encode(&self, buf: &mut [u8]) -> Result<usize, CodecError>;

    /// Flag bits this value contributes to an enclosing attribute's type.
    ///
    /// Nested lists report `NLA_F_NESTED` and big-endian integers report
    /// `NLA_F_NET_BYTEORDER`; plain values report nothing.
    fn type_flags(&self) -> u16 { 0 }
}

macro_rules! native_int {
    ($ty:ty, $write:ident) => {
        impl Encode for $ty {
            fn encoded_len(&self) -> usize { size_of::<$ty>() }

            fn encode(&self, buf: &mut [u8]) -> Result<usize, CodecError> {
                let bytes = $write(*self);
                reserve(buf, bytes.len())?.copy_from_slice(&bytes);
                Ok(bytes.len())
            }
        }
    };
}

native_int!(u16, write_native_u16);
native_int!(u32, write_native_u32);
native_int!(u64, write_native_u64);

impl Encode for u8 {
    fn encoded_len(&self) -> usize { 1 }

    fn encode(&self, buf: &mut [u8]) -> Result<usize, CodecError> {
        reserve(buf, 1)?[0] = *self;
        Ok(1)
    }
}

macro_rules! network_int {
    ($(#[$meta:meta])* $name:ident, $ty:ty, $write:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq)]
        pub struct $name(pub $ty);

        impl Encode for $name {
            fn encoded_len(&self) -> usize { size_of::<$ty>() }

            fn encode(&self, buf: &mut [u8]) -> Result<usize, CodecError> {
                let bytes = $write(self.0);
                reserve(buf, bytes.len())?.copy_from_slice(&bytes);
                Ok(bytes.len())
            }

            fn type_flags(&self) -> u16 { NLA_F_NET_BYTEORDER }
        }
    };
}

network_int!(
    /// `u16` encoded big-endian; marks its attribute `NLA_F_NET_BYTEORDER`.
    Be16,
    u16,
    write_network_u16
);
network_int!(
    /// `u32` encoded big-endian; marks its attribute `NLA_F_NET_BYTEORDER`.
    Be32,
    u32,
    write_network_u32
);
network_int!(
    /// `u64` encoded big-endian; marks its attribute `NLA_F_NET_BYTEORDER`.
    Be64,
    u64,
    write_network_u64
);

fn encode_cstr(s: &str, buf: &mut [u8]) -> Result<usize, CodecError> {
    let out = reserve(buf, s.len() + 1)?;
    out[..s.len()].copy_from_slice(s.as_bytes());
    out[s.len()] = 0;
    Ok(s.len() + 1)
}

impl Encode for String {
    fn encoded_len(&self) -> usize { self.len() + 1 }

    fn encode(&self, buf: &mut [u8]) -> Result<usize, CodecError> { encode_cstr(self, buf) }
}

impl Encode for Cow<'static, str> {
    fn encoded_len(&self) -> usize { self.len() + 1 }

    fn encode(&self, buf: &mut [u8]) -> Result<usize, CodecError> { encode_cstr(self, buf) }
}

/// Attributes own their values, so only `'static` strings are stored
/// borrowed; convert runtime names with `String::from` or [`Cow::Owned`].
impl Encode for &'static str {
    fn encoded_len(&self) -> usize { self.len() + 1 }

    fn encode(&self, buf: &mut [u8]) -> Result<usize, CodecError> { encode_cstr(self, buf) }
}

/// Raw payloads are written verbatim, without a terminator.
impl Encode for Bytes {
    fn encoded_len(&self) -> usize { self.len() }

    fn encode(&self, buf: &mut [u8]) -> Result<usize, CodecError> {
        reserve(buf, self.len())?.copy_from_slice(self);
        Ok(self.len())
    }
}

/// An outbound attribute.
///
/// # Examples
///
/// ```
/// use nlmux::codec::{Attr, AttrList, Encode, NLA_F_NESTED};
///
/// let link = Attr::new(
///     1,
///     AttrList::from(vec![Attr::new(2, 0x789a_u32), Attr::new(4, "gtp5g0")]),
/// );
/// let mut buf = vec![0u8; link.encoded_len()];
/// link.encode(&mut buf).expect("encode");
/// let kind = u16::from_ne_bytes([buf[2], buf[3]]);
/// assert_eq!(kind, 1 | NLA_F_NESTED);
/// ```
#[derive(Debug)]
pub struct Attr {
    kind: u16,
    value: Option<Box<dyn Encode>>,
}

impl Attr {
    /// Create an attribute carrying `value`.
    ///
    /// Reserved flag bits in `kind` are ignored; the nested and
    /// network-byte-order flags are derived from the value.
    pub fn new(kind: u16, value: impl Encode + 'static) -> Self {
        Self {
            kind,
            value: Some(Box::new(value)),
        }
    }

    /// Create an attribute with no payload, such as a boolean flag.
    #[must_use]
    pub fn empty(kind: u16) -> Self { Self { kind, value: None } }

    /// Attribute type without flag bits.
    #[must_use]
    pub fn kind(&self) -> u16 { self.kind & NLA_TYPE_MASK }

    /// Report whether the attribute encodes with `NLA_F_NESTED`.
    #[must_use]
    pub fn is_nested(&self) -> bool { self.wire_kind() & NLA_F_NESTED != 0 }

    /// Header plus value, excluding padding.
    fn unpadded_len(&self) -> usize {
        ATTR_HEADER_LEN + self.value.as_ref().map_or(0, |v| v.encoded_len())
    }

    fn wire_kind(&self) -> u16 {
        let flags = self.value.as_ref().map_or(0, |v| v.type_flags());
        (self.kind & NLA_TYPE_MASK) | (flags & !NLA_TYPE_MASK)
    }
}

impl Encode for Attr {
    fn encoded_len(&self) -> usize { align4(self.unpadded_len()) }

    fn encode(&self, buf: &mut [u8]) -> Result<usize, CodecError> {
        let unpadded = self.unpadded_len();
        let len = u16::try_from(unpadded).map_err(|_| CodecError::AttrTooLong { len: unpadded })?;
        let total = align4(unpadded);
        let out = reserve(buf, total)?;
        out[0..2].copy_from_slice(&write_native_u16(len));
        out[2..4].copy_from_slice(&write_native_u16(self.wire_kind()));
        if let Some(value) = &self.value {
            value.encode(&mut out[ATTR_HEADER_LEN..unpadded])?;
        }
        out[unpadded..].fill(0);
        Ok(total)
    }

    fn type_flags(&self) -> u16 { NLA_F_NESTED }
}

/// Ordered list of attributes; as a value it nests one level deeper.
#[derive(Debug, Default)]
pub struct AttrList(Vec<Attr>);

impl AttrList {
    /// Create an empty list.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Append an attribute, builder style.
    #[must_use]
    pub fn with(mut self, attr: Attr) -> Self {
        self.0.push(attr);
        self
    }

    /// Append an attribute.
    pub fn push(&mut self, attr: Attr) { self.0.push(attr); }

    /// Number of attributes in the list.
    #[must_use]
    pub fn len(&self) -> usize { self.0.len() }

    /// Report whether the list holds no attributes.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.0.is_empty() }

    /// Iterate the attributes in order.
    pub fn iter(&self) -> std::slice::Iter<'_, Attr> { self.0.iter() }
}

impl<'a> IntoIterator for &'a AttrList {
    type Item = &'a Attr;
    type IntoIter = std::slice::Iter<'a, Attr>;

    fn into_iter(self) -> Self::IntoIter { self.0.iter() }
}

impl From<Vec<Attr>> for AttrList {
    fn from(attrs: Vec<Attr>) -> Self { Self(attrs) }
}

impl FromIterator<Attr> for AttrList {
    fn from_iter<I: IntoIterator<Item = Attr>>(iter: I) -> Self { Self(iter.into_iter().collect()) }
}

impl Encode for AttrList {
    fn encoded_len(&self) -> usize { self.0.iter().map(Encode::encoded_len).sum() }

    fn encode(&self, buf: &mut [u8]) -> Result<usize, CodecError> {
        let out = reserve(buf, self.encoded_len())?;
        let mut offset = 0;
        for attr in &self.0 {
            offset += attr.encode(&mut out[offset..])?;
        }
        Ok(offset)
    }

    fn type_flags(&self) -> u16 { NLA_F_NESTED }
}

/// Fixed attribute header as found on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct AttrHeader {
    /// Header plus value length, excluding padding.
    pub len: u16,
    /// Attribute type including flag bits.
    pub kind: u16,
}

impl AttrHeader {
    /// Decode an attribute header from the front of `bytes`.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Truncated`] if fewer than four bytes remain.
    pub fn decode(bytes: &[u8]) -> Result<(Self, usize), CodecError> {
        let raw: [u8; ATTR_HEADER_LEN] = take(bytes)?;
        let header = Self {
            len: read_native_u16([raw[0], raw[1]]),
            kind: read_native_u16([raw[2], raw[3]]),
        };
        Ok((header, ATTR_HEADER_LEN))
    }

    /// Attribute type with the reserved flag bits stripped.
    #[must_use]
    pub fn masked_kind(&self) -> u16 { self.kind & NLA_TYPE_MASK }

    /// Report whether the value is a nested attribute list.
    #[must_use]
    pub fn is_nested(&self) -> bool { self.kind & NLA_F_NESTED != 0 }

    /// Report whether integer values are in network byte order.
    #[must_use]
    pub fn is_net_byteorder(&self) -> bool { self.kind & NLA_F_NET_BYTEORDER != 0 }

    /// On-wire footprint including padding.
    #[must_use]
    pub fn aligned_len(&self) -> usize { align4(usize::from(self.len)) }
}

/// A received attribute: header plus a view of its value bytes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawAttr {
    /// Header as received.
    pub header: AttrHeader,
    /// Value bytes, padding excluded.
    pub value: Bytes,
}

impl RawAttr {
    /// Attribute type with flag bits stripped.
    #[must_use]
    pub fn kind(&self) -> u16 { self.header.masked_kind() }

    /// Decode the value as a `u8`.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Truncated`] if the value is empty.
    pub fn u8(&self) -> Result<u8, CodecError> { decode_u8(&self.value).map(|(v, _)| v) }

    /// Decode the value as a `u16`, honouring `NLA_F_NET_BYTEORDER`.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Truncated`] if the value is too short.
    pub fn u16(&self) -> Result<u16, CodecError> {
        if self.header.is_net_byteorder() {
            take(&self.value).map(read_network_u16)
        } else {
            decode_u16(&self.value).map(|(v, _)| v)
        }
    }

    /// Decode the value as a `u32`, honouring `NLA_F_NET_BYTEORDER`.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Truncated`] if the value is too short.
    pub fn u32(&self) -> Result<u32, CodecError> {
        if self.header.is_net_byteorder() {
            take(&self.value).map(read_network_u32)
        } else {
            decode_u32(&self.value).map(|(v, _)| v)
        }
    }

    /// Decode the value as a `u64`, honouring `NLA_F_NET_BYTEORDER`.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Truncated`] if the value is too short.
    pub fn u64(&self) -> Result<u64, CodecError> {
        if self.header.is_net_byteorder() {
            take(&self.value).map(read_network_u64)
        } else {
            decode_u64(&self.value).map(|(v, _)| v)
        }
    }

    /// Decode the value as a string; see [`decode_string`].
    #[must_use]
    pub fn string(&self) -> String { decode_string(&self.value).0 }

    /// Iterate the attributes nested inside this one.
    #[must_use]
    pub fn nested(&self) -> AttrIter { AttrIter::new(self.value.clone()) }
}

/// Iterator over sibling attributes in a buffer.
///
/// Padding between attributes is skipped. Iteration stops after the first
/// malformed header.
#[derive(Debug)]
pub struct AttrIter {
    remaining: Bytes,
}

impl AttrIter {
    /// Iterate the attributes packed in `bytes`.
    #[must_use]
    pub fn new(bytes: Bytes) -> Self { Self { remaining: bytes } }

    fn fail(&mut self, error: CodecError) -> Option<Result<RawAttr, CodecError>> {
        self.remaining.clear();
        Some(Err(error))
    }
}

impl Iterator for AttrIter {
    type Item = Result<RawAttr, CodecError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining.is_empty() {
            return None;
        }
        let (header, consumed) = match AttrHeader::decode(&self.remaining) {
            Ok(decoded) => decoded,
            Err(e) => return self.fail(e),
        };
        let len = usize::from(header.len);
        if len < consumed || len > self.remaining.len() {
            let available = self.remaining.len();
            return self.fail(CodecError::InvalidLength { len, available });
        }
        let value = self.remaining.slice(consumed..len);
        let step = header.aligned_len().min(self.remaining.len());
        self.remaining.advance(step);
        Some(Ok(RawAttr { header, value }))
    }
}

/// Decode a `u8` value.
///
/// # Errors
///
/// Returns [`CodecError::Truncated`] if `bytes` is empty.
pub fn decode_u8(bytes: &[u8]) -> Result<(u8, usize), CodecError> {
    take::<1>(bytes).map(|[b]| (b, 1))
}

/// Decode a host-order `u16` value.
///
/// # Errors
///
/// Returns [`CodecError::Truncated`] if fewer than two bytes remain.
pub fn decode_u16(bytes: &[u8]) -> Result<(u16, usize), CodecError> {
    take(bytes).map(|raw| (read_native_u16(raw), 2))
}

/// Decode a host-order `u32` value.
///
/// # Errors
///
/// Returns [`CodecError::Truncated`] if fewer than four bytes remain.
pub fn decode_u32(bytes: &[u8]) -> Result<(u32, usize), CodecError> {
    take(bytes).map(|raw| (read_native_u32(raw), 4))
}

/// Decode a host-order `u64` value.
///
/// # Errors
///
/// Returns [`CodecError::Truncated`] if fewer than eight bytes remain.
pub fn decode_u64(bytes: &[u8]) -> Result<(u64, usize), CodecError> {
    take(bytes).map(|raw| (read_native_u64(raw), 8))
}

/// Decode a NUL-terminated string value.
///
/// Returns the string and the bytes consumed including the terminator. A
/// value without a terminator runs to the end of `bytes`; the final
/// attribute of some kernel replies is laid out that way.
///
/// ```
/// use nlmux::codec::decode_string;
///
/// assert_eq!(decode_string(b"gtp5g0\0\0"), ("gtp5g0".to_string(), 7));
/// assert_eq!(decode_string(b"eth0"), ("eth0".to_string(), 4));
/// ```
#[must_use]
pub fn decode_string(bytes: &[u8]) -> (String, usize) {
    match bytes.iter().position(|&b| b == 0) {
        Some(end) => (String::from_utf8_lossy(&bytes[..end]).into_owned(), end + 1),
        None => (String::from_utf8_lossy(bytes).into_owned(), bytes.len()),
    }
}
