//! Fixed netlink message header (`nlmsghdr`).

use super::{CodecError, HEADER_LEN, reserve, take};
use crate::byte_order::{read_native_u16, read_native_u32, write_native_u16, write_native_u32};

const HEADER_LEN_U32: u32 = 16;
const _: () = assert!(HEADER_LEN_U32 as usize == HEADER_LEN);

/// Header preceding every netlink message.
///
/// `len` covers the header itself plus the body, so a well-formed header
/// always declares at least [`HEADER_LEN`] bytes.
///
/// # Examples
///
/// ```
/// use nlmux::codec::{HEADER_LEN, Header};
///
/// let mut header = Header::new(20, 0);
/// header.seq = 7;
/// let bytes = header.to_bytes();
/// let (decoded, consumed) = Header::decode(&bytes).expect("decode header");
/// assert_eq!(decoded, header);
/// assert_eq!(consumed, HEADER_LEN);
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Header {
    /// Total message length in bytes, header included.
    pub len: u32,
    /// Message type.
    pub kind: u16,
    /// Flag bits (`NLM_F_*`).
    pub flags: u16,
    /// Sequence number used to correlate replies.
    pub seq: u32,
    /// Port id of the sender; zero for the kernel's multicast notifications.
    pub pid: u32,
}

impl Header {
    /// Create a header declaring no body.
    #[must_use]
    pub const fn new(kind: u16, flags: u16) -> Self {
        Self {
            len: HEADER_LEN_U32,
            kind,
            flags,
            seq: 0,
            pid: 0,
        }
    }

    /// Decode a header from the front of `bytes`.
    ///
    /// Returns the header and the number of bytes consumed, which is always
    /// [`HEADER_LEN`].
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Truncated`] if fewer than [`HEADER_LEN`] bytes
    /// are available.
    pub fn decode(bytes: &[u8]) -> Result<(Self, usize), CodecError> {
        let raw: [u8; HEADER_LEN] = take(bytes)?;
        let header = Self {
            len: read_native_u32(take(&raw[0..])?),
            kind: read_native_u16(take(&raw[4..])?),
            flags: read_native_u16(take(&raw[6..])?),
            seq: read_native_u32(take(&raw[8..])?),
            pid: read_native_u32(take(&raw[12..])?),
        };
        Ok((header, HEADER_LEN))
    }

    /// Encode the header into the front of `buf`.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::ShortBuffer`] if `buf` holds fewer than
    /// [`HEADER_LEN`] bytes.
    pub fn encode(&self, buf: &mut [u8]) -> Result<usize, CodecError> {
        let out = reserve(buf, HEADER_LEN)?;
        out.copy_from_slice(&self.to_bytes());
        Ok(HEADER_LEN)
    }

    /// Return the wire representation of the header.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; HEADER_LEN] {
        let mut out = [0u8; HEADER_LEN];
        out[0..4].copy_from_slice(&write_native_u32(self.len));
        out[4..6].copy_from_slice(&write_native_u16(self.kind));
        out[6..8].copy_from_slice(&write_native_u16(self.flags));
        out[8..12].copy_from_slice(&write_native_u32(self.seq));
        out[12..16].copy_from_slice(&write_native_u32(self.pid));
        out
    }

    /// Report whether every bit in `flags` is set.
    #[must_use]
    pub const fn has_flags(&self, flags: u16) -> bool { self.flags & flags == flags }
}
