//! Netlink wire codec.
//!
//! Every netlink message starts with a fixed 16-byte [`Header`] followed by a
//! family-specific body. Bodies usually end in a sequence of type-length-value
//! attributes ([`Attr`] on the way out, [`RawAttr`] on the way in) which may
//! nest arbitrarily deep. All fixed-width fields use host byte order unless an
//! attribute carries the `NLA_F_NET_BYTEORDER` flag.
//!
//! # Error Handling
//!
//! Decoding fails with [`CodecError::Truncated`] when fewer bytes remain than
//! a fixed-width field needs, and encoding fails with
//! [`CodecError::ShortBuffer`] when the destination cannot hold the encoded
//! form. Neither is retried; the caller decides whether to drop the frame.

pub mod attr;
pub mod error;
pub mod header;
pub mod message;

pub use attr::{
    Attr,
    AttrHeader,
    AttrIter,
    AttrList,
    Be16,
    Be32,
    Be64,
    Encode,
    RawAttr,
    decode_string,
    decode_u8,
    decode_u16,
    decode_u32,
    decode_u64,
};
pub use error::CodecError;
pub use header::Header;
pub use message::{ErrorMessage, Message, MessageIter, decode_status};

/// Size of the fixed message header (`nlmsghdr`).
pub const HEADER_LEN: usize = 16;

/// Size of the fixed attribute header (`nlattr`).
pub const ATTR_HEADER_LEN: usize = 4;

/// No-op message; carries nothing and is ignored by the kernel.
pub const NLMSG_NOOP: u16 = 1;
/// Error or acknowledgement message; the body starts with a signed status.
pub const NLMSG_ERROR: u16 = 2;
/// End of a multi-part reply.
pub const NLMSG_DONE: u16 = 3;
/// Data lost because the receive buffer overflowed.
pub const NLMSG_OVERRUN: u16 = 4;

/// Set on every request sent to the kernel.
pub const NLM_F_REQUEST: u16 = 0x1;
/// Set on replies that are one part of a multi-part response.
pub const NLM_F_MULTI: u16 = 0x2;
/// Request an acknowledgement on success.
pub const NLM_F_ACK: u16 = 0x4;
/// Echo the request back to the sender.
pub const NLM_F_ECHO: u16 = 0x8;
/// The dump was interrupted and may be inconsistent.
pub const NLM_F_DUMP_INTR: u16 = 0x10;
/// Return the complete table instead of a single entry.
pub const NLM_F_ROOT: u16 = 0x100;
/// Return all entries matching the request criteria.
pub const NLM_F_MATCH: u16 = 0x200;
/// Return an atomic snapshot of the table.
pub const NLM_F_ATOMIC: u16 = 0x400;
/// Request a multi-part dump.
pub const NLM_F_DUMP: u16 = NLM_F_ROOT | NLM_F_MATCH;
/// Replace an existing object.
pub const NLM_F_REPLACE: u16 = 0x100;
/// Do not touch the object if it already exists.
pub const NLM_F_EXCL: u16 = 0x200;
/// Create the object if it does not exist.
pub const NLM_F_CREATE: u16 = 0x400;
/// Add to the end of the object list.
pub const NLM_F_APPEND: u16 = 0x800;

/// Attribute carries a nested attribute list.
pub const NLA_F_NESTED: u16 = 0x8000;
/// Attribute payload is in network byte order.
pub const NLA_F_NET_BYTEORDER: u16 = 0x4000;
/// Mask stripping the reserved flag bits from an attribute type.
pub const NLA_TYPE_MASK: u16 = !(NLA_F_NESTED | NLA_F_NET_BYTEORDER);

/// Round `len` up to the next multiple of four.
///
/// ```
/// use nlmux::codec::align4;
///
/// assert_eq!(align4(0), 0);
/// assert_eq!(align4(5), 8);
/// assert_eq!(align4(8), 8);
/// ```
#[must_use]
pub const fn align4(len: usize) -> usize { (len + 3) & !3 }

/// Copy the first `N` bytes of `bytes` into a fixed array.
pub(crate) fn take<const N: usize>(bytes: &[u8]) -> Result<[u8; N], CodecError> {
    bytes
        .get(..N)
        .and_then(|head| <[u8; N]>::try_from(head).ok())
        .ok_or(CodecError::Truncated {
            need: N,
            have: bytes.len(),
        })
}

/// Borrow the first `need` bytes of `buf` for writing.
pub(crate) fn reserve(buf: &mut [u8], need: usize) -> Result<&mut [u8], CodecError> {
    let have = buf.len();
    buf.get_mut(..need)
        .ok_or(CodecError::ShortBuffer { need, have })
}
