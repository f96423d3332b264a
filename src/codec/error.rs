//! Error types for the netlink codec.
//!
//! - [`CodecError::Truncated`]: fewer bytes remain than a fixed-width field or
//!   declared value needs.
//! - [`CodecError::ShortBuffer`]: an encode target is smaller than the
//!   computed encoded length; nothing is written.
//! - [`CodecError::InvalidLength`]: a declared length cannot frame a message
//!   or attribute inside the available bytes.
//! - [`CodecError::AttrTooLong`]: an attribute does not fit the 16-bit length
//!   field.

use thiserror::Error;

/// Failures raised while encoding or decoding netlink wire data.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    /// Input ended before a fixed-width field could be decoded.
    #[error("truncated input: need {need} bytes, have {have}")]
    Truncated {
        /// Bytes required by the field.
        need: usize,
        /// Bytes actually available.
        have: usize,
    },

    /// Encode target is smaller than the encoded form.
    #[error("buffer too short: need {need} bytes, have {have}")]
    ShortBuffer {
        /// Bytes required by the encoder.
        need: usize,
        /// Capacity of the supplied buffer.
        have: usize,
    },

    /// A declared length is smaller than its header or overruns the input.
    #[error("invalid declared length {len}: {available} bytes available")]
    InvalidLength {
        /// Length declared on the wire.
        len: usize,
        /// Bytes remaining in the input.
        available: usize,
    },

    /// Attribute header plus value exceeds `u16::MAX`.
    #[error("attribute of {len} bytes exceeds the 16-bit length field")]
    AttrTooLong {
        /// Unpadded attribute length.
        len: usize,
    },
}

impl CodecError {
    /// Returns `true` when the error was caused by running out of input.
    #[must_use]
    pub fn is_truncation(&self) -> bool { matches!(self, Self::Truncated { .. }) }
}
