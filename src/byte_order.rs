//! Helpers for explicit byte-order conversions.
//!
//! Netlink headers and most attribute payloads travel in host byte order,
//! while attributes flagged with `NLA_F_NET_BYTEORDER` carry big-endian
//! integers. Keeping both conversions here makes every wire access state its
//! endianness explicitly.

/// Serialise a `u16` in host byte order.
#[must_use]
pub fn write_native_u16(value: u16) -> [u8; 2] { value.to_ne_bytes() }

/// Parse a host-order `u16` from its on-wire representation.
#[must_use]
pub fn read_native_u16(bytes: [u8; 2]) -> u16 { u16::from_ne_bytes(bytes) }

/// Serialise a `u32` in host byte order.
#[must_use]
pub fn write_native_u32(value: u32) -> [u8; 4] { value.to_ne_bytes() }

/// Parse a host-order `u32` from its on-wire representation.
#[must_use]
pub fn read_native_u32(bytes: [u8; 4]) -> u32 { u32::from_ne_bytes(bytes) }

/// Serialise a `u64` in host byte order.
#[must_use]
pub fn write_native_u64(value: u64) -> [u8; 8] { value.to_ne_bytes() }

/// Parse a host-order `u64` from its on-wire representation.
#[must_use]
pub fn read_native_u64(bytes: [u8; 8]) -> u64 { u64::from_ne_bytes(bytes) }

/// Serialise a `u16` in network byte order (big-endian).
///
/// # Examples
///
/// ```
/// use nlmux::byte_order::write_network_u16;
///
/// assert_eq!(write_network_u16(0x1234), [0x12, 0x34]);
/// ```
#[must_use]
pub fn write_network_u16(value: u16) -> [u8; 2] { value.to_be_bytes() }

/// Parse a network-order `u16` from its on-wire representation.
///
/// # Examples
///
/// ```
/// use nlmux::byte_order::read_network_u16;
///
/// assert_eq!(read_network_u16([0x12, 0x34]), 0x1234);
/// ```
#[must_use]
pub fn read_network_u16(bytes: [u8; 2]) -> u16 { u16::from_be_bytes(bytes) }

/// Serialise a `u32` in network byte order (big-endian).
///
/// # Examples
///
/// ```
/// use nlmux::byte_order::write_network_u32;
///
/// assert_eq!(write_network_u32(0x1234_5678), [0x12, 0x34, 0x56, 0x78]);
/// ```
#[must_use]
pub fn write_network_u32(value: u32) -> [u8; 4] { value.to_be_bytes() }

/// Parse a network-order `u32` from its on-wire representation.
#[must_use]
pub fn read_network_u32(bytes: [u8; 4]) -> u32 { u32::from_be_bytes(bytes) }

/// Serialise a `u64` in network byte order (big-endian).
#[must_use]
pub fn write_network_u64(value: u64) -> [u8; 8] { value.to_be_bytes() }

/// Parse a network-order `u64` from its on-wire representation.
#[must_use]
pub fn read_network_u64(bytes: [u8; 8]) -> u64 { u64::from_be_bytes(bytes) }

#[cfg(test)]
mod tests {
    //! Byte-order checks for the wire conversion helpers.

    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case::u16(
        0x1234u64,
        &write_network_u16(0x1234)[..],
        &[0x12, 0x34],
        u64::from(read_network_u16([0x12, 0x34]))
    )]
    #[case::u32(
        0x1234_5678u64,
        &write_network_u32(0x1234_5678)[..],
        &[0x12, 0x34, 0x56, 0x78],
        u64::from(read_network_u32([0x12, 0x34, 0x56, 0x78]))
    )]
    #[case::u64(
        0x1122_3344_5566_7788u64,
        &write_network_u64(0x1122_3344_5566_7788)[..],
        &[0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88],
        read_network_u64([0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88])
    )]
    fn network_order_is_big_endian(
        #[case] value: u64,
        #[case] written: &[u8],
        #[case] expected_bytes: &[u8],
        #[case] read_back: u64,
    ) {
        assert_eq!(written, expected_bytes);
        assert_eq!(read_back, value);
    }

    #[test]
    fn native_order_matches_host() {
        assert_eq!(write_native_u32(0x789a), 0x789a_u32.to_ne_bytes());
        assert_eq!(read_native_u16(write_native_u16(0x5432)), 0x5432);
        assert_eq!(
            read_native_u64(write_native_u64(0x0102_0304_0506_0708)),
            0x0102_0304_0506_0708
        );
    }
}
