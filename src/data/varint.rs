//! Variable-length integers
//!
//! LEB128 unsigned varints and zigzag signed varints, wire-compatible with
//! the usual protobuf/Go encodings.

use bytes::BufMut;

/// Longest encoding of a 32-bit value
pub const MAX_VARINT_LEN32: usize = 5;

/// Longest encoding of a 64-bit value
pub const MAX_VARINT_LEN64: usize = 10;

/// Append `value` as an unsigned varint
pub fn put_uvarint<B: BufMut>(buf: &mut B, mut value: u64) {
    while value >= 0x80 {
        buf.put_u8((value as u8) | 0x80);
        value >>= 7;
    }
    buf.put_u8(value as u8);
}

/// Append `value` as a zigzag-encoded signed varint
pub fn put_varint<B: BufMut>(buf: &mut B, value: i64) {
    put_uvarint(buf, ((value << 1) ^ (value >> 63)) as u64);
}

/// Decode an unsigned varint; `None` if truncated or overflowing
pub fn uvarint(buf: &[u8]) -> Option<(u64, usize)> {
    let mut value = 0u64;
    let mut shift = 0u32;
    for (i, &byte) in buf.iter().enumerate().take(MAX_VARINT_LEN64) {
        if byte < 0x80 {
            if i == MAX_VARINT_LEN64 - 1 && byte > 1 {
                return None;
            }
            return Some((value | (u64::from(byte) << shift), i + 1));
        }
        value |= u64::from(byte & 0x7f) << shift;
        shift += 7;
    }
    None
}

/// Decode a zigzag signed varint; `None` if truncated or overflowing
pub fn varint(buf: &[u8]) -> Option<(i64, usize)> {
    let (raw, n) = uvarint(buf)?;
    let value = ((raw >> 1) as i64) ^ -((raw & 1) as i64);
    Some((value, n))
}
