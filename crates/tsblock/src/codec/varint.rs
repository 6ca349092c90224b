//! Variable-length integer encoding.
//!
//! Unsigned values use LEB128: seven payload bits per byte, least significant
//! group first, with the high bit set on every byte except the last. Signed
//! values are zig-zag mapped first so small magnitudes of either sign stay short.
//!
//! | Value range          | Bytes |
//! |----------------------|-------|
//! | 0 - 127              | 1     |
//! | 128 - 16383          | 2     |
//! | 16384 - 2097151      | 3     |
//! | ...                  | ...   |
//! | 2^63 - u64::MAX      | 10    |

use bytes::{Buf, BufMut};

use crate::error::{BlockError, Result};

/// Maximum encoded length of a 64-bit varint.
pub const MAX_VARINT_LEN: usize = 10;

/// Returns the number of bytes `value` occupies when varint encoded.
pub fn varint_len(value: u64) -> usize {
    let bits = 64 - (value | 1).leading_zeros() as usize;
    bits.div_ceil(7)
}

/// Returns the number of bytes `value` occupies when zig-zag varint encoded.
pub fn signed_varint_len(value: i64) -> usize {
    varint_len(zigzag_encode(value))
}

/// Maps a signed value onto an unsigned one, interleaving positives and negatives.
#[inline]
pub fn zigzag_encode(value: i64) -> u64 {
    ((value << 1) ^ (value >> 63)) as u64
}

/// Inverse of [`zigzag_encode`].
#[inline]
pub fn zigzag_decode(value: u64) -> i64 {
    ((value >> 1) as i64) ^ -((value & 1) as i64)
}

/// Writes `value` as a varint and returns the number of bytes written.
pub fn write_varint<B: BufMut>(mut value: u64, buf: &mut B) -> usize {
    let mut written = 1;
    while value >= 0x80 {
        buf.put_u8((value as u8) | 0x80);
        value >>= 7;
        written += 1;
    }
    buf.put_u8(value as u8);
    written
}

/// Writes `value` as a zig-zag varint and returns the number of bytes written.
pub fn write_signed_varint<B: BufMut>(value: i64, buf: &mut B) -> usize {
    write_varint(zigzag_encode(value), buf)
}

/// Reads a varint from the front of `buf`, advancing it.
///
/// # Errors
///
/// Returns `BlockError::MalformedInput` if the buffer ends mid-varint or the
/// encoding is longer than [`MAX_VARINT_LEN`] bytes.
pub fn read_varint<B: Buf>(buf: &mut B) -> Result<u64> {
    let mut value: u64 = 0;
    for i in 0..MAX_VARINT_LEN {
        if !buf.has_remaining() {
            return Err(BlockError::malformed("truncated varint"));
        }
        let byte = buf.get_u8();
        let shift = 7 * i as u32;
        // The tenth byte may only carry the top bit of a u64.
        if i == MAX_VARINT_LEN - 1 && byte > 0x01 {
            return Err(BlockError::malformed("varint overflows 64 bits"));
        }
        value |= u64::from(byte & 0x7F) << shift;
        if byte & 0x80 == 0 {
            return Ok(value);
        }
    }
    Err(BlockError::malformed("varint longer than 10 bytes"))
}

/// Reads a zig-zag varint from the front of `buf`, advancing it.
pub fn read_signed_varint<B: Buf>(buf: &mut B) -> Result<i64> {
    read_varint(buf).map(zigzag_decode)
}
