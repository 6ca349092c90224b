//! Byte-level codecs shared by fields, records and blocks.
//!
//! - [`varint`]: variable-length integer encoding used by every integral form
//! - [`BlockCodec`]: the seam through which the surrounding engine compresses
//!   sealed block payloads before persisting them

pub mod varint;

use crate::error::{BlockError, Result};

/// Compression type recorded in a block header.
///
/// The tag only identifies the transform; implementations are supplied by the
/// storage engine through [`BlockCodec`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum CompressionType {
    /// No compression (raw record bytes).
    #[default]
    Raw = 0,
    /// LZ4 block compression.
    Lz4 = 1,
    /// Zstandard compression.
    Zstd = 2,
    /// Snappy compression.
    Snappy = 3,
}

impl CompressionType {
    /// Creates a CompressionType from a u8 value.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Raw),
            1 => Some(Self::Lz4),
            2 => Some(Self::Zstd),
            3 => Some(Self::Snappy),
            _ => None,
        }
    }

    /// Returns true if payloads tagged with this type hold plain record bytes.
    pub fn is_raw(self) -> bool {
        self == Self::Raw
    }
}

/// A reversible byte transform applied to sealed block payloads.
pub trait BlockCodec {
    /// The tag written into the header of blocks produced by this codec.
    fn compression_type(&self) -> CompressionType;

    /// Compresses a raw payload.
    fn compress(&self, input: &[u8]) -> Result<Vec<u8>>;

    /// Restores a raw payload of `uncompressed_len` bytes.
    fn decompress(&self, input: &[u8], uncompressed_len: usize) -> Result<Vec<u8>>;
}

/// Identity codec for blocks stored without compression.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawCodec;

impl BlockCodec for RawCodec {
    fn compression_type(&self) -> CompressionType {
        CompressionType::Raw
    }

    fn compress(&self, input: &[u8]) -> Result<Vec<u8>> {
        Ok(input.to_vec())
    }

    fn decompress(&self, input: &[u8], uncompressed_len: usize) -> Result<Vec<u8>> {
        if input.len() != uncompressed_len {
            return Err(BlockError::DecompressionError(format!(
                "raw payload is {} bytes, header expects {}",
                input.len(),
                uncompressed_len
            )));
        }
        Ok(input.to_vec())
    }
}
