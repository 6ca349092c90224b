//! Error and Result types for block encoding operations.

use crate::codec::CompressionType;
use crate::field::FieldType;
use thiserror::Error;

/// A convenience `Result` type for block operations.
pub type Result<T> = std::result::Result<T, BlockError>;

/// The error type for field, record and block operations.
#[derive(Debug, Error)]
pub enum BlockError {
    /// A field was read, written or combined as a type it cannot represent.
    #[error("Type conversion error: {stored} field cannot be used as {requested}")]
    TypeConversion {
        /// Type of the stored value.
        stored: FieldType,
        /// The requested conversion.
        requested: &'static str,
    },

    /// A textual literal could not be parsed into a field value.
    #[error("Invalid literal {literal:?} for {target} field")]
    InvalidLiteral {
        /// The rejected literal.
        literal: String,
        /// Type of the target field.
        target: FieldType,
    },

    /// A record cannot fit into a block even on its own.
    #[error("Block overflow: record of {record_size} bytes does not fit a {budget} byte block")]
    BlockOverflow {
        /// Encoded size of the rejected record, including its framing.
        record_size: usize,
        /// Configured block size budget.
        budget: usize,
    },

    /// Truncated or inconsistent bytes encountered while decoding.
    #[error("Malformed input: {0}")]
    MalformedInput(String),

    /// Records or fields with incompatible layouts were combined.
    #[error("Precondition violated: {0}")]
    Precondition(String),

    /// The schema cannot describe a valid block layout.
    #[error("Invalid schema: {0}")]
    InvalidSchema(String),

    /// Records were requested from a block whose payload is still compressed.
    #[error("Block payload is compressed with {0:?}, decompress it first")]
    CompressedPayload(CompressionType),

    /// Error during compression.
    #[error("Compression error: {0}")]
    CompressionError(String),

    /// Error during decompression.
    #[error("Decompression error: {0}")]
    DecompressionError(String),
}

impl BlockError {
    pub(crate) fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedInput(msg.into())
    }

    pub(crate) fn precondition(msg: impl Into<String>) -> Self {
        Self::Precondition(msg.into())
    }
}
