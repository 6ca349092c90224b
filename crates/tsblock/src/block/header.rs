//! Block header: block metadata stored as a record of a reserved type.
//!
//! The header is encoded exactly like a data record, so it grows and shrinks
//! with the varint width of its values:
//!
//! | index | field            | type                   |
//! |-------|------------------|------------------------|
//! | 0     | firstTimestamp   | Timestamp(schema unit) |
//! | 1     | lastTimestamp    | Timestamp(schema unit) |
//! | 2     | compressionType  | Byte                   |
//! | 3     | compressedSize   | Long                   |
//! | 4     | uncompressedSize | Long                   |
//! | 5 + t | count of type t  | Long                   |

use bytes::{BufMut, Bytes};

use crate::codec::CompressionType;
use crate::error::{BlockError, Result};
use crate::field::{Field, FieldType, TimeUnit};
use crate::record::{FieldAccess, LazyRecord, Record};
use crate::schema::{FieldDef, RecordLayout, Schema};

/// Type tag reserved for block headers.
pub const HEADER_RECORD_TYPE: u8 = 0x7F;

/// Number of header fields before the per-type counts.
pub const HEADER_FIXED_FIELDS: usize = 5;

/// Header field holding the first record's timestamp.
pub const FIRST_TIMESTAMP: usize = 0;
/// Header field holding the last record's timestamp.
pub const LAST_TIMESTAMP: usize = 1;
/// Header field holding the payload's [`CompressionType`] tag.
pub const COMPRESSION_TYPE: usize = 2;
/// Header field holding the stored payload length.
pub const COMPRESSED_SIZE: usize = 3;
/// Header field holding the payload length before compression.
pub const UNCOMPRESSED_SIZE: usize = 4;

/// Builds the header layout for a schema with `record_types` record types.
pub fn header_layout(unit: TimeUnit, record_types: usize) -> RecordLayout {
    let mut fields = vec![
        FieldDef::new("firstTimestamp", FieldType::Timestamp(unit)),
        FieldDef::new("lastTimestamp", FieldType::Timestamp(unit)),
        FieldDef::new("compressionType", FieldType::Byte),
        FieldDef::new("compressedSize", FieldType::Long),
        FieldDef::new("uncompressedSize", FieldType::Long),
    ];
    fields.extend((0..record_types).map(|t| FieldDef::new(format!("count{t}"), FieldType::Long)));
    RecordLayout::from_checked_parts("header", fields)
}

/// Metadata of one block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockHeader {
    record: Record,
}

impl BlockHeader {
    /// Creates the header of an empty, uncompressed block.
    pub fn new(schema: &Schema) -> Self {
        Self {
            record: Record::new(HEADER_RECORD_TYPE, schema.header_layout()),
        }
    }

    /// The header as a record.
    pub fn as_record(&self) -> &Record {
        &self.record
    }

    fn timestamp_at(&self, index: usize) -> i64 {
        match self.record.get(index) {
            Some(Field::Timestamp { raw, .. }) => *raw,
            _ => 0,
        }
    }

    fn long_at(&self, index: usize) -> i64 {
        match self.record.get(index) {
            Some(Field::Long(v)) => *v,
            _ => 0,
        }
    }

    fn set_timestamp_at(&mut self, index: usize, value: i64) {
        if let Some(Field::Timestamp { raw, .. }) = self.record.get_mut(index) {
            *raw = value;
        }
    }

    fn set_long_at(&mut self, index: usize, value: i64) {
        if let Some(Field::Long(v)) = self.record.get_mut(index) {
            *v = value;
        }
    }

    /// Raw timestamp of the block's first record, in the schema's unit.
    pub fn first_timestamp(&self) -> i64 {
        self.timestamp_at(FIRST_TIMESTAMP)
    }

    /// Raw timestamp of the block's last record, in the schema's unit.
    pub fn last_timestamp(&self) -> i64 {
        self.timestamp_at(LAST_TIMESTAMP)
    }

    /// Transform applied to the payload.
    pub fn compression_type(&self) -> CompressionType {
        match self.record.get(COMPRESSION_TYPE) {
            Some(Field::Byte(tag)) => u8::try_from(*tag)
                .ok()
                .and_then(CompressionType::from_u8)
                .unwrap_or_default(),
            _ => CompressionType::default(),
        }
    }

    /// Length of the payload as stored.
    pub fn compressed_size(&self) -> i64 {
        self.long_at(COMPRESSED_SIZE)
    }

    /// Length of the payload before compression.
    pub fn uncompressed_size(&self) -> i64 {
        self.long_at(UNCOMPRESSED_SIZE)
    }

    /// Number of record types the header counts.
    pub fn record_type_count(&self) -> usize {
        self.record.field_count() - HEADER_FIXED_FIELDS
    }

    /// Number of records of `record_type` in the block.
    pub fn count(&self, record_type: u8) -> i64 {
        self.long_at(HEADER_FIXED_FIELDS + record_type as usize)
    }

    /// Number of records of every type in the block.
    pub fn record_count(&self) -> i64 {
        (0..self.record_type_count())
            .map(|t| self.long_at(HEADER_FIXED_FIELDS + t))
            .sum()
    }

    pub(crate) fn set_first_timestamp(&mut self, raw: i64) {
        self.set_timestamp_at(FIRST_TIMESTAMP, raw);
    }

    pub(crate) fn set_last_timestamp(&mut self, raw: i64) {
        self.set_timestamp_at(LAST_TIMESTAMP, raw);
    }

    pub(crate) fn set_compression_type(&mut self, compression: CompressionType) {
        if let Some(Field::Byte(tag)) = self.record.get_mut(COMPRESSION_TYPE) {
            *tag = i32::from(compression as u8);
        }
    }

    pub(crate) fn set_compressed_size(&mut self, size: i64) {
        self.set_long_at(COMPRESSED_SIZE, size);
    }

    /// Books one appended record of `total` encoded bytes.
    ///
    /// The first timestamp is only set when the block was empty.
    pub(crate) fn record_append(&mut self, record_type: u8, raw_timestamp: i64, total: usize) {
        if self.record_count() == 0 {
            self.set_first_timestamp(raw_timestamp);
        }
        self.set_last_timestamp(raw_timestamp);
        let count_index = HEADER_FIXED_FIELDS + record_type as usize;
        self.set_long_at(count_index, self.long_at(count_index) + 1);
        let total = total as i64;
        self.set_long_at(COMPRESSED_SIZE, self.compressed_size() + total);
        self.set_long_at(UNCOMPRESSED_SIZE, self.uncompressed_size() + total);
    }

    /// Encoded size of the header if a record were booked with
    /// [`BlockHeader::record_append`].
    pub(crate) fn projected_size(
        &self,
        record_type: u8,
        raw_timestamp: i64,
        total: usize,
    ) -> usize {
        let mut next = self.clone();
        next.record_append(record_type, raw_timestamp, total);
        next.serialized_size()
    }

    /// Exact number of bytes [`BlockHeader::write_to`] emits.
    pub fn serialized_size(&self) -> usize {
        self.record.serialized_size()
    }

    /// Writes the header and returns the number of bytes written.
    pub fn write_to<B: BufMut>(&self, buf: &mut B) -> usize {
        self.record.write_to(buf)
    }

    /// Reads a header from the front of `buf`.
    ///
    /// # Errors
    ///
    /// Returns `BlockError::MalformedInput` if the first record is not a
    /// header, has the wrong shape for `schema`, or holds an unknown
    /// compression tag or a negative size or count.
    pub fn read_from(schema: &Schema, buf: &mut Bytes) -> Result<Self> {
        let lazy = LazyRecord::read_from(schema, buf)?;
        if lazy.record_type() != HEADER_RECORD_TYPE || lazy.is_delta() {
            return Err(BlockError::malformed(format!(
                "expected a block header, found record type {}",
                lazy.record_type()
            )));
        }
        let header = Self {
            record: lazy.to_record()?,
        };

        match header.record.get(COMPRESSION_TYPE) {
            Some(Field::Byte(tag))
                if u8::try_from(*tag)
                    .ok()
                    .and_then(CompressionType::from_u8)
                    .is_some() => {}
            other => {
                return Err(BlockError::malformed(format!(
                    "unknown compression type {other:?}"
                )))
            }
        }
        if let Some(index) = (COMPRESSED_SIZE..header.record.field_count())
            .find(|&i| header.long_at(i) < 0)
        {
            return Err(BlockError::malformed(format!(
                "negative value {} in header field {index}",
                header.long_at(index)
            )));
        }
        Ok(header)
    }
}
