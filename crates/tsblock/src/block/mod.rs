//! Data blocks: a header record followed by a payload of encoded records.
//!
//! # Block Format
//!
//! ```text
//! ┌───────────────────────────┬──────────────────────────────────────────┐
//! │ Header (record, tag 0x7F) │ Payload (header.compressedSize bytes)    │
//! └───────────────────────────┴──────────────────────────────────────────┘
//! ```
//!
//! Uncompressed payloads are a sequence of records. The first record of each
//! type in a block holds absolute values; later records of that type are
//! deltas from the one before.

pub mod appender;
pub mod header;
pub mod split;

use bytes::{BufMut, Bytes, BytesMut};

use crate::codec::{BlockCodec, CompressionType};
use crate::error::{BlockError, Result};
use crate::record::{FieldAccess, LazyRecord, Record};
use crate::schema::{Schema, TimeRange};

pub use appender::{AppenderConfig, RecordAppender, DEFAULT_BLOCK_SIZE};
pub use header::{BlockHeader, HEADER_RECORD_TYPE};
pub use split::split_block;

/// An immutable block. Clones share the payload bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataBlock {
    header: BlockHeader,
    payload: Bytes,
}

impl DataBlock {
    pub(crate) fn from_parts(header: BlockHeader, payload: Bytes) -> Self {
        Self { header, payload }
    }

    /// Returns the header.
    pub fn header(&self) -> &BlockHeader {
        &self.header
    }

    /// Returns the payload as stored (compressed if the header says so).
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Number of records in the block.
    pub fn record_count(&self) -> usize {
        self.header.record_count() as usize
    }

    /// Returns true if the block holds no records.
    pub fn is_empty(&self) -> bool {
        self.record_count() == 0
    }

    /// Raw timestamp of the first record, in the schema's unit.
    pub fn first_timestamp(&self) -> i64 {
        self.header.first_timestamp()
    }

    /// Raw timestamp of the last record, in the schema's unit.
    pub fn last_timestamp(&self) -> i64 {
        self.header.last_timestamp()
    }

    /// The smallest half-open nanosecond range covering the block's first and
    /// last timestamps.
    pub fn time_range(&self, schema: &Schema) -> TimeRange {
        let unit = schema.timestamp_unit();
        let start = unit.to_nanos(self.first_timestamp());
        let end = unit.to_nanos(self.last_timestamp()).saturating_add(1);
        TimeRange::new(start, end)
    }

    /// Returns the payload's compression type.
    pub fn compression_type(&self) -> CompressionType {
        self.header.compression_type()
    }

    /// Returns true if the payload is not plain record bytes.
    pub fn is_compressed(&self) -> bool {
        !self.compression_type().is_raw()
    }

    // ------------------------------------------------------------------
    // Binary codec
    // ------------------------------------------------------------------

    /// Exact number of bytes [`DataBlock::write_to`] emits.
    pub fn encoded_len(&self) -> usize {
        self.header.serialized_size() + self.payload.len()
    }

    /// Writes the block and returns the number of bytes written.
    pub fn write_to<B: BufMut>(&self, buf: &mut B) -> usize {
        let written = self.header.write_to(buf);
        buf.put_slice(&self.payload);
        written + self.payload.len()
    }

    /// Encodes the block into a new buffer.
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        self.write_to(&mut buf);
        buf.freeze()
    }

    /// Reads one block from the front of `buf`. The payload shares `buf`'s
    /// storage.
    ///
    /// # Errors
    ///
    /// Returns `BlockError::MalformedInput` if the header is invalid, the
    /// payload is shorter than the header claims, or an uncompressed payload's
    /// two sizes disagree.
    pub fn read_from(schema: &Schema, buf: &mut Bytes) -> Result<Self> {
        let header = BlockHeader::read_from(schema, buf)?;
        let size = header.compressed_size();
        let size = usize::try_from(size)
            .ok()
            .filter(|&size| size <= buf.len())
            .ok_or_else(|| {
                BlockError::malformed(format!(
                    "block payload of {size} bytes exceeds the {} remaining bytes",
                    buf.len()
                ))
            })?;
        let raw = header.compression_type().is_raw();
        if raw && header.uncompressed_size() != header.compressed_size() {
            return Err(BlockError::malformed(format!(
                "uncompressed block has compressed size {} but uncompressed size {}",
                header.compressed_size(),
                header.uncompressed_size()
            )));
        }
        let payload = buf.split_to(size);
        Ok(Self { header, payload })
    }

    /// Decodes a buffer holding exactly one block.
    pub fn decode(schema: &Schema, mut bytes: Bytes) -> Result<Self> {
        let block = Self::read_from(schema, &mut bytes)?;
        if !bytes.is_empty() {
            return Err(BlockError::malformed(format!(
                "{} trailing bytes after block",
                bytes.len()
            )));
        }
        Ok(block)
    }

    // ------------------------------------------------------------------
    // Record access
    // ------------------------------------------------------------------

    /// Iterates the records as stored, deltas included.
    ///
    /// # Errors
    ///
    /// Returns `BlockError::CompressedPayload` if the payload is compressed.
    pub fn raw_records<'a>(&self, schema: &'a Schema) -> Result<RawRecords<'a>> {
        let compression = self.compression_type();
        if !compression.is_raw() {
            return Err(BlockError::CompressedPayload(compression));
        }
        Ok(RawRecords {
            schema,
            remaining: self.payload.clone(),
            failed: false,
        })
    }

    /// Iterates the records with absolute values, applying each delta to the
    /// previous record of its type.
    ///
    /// Once the payload is exhausted, the number of records seen per type is
    /// checked against the header; a mismatch is yielded as a final
    /// `BlockError::MalformedInput`.
    ///
    /// # Errors
    ///
    /// Returns `BlockError::CompressedPayload` if the payload is compressed.
    pub fn records<'a>(&self, schema: &'a Schema) -> Result<Records<'a>> {
        let types = schema.record_type_count();
        Ok(Records {
            raw: self.raw_records(schema)?,
            last_absolute: vec![None; types],
            expected: (0..types).map(|t| self.header.count(t as u8)).collect(),
            seen: vec![0; types],
            verified: false,
        })
    }

    // ------------------------------------------------------------------
    // Compression
    // ------------------------------------------------------------------

    /// Returns a copy of the block with its payload compressed by `codec`.
    ///
    /// # Errors
    ///
    /// Returns `BlockError::Precondition` if the block is already compressed,
    /// or the codec's own error.
    pub fn compress(&self, codec: &dyn BlockCodec) -> Result<DataBlock> {
        if self.is_compressed() {
            return Err(BlockError::precondition(format!(
                "block is already compressed with {:?}",
                self.compression_type()
            )));
        }
        let payload = codec.compress(&self.payload)?;
        let mut header = self.header.clone();
        header.set_compression_type(codec.compression_type());
        header.set_compressed_size(payload.len() as i64);
        Ok(Self {
            header,
            payload: Bytes::from(payload),
        })
    }

    /// Returns a copy of the block with plain record bytes as its payload.
    /// Uncompressed blocks are returned as they are.
    ///
    /// # Errors
    ///
    /// Returns `BlockError::DecompressionError` if `codec` handles a different
    /// compression type or restores the wrong number of bytes.
    pub fn decompress(&self, codec: &dyn BlockCodec) -> Result<DataBlock> {
        let compression = self.compression_type();
        if compression.is_raw() {
            return Ok(self.clone());
        }
        if codec.compression_type() != compression {
            return Err(BlockError::DecompressionError(format!(
                "block is compressed with {compression:?}, codec handles {:?}",
                codec.compression_type()
            )));
        }
        let expected = usize::try_from(self.header.uncompressed_size())
            .map_err(|_| BlockError::DecompressionError("negative uncompressed size".into()))?;
        let payload = codec.decompress(&self.payload, expected)?;
        if payload.len() != expected {
            return Err(BlockError::DecompressionError(format!(
                "restored {} bytes, header expects {expected}",
                payload.len()
            )));
        }
        let mut header = self.header.clone();
        header.set_compression_type(CompressionType::Raw);
        header.set_compressed_size(payload.len() as i64);
        Ok(Self {
            header,
            payload: Bytes::from(payload),
        })
    }
}

/// Iterator over the stored records of a block. Stops after the first error.
#[derive(Debug)]
pub struct RawRecords<'a> {
    schema: &'a Schema,
    remaining: Bytes,
    failed: bool,
}

impl Iterator for RawRecords<'_> {
    type Item = Result<LazyRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.remaining.is_empty() {
            return None;
        }
        let record = LazyRecord::read_from(self.schema, &mut self.remaining).and_then(|record| {
            if record.record_type() == HEADER_RECORD_TYPE {
                Err(BlockError::malformed("header record inside block payload"))
            } else {
                Ok(record)
            }
        });
        self.failed = record.is_err();
        Some(record)
    }
}

/// Iterator over the absolute records of a block. Stops after the first error.
#[derive(Debug)]
pub struct Records<'a> {
    raw: RawRecords<'a>,
    last_absolute: Vec<Option<Record>>,
    expected: Vec<i64>,
    seen: Vec<i64>,
    verified: bool,
}

impl Records<'_> {
    fn reconstruct(&mut self, stored: LazyRecord) -> Result<Record> {
        let record = stored.to_record()?;
        let slot = &mut self.last_absolute[record.record_type() as usize];
        let absolute = match slot.take() {
            Some(mut base) if record.is_delta() => {
                base.add(&record)?;
                base
            }
            None if record.is_delta() => {
                return Err(BlockError::malformed(format!(
                    "delta record of type {} has no preceding absolute record",
                    record.record_type()
                )))
            }
            _ => record,
        };
        *slot = Some(absolute.clone());
        self.seen[absolute.record_type() as usize] += 1;
        Ok(absolute)
    }

    fn verify_counts(&self) -> Result<()> {
        let mismatch = self
            .expected
            .iter()
            .zip(&self.seen)
            .enumerate()
            .find(|(_, (expected, seen))| expected != seen);
        match mismatch {
            Some((record_type, (expected, seen))) => Err(BlockError::malformed(format!(
                "header counts {expected} records of type {record_type}, payload holds {seen}"
            ))),
            None => Ok(()),
        }
    }
}

impl Iterator for Records<'_> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        let stored = match self.raw.next() {
            Some(Ok(stored)) => stored,
            Some(Err(err)) => return Some(Err(err)),
            None if self.raw.failed || self.verified => return None,
            None => {
                self.verified = true;
                return self.verify_counts().err().map(Err);
            }
        };
        let record = self.reconstruct(stored);
        if record.is_err() {
            self.raw.failed = true;
        }
        Some(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::RawCodec;
    use crate::field::{Field, FieldType, TimeUnit};
    use crate::schema::{FieldDef, FixedPartitioner, PartitionDuration, RecordLayout};

    fn schema() -> Schema {
        let layout = RecordLayout::new(
            "sample",
            vec![
                FieldDef::new("time", FieldType::Timestamp(TimeUnit::Seconds)),
                FieldDef::new("value", FieldType::Integer),
            ],
        )
        .unwrap();
        Schema::new(vec![layout], FixedPartitioner::from(PartitionDuration::Hourly)).unwrap()
    }

    fn sample(ts: i64, value: i32) -> Record {
        Record::from_fields(
            0,
            vec![Field::timestamp(TimeUnit::Seconds, ts), Field::Integer(value)],
        )
        .unwrap()
    }

    fn block(schema: &Schema, samples: &[(i64, i32)]) -> DataBlock {
        let mut appender = RecordAppender::new(schema, AppenderConfig::default());
        for &(ts, value) in samples {
            assert!(appender.append(&sample(ts, value)).unwrap());
        }
        appender.finish()
    }

    /// A codec that reverses the payload, to exercise the compression seam.
    struct ReverseCodec;

    impl BlockCodec for ReverseCodec {
        fn compression_type(&self) -> CompressionType {
            CompressionType::Lz4
        }

        fn compress(&self, input: &[u8]) -> Result<Vec<u8>> {
            Ok(input.iter().rev().copied().collect())
        }

        fn decompress(&self, input: &[u8], _uncompressed_len: usize) -> Result<Vec<u8>> {
            Ok(input.iter().rev().copied().collect())
        }
    }

    #[test]
    fn test_block_roundtrip() {
        let schema = schema();
        let block = block(&schema, &[(10, 1), (11, 2), (15, -7)]);

        let bytes = block.to_bytes();
        assert_eq!(bytes.len(), block.encoded_len());
        let decoded = DataBlock::decode(&schema, bytes).unwrap();
        assert_eq!(decoded, block);
        assert_eq!(decoded.record_count(), 3);
        assert_eq!(decoded.first_timestamp(), 10);
        assert_eq!(decoded.last_timestamp(), 15);
        assert_eq!(
            decoded.time_range(&schema),
            TimeRange::new(10_000_000_000, 15_000_000_001)
        );
    }

    #[test]
    fn test_read_from_consecutive_blocks() {
        let schema = schema();
        let a = block(&schema, &[(1, 1)]);
        let b = block(&schema, &[(2, 2), (3, 3)]);

        let mut buf = BytesMut::new();
        a.write_to(&mut buf);
        b.write_to(&mut buf);
        let mut bytes = buf.freeze();

        assert_eq!(DataBlock::read_from(&schema, &mut bytes).unwrap(), a);
        assert_eq!(DataBlock::read_from(&schema, &mut bytes).unwrap(), b);
        assert!(bytes.is_empty());
    }

    #[test]
    fn test_decode_rejects_truncated_payload() {
        let schema = schema();
        let bytes = block(&schema, &[(1, 1), (2, 2)]).to_bytes();
        let truncated = bytes.slice(..bytes.len() - 1);
        assert!(matches!(
            DataBlock::decode(&schema, truncated),
            Err(BlockError::MalformedInput(_))
        ));
    }

    #[test]
    fn test_decode_rejects_trailing_bytes() {
        let schema = schema();
        let mut buf = BytesMut::new();
        block(&schema, &[(1, 1)]).write_to(&mut buf);
        buf.put_u8(0);
        assert!(DataBlock::decode(&schema, buf.freeze()).is_err());
    }

    #[test]
    fn test_records_reconstruct_absolute_values() {
        let schema = schema();
        let block = block(&schema, &[(100, 5), (160, 9), (220, 9)]);

        let raw: Vec<_> = block
            .raw_records(&schema)
            .unwrap()
            .collect::<Result<Vec<_>>>()
            .unwrap();
        assert_eq!(raw.len(), 3);
        assert!(!raw[0].is_delta());
        assert!(raw[1].is_delta() && raw[2].is_delta());

        let records: Vec<_> = block
            .records(&schema)
            .unwrap()
            .collect::<Result<Vec<_>>>()
            .unwrap();
        assert_eq!(records, vec![sample(100, 5), sample(160, 9), sample(220, 9)]);
    }

    #[test]
    fn test_records_reject_leading_delta() {
        let schema = schema();
        let mut payload = BytesMut::new();
        sample(1, 1).with_delta(true).write_to(&mut payload);
        let mut header = BlockHeader::new(&schema);
        header.record_append(0, 1, payload.len());
        let block = DataBlock::from_parts(header, payload.freeze());

        let mut records = block.records(&schema).unwrap();
        assert!(matches!(
            records.next(),
            Some(Err(BlockError::MalformedInput(_)))
        ));
        assert!(records.next().is_none());
    }

    #[test]
    fn test_records_reject_forged_header_count() {
        let schema = schema();
        let honest = block(&schema, &[(1, 1), (2, 2)]);

        // One record more than the payload holds, sizes untouched.
        let mut header = honest.header().clone();
        header.record_append(0, 2, 0);
        let forged = DataBlock::from_parts(header, honest.payload().clone());
        let forged = DataBlock::decode(&schema, forged.to_bytes()).unwrap();
        assert_eq!(forged.record_count(), 3);

        let mut records = forged.records(&schema).unwrap();
        assert_eq!(records.next().unwrap().unwrap(), sample(1, 1));
        assert_eq!(records.next().unwrap().unwrap(), sample(2, 2));
        assert!(matches!(
            records.next(),
            Some(Err(BlockError::MalformedInput(_)))
        ));
        assert!(records.next().is_none());

        // One record fewer than the payload holds.
        let mut header = BlockHeader::new(&schema);
        header.record_append(0, 1, honest.payload().len());
        let forged = DataBlock::from_parts(header, honest.payload().clone());
        assert!(forged
            .records(&schema)
            .unwrap()
            .collect::<Result<Vec<_>>>()
            .is_err());

        // An honest block ends cleanly.
        let mut records = honest.records(&schema).unwrap();
        assert_eq!(records.by_ref().count(), 2);
        assert!(records.next().is_none());
    }

    #[test]
    fn test_compress_and_decompress() {
        let schema = schema();
        let plain = block(&schema, &[(1, 10), (2, 20), (4, 40)]);

        let compressed = plain.compress(&ReverseCodec).unwrap();
        assert!(compressed.is_compressed());
        assert_eq!(compressed.compression_type(), CompressionType::Lz4);
        assert!(matches!(
            compressed.records(&schema),
            Err(BlockError::CompressedPayload(CompressionType::Lz4))
        ));
        assert!(compressed.compress(&ReverseCodec).is_err());

        // Compressed blocks survive a trip through bytes.
        let reread = DataBlock::decode(&schema, compressed.to_bytes()).unwrap();
        assert_eq!(reread, compressed);

        assert!(matches!(
            reread.decompress(&RawCodec),
            Err(BlockError::DecompressionError(_))
        ));
        let restored = reread.decompress(&ReverseCodec).unwrap();
        assert_eq!(restored, plain);
    }

    #[test]
    fn test_raw_codec_is_identity() {
        let schema = schema();
        let plain = block(&schema, &[(1, 1)]);
        assert_eq!(plain.compress(&RawCodec).unwrap(), plain);
        assert_eq!(plain.decompress(&RawCodec).unwrap(), plain);
    }
}
