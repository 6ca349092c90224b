//! Incremental block assembly.
//!
//! A [`RecordAppender`] consumes records in arrival order, delta-encodes each
//! against the previous record of the same type, and stops accepting records
//! once the next one would push the block over its byte budget.
//!
//! # Example
//!
//! ```rust,ignore
//! use alopex_tsblock::block::{AppenderConfig, RecordAppender};
//!
//! let mut appender = RecordAppender::new(&schema, AppenderConfig::default());
//! for record in rows {
//!     if !appender.append(&record)? {
//!         sink.push(appender.data_block());
//!         appender.reset();
//!         appender.append_or_overflow(&record)?;
//!     }
//! }
//! sink.push(appender.finish());
//! ```

use bytes::BytesMut;
use tracing::{trace, warn};

use crate::block::header::BlockHeader;
use crate::block::DataBlock;
use crate::codec::varint::varint_len;
use crate::error::{BlockError, Result};
use crate::field::Field;
use crate::record::{FieldAccess, Record};
use crate::schema::Schema;

/// Default block size budget (64 KB).
pub const DEFAULT_BLOCK_SIZE: usize = 64 * 1024;

/// Configuration for block assembly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppenderConfig {
    /// Maximum encoded size of a block, header included.
    pub block_size_bytes: usize,
}

impl Default for AppenderConfig {
    fn default() -> Self {
        Self {
            block_size_bytes: DEFAULT_BLOCK_SIZE,
        }
    }
}

impl AppenderConfig {
    /// Sets the block size budget.
    pub fn with_block_size(mut self, block_size_bytes: usize) -> Self {
        self.block_size_bytes = block_size_bytes;
        self
    }

    /// A configuration that never rejects a record.
    pub fn unbounded() -> Self {
        Self {
            block_size_bytes: usize::MAX,
        }
    }
}

/// An append that has been encoded but not yet committed.
struct Pending {
    record_type: u8,
    encoded: Record,
    absolute: Record,
    raw_timestamp: i64,
    total: usize,
}

/// Builds one [`DataBlock`] from a stream of records.
///
/// The appender keeps the last absolute record of every type, so the first
/// record of each type in a block is stored in full and later ones as deltas.
#[derive(Debug)]
pub struct RecordAppender {
    schema: Schema,
    config: AppenderConfig,
    header: BlockHeader,
    last_absolute: Vec<Option<Record>>,
    payload: BytesMut,
}

impl RecordAppender {
    /// Creates an empty appender.
    pub fn new(schema: &Schema, config: AppenderConfig) -> Self {
        Self {
            schema: schema.clone(),
            config,
            header: BlockHeader::new(schema),
            last_absolute: vec![None; schema.record_type_count()],
            payload: BytesMut::new(),
        }
    }

    /// Returns the schema records are validated against.
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Returns the configuration.
    pub fn config(&self) -> &AppenderConfig {
        &self.config
    }

    /// Returns the running header of the block being built.
    pub fn header(&self) -> &BlockHeader {
        &self.header
    }

    /// Returns true if no record has been accepted since creation or reset.
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// Number of accepted records.
    pub fn record_count(&self) -> usize {
        self.header.record_count() as usize
    }

    /// Length of the committed payload.
    pub fn payload_len(&self) -> usize {
        self.payload.len()
    }

    /// Encoded size of the block built so far, header included.
    pub fn encoded_len(&self) -> usize {
        self.header.serialized_size() + self.payload.len()
    }

    /// Bytes left under the budget.
    pub fn remaining_bytes(&self) -> usize {
        self.config.block_size_bytes.saturating_sub(self.encoded_len())
    }

    /// Appends a record, absolute or delta.
    ///
    /// Returns `Ok(false)` without changing any state if the record would push
    /// the block past its budget; the caller should seal this block and retry
    /// on a fresh one.
    ///
    /// # Errors
    ///
    /// Returns `BlockError::Precondition` if the record's type is not in the
    /// schema or its fields do not match the type's layout.
    pub fn append(&mut self, record: &Record) -> Result<bool> {
        let pending = self.prepare(record)?;
        if !self.fits(&pending) {
            trace!(
                "Rejected record of type {} ({} bytes), block at {} of {} bytes",
                pending.record_type,
                pending.total,
                self.encoded_len(),
                self.config.block_size_bytes
            );
            return Ok(false);
        }
        self.commit(pending);
        Ok(true)
    }

    /// Like [`RecordAppender::append`], but a record that does not fit an
    /// empty block is an error rather than a rejection.
    ///
    /// # Errors
    ///
    /// Returns `BlockError::BlockOverflow` if the appender is empty and the
    /// record alone exceeds the budget.
    pub fn append_or_overflow(&mut self, record: &Record) -> Result<bool> {
        let pending = self.prepare(record)?;
        if self.fits(&pending) {
            self.commit(pending);
            return Ok(true);
        }
        if self.is_empty() {
            warn!(
                "Record of type {} ({} bytes) exceeds the {} byte block budget on its own",
                pending.record_type, pending.total, self.config.block_size_bytes
            );
            return Err(BlockError::BlockOverflow {
                record_size: pending.total,
                budget: self.config.block_size_bytes,
            });
        }
        Ok(false)
    }

    /// Returns a snapshot of the block built so far. The appender stays usable.
    pub fn data_block(&self) -> DataBlock {
        DataBlock::from_parts(self.header.clone(), self.payload.clone().freeze())
    }

    /// Seals the block without copying its payload.
    pub fn finish(self) -> DataBlock {
        DataBlock::from_parts(self.header, self.payload.freeze())
    }

    /// Clears the appender for a new block. The delta bases are dropped, so
    /// the next record of every type is stored in full.
    pub fn reset(&mut self) {
        self.header = BlockHeader::new(&self.schema);
        self.last_absolute.iter_mut().for_each(|slot| *slot = None);
        self.payload.clear();
    }

    /// Encodes `record` against the current state without changing it.
    fn prepare(&self, record: &Record) -> Result<Pending> {
        let record_type = record.record_type();
        let layout = self.schema.layout(record_type).ok_or_else(|| {
            BlockError::precondition(format!("record type {record_type} is not in the schema"))
        })?;
        if !record.matches_layout(layout) {
            return Err(BlockError::precondition(format!(
                "record does not match the layout of record type {}",
                layout.name()
            )));
        }

        let last = self.last_absolute[record_type as usize].as_ref();
        let (encoded, absolute) = if record.is_delta() {
            let mut absolute = match last {
                Some(base) => base.clone(),
                None => Record::new(record_type, layout),
            };
            absolute.add(record)?;
            absolute.set_delta(false);
            let encoded = match last {
                Some(_) => record.clone(),
                None => absolute.clone(),
            };
            (encoded, absolute)
        } else {
            match last {
                None => (record.clone(), record.clone()),
                Some(base) => {
                    let mut delta = record.clone();
                    delta.subtract(base)?;
                    delta.set_delta(true);
                    let mut absolute = base.clone();
                    absolute.add(&delta)?;
                    absolute.set_delta(false);
                    if absolute == *record {
                        (delta, absolute)
                    } else {
                        // A NaN or infinite base absorbs the delta; store in full.
                        (record.clone(), record.clone())
                    }
                }
            }
        };

        let raw_timestamp = match absolute.timestamp() {
            Field::Timestamp { raw, .. } => *raw,
            other => other.as_i64()?,
        };
        let body = encoded.body_size();
        let total = 1 + varint_len(body as u64) + body;
        Ok(Pending {
            record_type,
            encoded,
            absolute,
            raw_timestamp,
            total,
        })
    }

    fn fits(&self, pending: &Pending) -> bool {
        let header = self
            .header
            .projected_size(pending.record_type, pending.raw_timestamp, pending.total);
        self.payload
            .len()
            .saturating_add(pending.total)
            .saturating_add(header)
            <= self.config.block_size_bytes
    }

    fn commit(&mut self, pending: Pending) {
        self.payload.reserve(pending.total);
        let written = pending.encoded.write_to(&mut self.payload);
        debug_assert_eq!(written, pending.total);
        self.header
            .record_append(pending.record_type, pending.raw_timestamp, pending.total);
        self.last_absolute[pending.record_type as usize] = Some(pending.absolute);
    }
}
