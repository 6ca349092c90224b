//! Alopex TSBlock - Time Series Block Encoding
//!
//! This crate provides the storage-format core of the Alopex time series
//! engine: typed field values, delta-encoded records and the size-bounded
//! blocks they are packed into.
//!
//! # Components
//!
//! - [`Field`]: Tagged scalar values with arithmetic, ordering and a varint codec
//! - [`Record`] / [`LazyRecord`]: Rows of fields, eager or decoded on access
//! - [`RecordAppender`]: Builds a [`DataBlock`] under a byte budget
//! - [`split_block`]: Realigns a block to partition boundaries
//!
//! # Example
//!
//! ```rust,ignore
//! use alopex_tsblock::{AppenderConfig, RecordAppender, split_block};
//!
//! let mut appender = RecordAppender::new(&schema, AppenderConfig::default());
//! for record in &records {
//!     if !appender.append(record)? {
//!         flush(appender.data_block());
//!         appender.reset();
//!         appender.append_or_overflow(record)?;
//!     }
//! }
//!
//! for (range, block) in split_block(&appender.finish(), &schema)? {
//!     store(range, block.to_bytes());
//! }
//! ```

#![deny(missing_docs)]

pub mod block;
pub mod codec;
pub mod error;
pub mod field;
pub mod record;
pub mod schema;

pub use block::{split_block, AppenderConfig, BlockHeader, DataBlock, RecordAppender};
pub use codec::{BlockCodec, CompressionType, RawCodec};
pub use error::{BlockError, Result};
pub use field::{Decimal, Field, FieldRange, FieldType, TimeUnit};
pub use record::{FieldAccess, LazyRecord, Record};
pub use schema::{
    CalendarDayPartitioner, FieldDef, FixedPartitioner, PartitionDuration, Partitioner,
    RecordLayout, Schema, TimeRange,
};
