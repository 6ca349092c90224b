//! Realigning blocks to partition boundaries.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

use tracing::debug;

use crate::block::{AppenderConfig, DataBlock, RecordAppender};
use crate::error::{BlockError, Result};
use crate::record::FieldAccess;
use crate::schema::{Schema, TimeRange};

/// Splits `block` into one block per partition its records fall in.
///
/// A block inside a single partition is returned as is, without decoding.
/// Otherwise its records are decoded to absolute values and re-encoded, so
/// every output block starts each record type with an absolute record.
///
/// # Errors
///
/// Returns `BlockError::CompressedPayload` if the block spans partitions but
/// is compressed, decoding errors from the payload, and
/// `BlockError::MalformedInput` if the records return to a partition they
/// already left.
pub fn split_block(block: &DataBlock, schema: &Schema) -> Result<BTreeMap<TimeRange, DataBlock>> {
    let unit = schema.timestamp_unit();
    let first = unit.to_nanos(block.first_timestamp());
    let last = unit.to_nanos(block.last_timestamp());

    let mut result = BTreeMap::new();
    let mut range = schema.partition_range_containing(first);
    if range.contains(last) {
        result.insert(range, block.clone());
        return Ok(result);
    }

    let mut appender = RecordAppender::new(schema, AppenderConfig::unbounded());
    for record in block.records(schema)? {
        let record = record?;
        let timestamp = record.timestamp_nanos()?;
        if !range.contains(timestamp) {
            let next = schema.partition_range_containing(timestamp);
            debug!("Rotating split from partition {} to {}", range, next);
            let full = std::mem::replace(
                &mut appender,
                RecordAppender::new(schema, AppenderConfig::unbounded()),
            );
            seal(&mut result, range, full)?;
            range = next;
        }
        if !appender.append(&record)? {
            return Err(BlockError::BlockOverflow {
                record_size: record.serialized_size(),
                budget: appender.config().block_size_bytes,
            });
        }
    }
    seal(&mut result, range, appender)?;
    Ok(result)
}

fn seal(
    result: &mut BTreeMap<TimeRange, DataBlock>,
    range: TimeRange,
    appender: RecordAppender,
) -> Result<()> {
    if appender.is_empty() {
        return Ok(());
    }
    match result.entry(range) {
        Entry::Vacant(slot) => {
            let block = appender.finish();
            debug!(
                "Sealed {} records into partition {}",
                block.record_count(),
                range
            );
            slot.insert(block);
            Ok(())
        }
        Entry::Occupied(_) => Err(BlockError::malformed(format!(
            "block returns to partition {range} after leaving it"
        ))),
    }
}
