//! Property-based tests for the field, record and block codecs.
//!
//! Uses proptest to verify lossless round trips, delta reconstruction, the
//! block size budget and split completeness for arbitrary data.

use alopex_tsblock::{
    split_block, AppenderConfig, DataBlock, Decimal, Field, FieldAccess, FieldDef, FieldType,
    FixedPartitioner, LazyRecord, PartitionDuration, Record, RecordAppender, RecordLayout, Schema,
    TimeUnit,
};
use bytes::Bytes;
use proptest::prelude::*;

const HOUR_MS: i64 = 3_600_000;

fn schema() -> Schema {
    let sample = RecordLayout::new(
        "sample",
        vec![
            FieldDef::new("time", FieldType::Timestamp(TimeUnit::Milliseconds)),
            FieldDef::new("flag", FieldType::Byte),
            FieldDef::new("count", FieldType::Integer),
            FieldDef::new("total", FieldType::Long),
            FieldDef::new("price", FieldType::Decimal),
        ],
    )
    .unwrap();
    let event = RecordLayout::new(
        "event",
        vec![
            FieldDef::new("time", FieldType::Timestamp(TimeUnit::Milliseconds)),
            FieldDef::new("code", FieldType::Integer),
        ],
    )
    .unwrap();
    Schema::new(vec![sample, event], FixedPartitioner::from(PartitionDuration::Hourly)).unwrap()
}

/// Any decimal, sentinels included.
fn decimal_strategy() -> impl Strategy<Value = Decimal> {
    prop_oneof![
        8 => (any::<i64>(), -127i8..=127).prop_map(|(m, e)| Decimal::new(m, e)),
        1 => Just(Decimal::NAN),
        1 => Just(Decimal::POSITIVE_INFINITY),
        1 => Just(Decimal::NEGATIVE_INFINITY),
    ]
}

/// Finite decimals small enough that rescaling never overflows.
fn bounded_decimal_strategy() -> impl Strategy<Value = Decimal> {
    (-1_000_000_000i64..1_000_000_000, -4i8..=4).prop_map(|(m, e)| Decimal::new(m, e))
}

fn field_strategy() -> impl Strategy<Value = Field> {
    let unit = prop_oneof![
        Just(TimeUnit::Nanoseconds),
        Just(TimeUnit::Microseconds),
        Just(TimeUnit::Milliseconds),
        Just(TimeUnit::Seconds),
    ];
    prop_oneof![
        any::<i32>().prop_map(Field::Byte),
        any::<i32>().prop_map(Field::Integer),
        any::<i64>().prop_map(Field::Long),
        decimal_strategy().prop_map(Field::Decimal),
        (unit, any::<i64>()).prop_map(|(unit, raw)| Field::timestamp(unit, raw)),
    ]
}

fn sample(ts: i64, flag: i32, count: i32, total: i64, price: Decimal) -> Record {
    Record::from_fields(
        0,
        vec![
            Field::timestamp(TimeUnit::Milliseconds, ts),
            Field::Byte(flag),
            Field::Integer(count),
            Field::Long(total),
            Field::Decimal(price),
        ],
    )
    .unwrap()
}

fn event(ts: i64, code: i32) -> Record {
    Record::from_fields(
        1,
        vec![Field::timestamp(TimeUnit::Milliseconds, ts), Field::Integer(code)],
    )
    .unwrap()
}

fn sample_strategy() -> impl Strategy<Value = Record> {
    (
        any::<i64>(),
        -128i32..128,
        any::<i32>(),
        any::<i64>(),
        bounded_decimal_strategy(),
    )
        .prop_map(|(ts, flag, count, total, price)| sample(ts, flag, count, total, price))
}

/// Time-ordered records of both types, each up to `max_step` milliseconds
/// after the one before. Prices cover the full decimal range, sentinels
/// included.
fn stream_strategy(
    max_step: i64,
    len: std::ops::Range<usize>,
) -> impl Strategy<Value = Vec<Record>> {
    prop::collection::vec(
        (
            0..max_step,
            any::<bool>(),
            -100i32..100,
            any::<i32>(),
            decimal_strategy(),
        ),
        len,
    )
    .prop_map(|steps| {
        let mut ts = 1_700_000_000_000i64;
        steps
            .into_iter()
            .map(|(step, is_event, flag, count, price)| {
                ts += step;
                if is_event {
                    event(ts, count)
                } else {
                    sample(ts, flag, count, i64::from(count) * 3, price)
                }
            })
            .collect()
    })
}

fn decode_all(block: &DataBlock, schema: &Schema) -> Vec<Record> {
    block
        .records(schema)
        .unwrap()
        .collect::<alopex_tsblock::Result<Vec<_>>>()
        .unwrap()
}

proptest! {
    /// Every field value survives encoding, and the size prediction is exact.
    #[test]
    fn test_field_roundtrip(field in field_strategy()) {
        let mut buf = Vec::new();
        let written = field.write_to(&mut buf);
        prop_assert_eq!(written, buf.len());
        prop_assert_eq!(field.serialized_size(), buf.len());

        let mut slice = buf.as_slice();
        let decoded = Field::read_from(field.field_type(), &mut slice).unwrap();
        prop_assert!(slice.is_empty());
        prop_assert_eq!(decoded, field);
    }

    /// Records survive encoding through both the eager and the lazy reader.
    #[test]
    fn test_record_roundtrip(record in sample_strategy(), delta in any::<bool>()) {
        let schema = schema();
        let record = record.with_delta(delta);
        let mut buf = Vec::new();
        record.write_to(&mut buf);
        prop_assert_eq!(record.serialized_size(), buf.len());

        let bytes = Bytes::from(buf);
        let eager = Record::read_from(&schema, &mut bytes.clone()).unwrap();
        let lazy = LazyRecord::read_from(&schema, &mut bytes.clone()).unwrap();
        prop_assert_eq!(&eager, &record);
        prop_assert_eq!(lazy.to_record().unwrap(), record);
    }

    /// `r1 + (r2 - r1) == r2` for finite values.
    #[test]
    fn test_delta_reconstruction(r1 in sample_strategy(), r2 in sample_strategy()) {
        let mut delta = r2.clone();
        delta.subtract(&r1).unwrap();
        let mut rebuilt = r1.clone();
        rebuilt.add(&delta).unwrap();
        prop_assert_eq!(rebuilt, r2);
    }

    /// Blocks decode back to the appended records and count them per type.
    #[test]
    fn test_block_roundtrip(records in stream_strategy(10_000, 1..200)) {
        let schema = schema();
        let mut appender = RecordAppender::new(&schema, AppenderConfig::unbounded());
        for record in &records {
            prop_assert!(appender.append(record).unwrap());
        }
        let block = DataBlock::decode(&schema, appender.finish().to_bytes()).unwrap();

        let events = records.iter().filter(|r| r.record_type() == 1).count() as i64;
        prop_assert_eq!(block.header().count(1), events);
        prop_assert_eq!(block.header().count(0), records.len() as i64 - events);
        prop_assert_eq!(decode_all(&block, &schema), records);
    }

    /// No block exceeds the budget, and a rejected append changes nothing.
    #[test]
    fn test_size_budget(
        records in stream_strategy(1_000, 1..150),
        budget in 64usize..512,
    ) {
        let schema = schema();
        let config = AppenderConfig::default().with_block_size(budget);
        let mut appender = RecordAppender::new(&schema, config);
        let mut blocks = Vec::new();
        for record in &records {
            let before = appender.data_block();
            if !appender.append(record).unwrap() {
                prop_assert_eq!(&appender.data_block(), &before);
                blocks.push(before);
                appender.reset();
                prop_assert!(appender.append_or_overflow(record).unwrap());
            }
        }
        blocks.push(appender.finish());

        let mut rejoined = Vec::new();
        for block in &blocks {
            prop_assert!(block.encoded_len() <= budget);
            rejoined.extend(decode_all(block, &schema));
        }
        prop_assert_eq!(rejoined, records);
    }

    /// Splitting keeps every record exactly once, inside its own partition.
    #[test]
    fn test_split_completeness(records in stream_strategy(2 * HOUR_MS, 1..100)) {
        let schema = schema();
        let mut appender = RecordAppender::new(&schema, AppenderConfig::unbounded());
        for record in &records {
            appender.append(record).unwrap();
        }
        let block = appender.finish();
        let parts = split_block(&block, &schema).unwrap();

        let mut rejoined = Vec::new();
        for (range, part) in &parts {
            let span = part.time_range(&schema);
            prop_assert!(range.contains(span.start()));
            prop_assert!(range.contains(span.end() - 1));
            rejoined.extend(decode_all(part, &schema));
        }
        prop_assert_eq!(rejoined, records);

        let counted: usize = parts.values().map(DataBlock::record_count).sum();
        prop_assert_eq!(counted, block.record_count());
    }
}
