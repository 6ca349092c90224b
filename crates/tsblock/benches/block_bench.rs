//! Benchmarks for block encoding.
//!
//! Run with: cargo bench --package alopex-tsblock
//!
//! ## Benchmark Categories
//!
//! - **Appender**: Delta-encoding records into blocks
//! - **Decode**: Eager reconstruction vs. lazy single-field scans
//! - **Split**: Realigning a multi-partition block

use alopex_tsblock::{
    split_block, AppenderConfig, DataBlock, Decimal, Field, FieldAccess, FieldDef, FieldType,
    FixedPartitioner, PartitionDuration, Record, RecordAppender, RecordLayout, Schema, TimeUnit,
};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

fn quote_schema() -> Schema {
    let layout = RecordLayout::new(
        "quote",
        vec![
            FieldDef::new("time", FieldType::Timestamp(TimeUnit::Milliseconds)),
            FieldDef::new("bid", FieldType::Decimal),
            FieldDef::new("ask", FieldType::Decimal),
            FieldDef::new("bidSize", FieldType::Long),
            FieldDef::new("askSize", FieldType::Long),
        ],
    )
    .unwrap();
    Schema::new(vec![layout], FixedPartitioner::from(PartitionDuration::Hourly)).unwrap()
}

/// Generate quotes at regular intervals with slowly drifting prices.
fn generate_quotes(count: usize, interval_ms: i64) -> Vec<Record> {
    let start_ts = 1_700_000_000_000_i64;
    (0..count)
        .map(|i| {
            let drift = ((i as f64 * 0.1).sin() * 50.0) as i64;
            Record::from_fields(
                0,
                vec![
                    Field::timestamp(TimeUnit::Milliseconds, start_ts + i as i64 * interval_ms),
                    Field::Decimal(Decimal::new(10_000 + drift, -2)),
                    Field::Decimal(Decimal::new(10_005 + drift, -2)),
                    Field::Long(100 + (i % 7) as i64 * 10),
                    Field::Long(200 - (i % 5) as i64 * 10),
                ],
            )
            .unwrap()
        })
        .collect()
}

fn encode(schema: &Schema, records: &[Record]) -> DataBlock {
    let mut appender = RecordAppender::new(schema, AppenderConfig::unbounded());
    for record in records {
        appender.append(record).unwrap();
    }
    appender.finish()
}

fn bench_append(c: &mut Criterion) {
    let schema = quote_schema();
    let mut group = c.benchmark_group("append");

    for count in [1_000, 10_000] {
        let records = generate_quotes(count, 250);
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &records, |b, records| {
            b.iter(|| encode(&schema, black_box(records)))
        });
    }

    group.finish();
}

fn bench_decode(c: &mut Criterion) {
    let schema = quote_schema();
    let block = encode(&schema, &generate_quotes(10_000, 250));
    let mut group = c.benchmark_group("decode_10k");
    group.throughput(Throughput::Elements(10_000));

    group.bench_function("records", |b| {
        b.iter(|| {
            block
                .records(&schema)
                .unwrap()
                .map(|r| r.unwrap())
                .count()
        })
    });

    group.bench_function("raw_timestamps", |b| {
        b.iter(|| {
            block
                .raw_records(&schema)
                .unwrap()
                .map(|r| r.unwrap().field(0).unwrap().as_i64().unwrap())
                .sum::<i64>()
        })
    });

    group.bench_function("from_bytes", |b| {
        let bytes = block.to_bytes();
        b.iter(|| DataBlock::decode(&schema, black_box(bytes.clone())).unwrap())
    });

    group.finish();
}

fn bench_split(c: &mut Criterion) {
    let schema = quote_schema();
    // 10k quotes one second apart span three hourly partitions.
    let block = encode(&schema, &generate_quotes(10_000, 1_000));
    let single = encode(&schema, &generate_quotes(1_000, 100));

    let mut group = c.benchmark_group("split");
    group.bench_function("three_partitions_10k", |b| {
        b.iter(|| split_block(black_box(&block), &schema).unwrap())
    });
    group.bench_function("single_partition_1k", |b| {
        b.iter(|| split_block(black_box(&single), &schema).unwrap())
    });
    group.finish();
}

criterion_group!(benches, bench_append, bench_decode, bench_split);
criterion_main!(benches);
