//! Criterion benchmarks for parameter building and row coercion

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rust_data_access::prelude::*;
use std::sync::Arc;

// ============================================================================
// Parameter Building Benchmarks
// ============================================================================

fn bench_parameter_building(c: &mut Criterion) {
    let mut group = c.benchmark_group("parameter_building");
    group.throughput(Throughput::Elements(1));

    group.bench_function("int", |b| {
        b.iter(|| black_box(black_box(42i32).to_param("@id")));
    });

    group.bench_function("string", |b| {
        b.iter(|| black_box(black_box("Alice").to_param("@name")));
    });

    group.bench_function("null_with_declared_type", |b| {
        b.iter(|| black_box(black_box(None::<i64>).to_param("@parent")));
    });

    group.bench_function("type_tag_lookup", |b| {
        b.iter(|| black_box(TypeMapper::tag_of::<chrono::NaiveDateTime>()));
    });

    group.finish();
}

fn bench_command_building(c: &mut Criterion) {
    let mut group = c.benchmark_group("command_building");

    for count in [1usize, 10, 50].iter() {
        group.throughput(Throughput::Elements(*count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), count, |b, &count| {
            b.iter(|| {
                let params = (0..count).map(|i| (i as i32).to_param(format!("@p{}", i)));
                black_box(build_command("INSERT INTO t VALUES (@p0)", params))
            });
        });
    }

    group.finish();
}

// ============================================================================
// Row Coercion Benchmarks
// ============================================================================

fn sample_row() -> DbRow {
    DbRow::from_pairs([
        ("id", DbValue::Int64(42)),
        ("name", DbValue::from("Alice")),
        ("balance", DbValue::from("1234.56")),
        ("external_id", DbValue::from("67e55044-10b1-426f-9247-bb680e5fe0c8")),
        ("created_at", DbValue::from("2024-03-01 12:30:00")),
        ("deleted_at", DbValue::Null),
    ])
}

fn bench_row_coercion(c: &mut Criterion) {
    let mut group = c.benchmark_group("row_coercion");
    group.throughput(Throughput::Elements(1));
    let row = sample_row();

    group.bench_function("get_int_from_i64", |b| {
        b.iter(|| black_box(get_int(black_box(&row), "id")));
    });

    group.bench_function("get_string", |b| {
        b.iter(|| black_box(get_string(black_box(&row), "name")));
    });

    group.bench_function("get_decimal_from_text", |b| {
        b.iter(|| black_box(get_decimal(black_box(&row), "balance")));
    });

    group.bench_function("get_guid_from_text", |b| {
        b.iter(|| black_box(get_guid(black_box(&row), "external_id")));
    });

    group.bench_function("get_date_from_text", |b| {
        b.iter(|| black_box(get_date(black_box(&row), "created_at")));
    });

    group.bench_function("get_date_nullable_null", |b| {
        b.iter(|| black_box(get_date_nullable(black_box(&row), "deleted_at")));
    });

    group.finish();
}

fn bench_row_mapping(c: &mut Criterion) {
    let mut group = c.benchmark_group("row_mapping");

    for width in [4usize, 16, 64].iter() {
        let columns: Arc<[String]> = (0..*width).map(|i| format!("c{}", i)).collect();
        let values = (0..*width).map(|i| DbValue::Int64(i as i64)).collect();
        let row = DbRow::new(columns, values);
        let last = format!("c{}", width - 1);

        group.bench_with_input(BenchmarkId::new("last_column", width), &row, |b, row| {
            b.iter(|| black_box(get_long(row, &last)));
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_parameter_building,
    bench_command_building,
    bench_row_coercion,
    bench_row_mapping
);
criterion_main!(benches);
