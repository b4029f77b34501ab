//! Criterion benchmarks for rust_sql_bridge

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rust_sql_bridge::backends::scripted::{ScriptedColumn, ScriptedResult, ScriptedTransport};
use rust_sql_bridge::core::diagnostics::clean_message;
use rust_sql_bridge::prelude::*;
use std::sync::Arc;

const SQL: &str = "SELECT id, name, note FROM t";

fn connection(rows: usize) -> Connection {
    let mut result = ScriptedResult::new(vec![
        ScriptedColumn::new("id").display_size(11),
        ScriptedColumn::new("name").display_size(40),
        ScriptedColumn::new("note").display_size(-1),
    ]);
    for i in 0..rows {
        let id = i.to_string();
        result = result.row(vec![Some(id.as_str()), Some("benchmark row"), None]);
    }
    let mut conn = Connection::init(Arc::new(ScriptedTransport::new().with_result(SQL, result)));
    conn.connect(None, None, None, Some("bench"), 0, None, 0)
        .expect("connect");
    conn
}

// ============================================================================
// Result Retrieval Benchmarks
// ============================================================================

fn bench_store_result(c: &mut Criterion) {
    let mut group = c.benchmark_group("store_result");

    for size in [10, 100, 1000].iter() {
        let mut conn = connection(*size);
        group.throughput(Throughput::Elements(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| {
                conn.query(SQL).expect("query");
                let mut result = conn.store_result().expect("store").expect("rows");
                while let Some(row) = result.fetch_row() {
                    black_box(row.get(1));
                }
            });
        });
    }

    group.finish();
}

fn bench_use_result(c: &mut Criterion) {
    let mut group = c.benchmark_group("use_result");

    for size in [10, 100, 1000].iter() {
        let mut conn = connection(*size);
        group.throughput(Throughput::Elements(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| {
                conn.query(SQL).expect("query");
                let mut result = conn.use_result().expect("use").expect("rows");
                while let Some(row) = result.fetch_row() {
                    black_box(row.get(1));
                }
            });
        });
    }

    group.finish();
}

// ============================================================================
// Diagnostic Benchmarks
// ============================================================================

fn bench_clean_message(c: &mut Criterion) {
    let mut group = c.benchmark_group("clean_message");
    group.throughput(Throughput::Elements(1));

    group.bench_function("tagged", |b| {
        b.iter(|| {
            black_box(clean_message(black_box(
                "[iODBC][Driver Manager] Data source name not found and no default driver specified\n",
            )))
        });
    });

    group.bench_function("plain", |b| {
        b.iter(|| black_box(clean_message(black_box("no such table: t"))));
    });

    group.finish();
}

fn bench_config_json(c: &mut Criterion) {
    let json = BridgeConfig::default().to_json().expect("serializable");

    c.bench_function("config_from_json", |b| {
        b.iter(|| black_box(BridgeConfig::from_json(black_box(&json)).expect("valid")));
    });
}

criterion_group!(
    benches,
    bench_store_result,
    bench_use_result,
    bench_clean_message,
    bench_config_json
);
criterion_main!(benches);
