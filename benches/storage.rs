//! Storage benchmark: flow and alert inserts, alert lookup.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use flowwatch::flow::{Alert, FlowGenerator};
use flowwatch::storage::SqliteStore;
use tempfile::tempdir;

fn bench_insert_flow(c: &mut Criterion) {
    let dir = tempdir().unwrap();
    let store = SqliteStore::open(&dir.path().join("flows.db")).unwrap();
    let flow = FlowGenerator::new(1).normal();

    c.bench_function("storage_insert_flow", |b| {
        b.iter(|| black_box(store.write_flow(black_box(&flow))).unwrap())
    });
}

fn bench_insert_and_get_alert(c: &mut Criterion) {
    let dir = tempdir().unwrap();
    let store = SqliteStore::open(&dir.path().join("flows.db")).unwrap();
    let flow = FlowGenerator::new(1).anomalous();

    c.bench_function("storage_insert_alert", |b| {
        b.iter(|| {
            let alert = Alert::from_flow(&flow, 0.1, "isolation_forest");
            black_box(store.write_alert(&alert)).unwrap()
        })
    });

    let id = store
        .write_alert(&Alert::from_flow(&flow, 0.1, "isolation_forest"))
        .unwrap();
    c.bench_function("storage_get_alert", |b| {
        b.iter(|| black_box(store.get_alert(&id)).unwrap())
    });
}

criterion_group!(benches, bench_insert_flow, bench_insert_and_get_alert);
criterion_main!(benches);
