//! Benchmarks for shardstore collection operations

use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use shardstore::{AccessMode, BinaryCollection, Database, Key};

const RECORDS: u64 = 2000;

fn record(k: u64) -> [u8; 16] {
    let mut out = [0u8; 16];
    out[..8].copy_from_slice(&k.to_be_bytes());
    out[8..].copy_from_slice(&(!k).to_be_bytes());
    out
}

fn started_db() -> Database {
    let db = Database::in_memory().unwrap();
    db.start().unwrap();
    db
}

fn collection_benchmarks(c: &mut Criterion) {
    c.bench_function("collection_add_ascending", |b| {
        b.iter_batched(
            started_db,
            |db| {
                let txn = db.create_transaction().unwrap();
                let mut file = txn.get_file(Key::new(1, 0, 1), AccessMode::ReadWrite).unwrap();
                let mut set = BinaryCollection::open(&mut file).unwrap();
                for k in 0..RECORDS {
                    set.add(&record(k)).unwrap();
                }
            },
            BatchSize::SmallInput,
        );
    });

    let db = started_db();
    let txn = db.create_transaction().unwrap();
    let mut file = txn.get_file(Key::new(1, 0, 1), AccessMode::ReadWrite).unwrap();
    let mut set = BinaryCollection::open(&mut file).unwrap();
    for k in 0..RECORDS {
        set.add(&record(k)).unwrap();
    }

    let mut probe = 0u64;
    c.bench_function("collection_contains", |b| {
        b.iter(|| {
            probe = (probe + 7919) % (RECORDS * 2);
            black_box(set.contains(&record(probe)).unwrap())
        })
    });
}

criterion_group!(benches, collection_benchmarks);
criterion_main!(benches);
