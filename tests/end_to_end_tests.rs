//! End-to-end tests
//!
//! A full pass through transaction, data file, collection and publish, on
//! both backends.

mod common;

use tempfile::TempDir;

use shardstore::{AccessMode, BinaryCollection, Database, Key};

use common::{fs_db, memory_db, record, stop_db, FixtureGate};

// =============================================================================
// Helper Functions
// =============================================================================

const RECORDS: u64 = 5000;

/// Keys removed on top of the 21 lowest
const EXTRA_REMOVED: [u64; 8] = [100, 257, 999, 1024, 2500, 3333, 4096, 4999];

/// Keys that must survive
const SURVIVORS: [u64; 8] = [21, 22, 101, 1000, 2048, 3000, 4095, 4998];

fn index_key() -> Key {
    Key::new(42, 0, 1)
}

/// Record payloads are derived from the key so they can be rebuilt for lookups
fn entry(k: u64) -> Vec<u8> {
    record(k, k.wrapping_mul(0x9e37_79b9_7f4a_7c15))
}

fn build_and_prune(db: &Database) {
    let txn = db.create_transaction().unwrap();
    let mut file = txn.get_file(index_key(), AccessMode::ReadWrite).unwrap();
    let mut set = BinaryCollection::open(&mut file).unwrap();

    for k in 0..RECORDS {
        assert!(set.add(&entry(k)).unwrap());
    }
    assert_eq!(set.len() as u64, RECORDS);

    // The 21 lowest, taken off the front through the cursor
    {
        let mut cursor = set.cursor();
        for _ in 0..21 {
            assert!(cursor.move_next().unwrap());
            assert!(cursor.remove_current().unwrap());
        }
    }
    for k in EXTRA_REMOVED {
        assert!(set.remove(&entry(k)).unwrap());
    }
    assert_eq!(set.len() as u64, RECORDS - 21 - EXTRA_REMOVED.len() as u64);

    drop(set);
    db.publish(&txn).unwrap();
}

fn verify(db: &Database) {
    let txn = db.create_transaction().unwrap();
    let mut file = txn.get_file(index_key(), AccessMode::ReadOnly).unwrap();
    let set = BinaryCollection::open(&mut file).unwrap();

    assert_eq!(set.len() as u64, RECORDS - 29);
    assert_eq!(set.first().unwrap(), entry(21).as_slice());
    assert_eq!(set.last().unwrap(), entry(4998).as_slice());

    for k in (0..21).chain(EXTRA_REMOVED) {
        let value = entry(k);
        assert!(!set.contains(&value).unwrap(), "key {k} still present");

        let tail = set.tail(&value).unwrap();
        assert!(!tail.contains(&value).unwrap());
        if let Ok(first) = tail.first() {
            assert!(first.as_bytes() > value.as_slice());
        }
    }

    for k in SURVIVORS {
        let value = entry(k);
        assert!(set.contains(&value).unwrap(), "key {k} missing");
        let tail = set.tail(&value).unwrap();
        assert_eq!(tail.first().unwrap(), value.as_slice());
    }

    // Ascending by the big-endian key prefix
    let mut previous = None;
    for value in set.iter() {
        let value = value.unwrap();
        let mut prefix = [0u8; 8];
        prefix.copy_from_slice(&value[..8]);
        let k = u64::from_be_bytes(prefix);
        assert!(previous.map_or(true, |p| p < k));
        previous = Some(k);
    }
}

// =============================================================================
// Tests
// =============================================================================

#[test]
fn test_index_build_and_prune_in_memory() {
    let db = memory_db();
    build_and_prune(&db);
    verify(&db);
}

#[test]
fn test_index_build_and_prune_survives_restart() {
    let gate = FixtureGate::new();
    let dir = TempDir::new().unwrap();

    let db = fs_db(&gate, &dir);
    build_and_prune(&db);
    verify(&db);
    stop_db(&gate, db);

    let db = fs_db(&gate, &dir);
    verify(&db);
    stop_db(&gate, db);
}
