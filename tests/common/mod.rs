//! Shared fixtures for integration tests
//!
//! Fixtures that touch a shared directory take an explicit [`FixtureGate`]
//! instead of relying on a process-wide lock.

#![allow(dead_code)]

use parking_lot::{Mutex, MutexGuard};
use shardstore::{Config, Database};
use tempfile::TempDir;

/// Serializes setup/teardown of fixtures that share storage
#[derive(Default)]
pub struct FixtureGate {
    lock: Mutex<()>,
}

impl FixtureGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enter(&self) -> MutexGuard<'_, ()> {
        self.lock.lock()
    }
}

/// Started in-memory database
pub fn memory_db() -> Database {
    let db = Database::open(Config::default()).unwrap();
    db.start().unwrap();
    db
}

/// Started in-memory database with a small cache page size
pub fn memory_db_with_page_size(page_size: usize) -> Database {
    let config = Config::builder().page_size(page_size).build();
    let db = Database::open(config).unwrap();
    db.start().unwrap();
    db
}

pub fn fs_config(dir: &TempDir) -> Config {
    Config::builder()
        .filesystem(dir.path())
        .sync_on_publish(false)
        .build()
}

/// Started filesystem database over `dir`
pub fn fs_db(gate: &FixtureGate, dir: &TempDir) -> Database {
    let _guard = gate.enter();
    let db = Database::open(fs_config(dir)).unwrap();
    db.start().unwrap();
    db
}

/// Stop `db` under the gate
pub fn stop_db(gate: &FixtureGate, db: Database) {
    let _guard = gate.enter();
    db.stop().unwrap();
}

/// 16-byte record: big-endian u64 key followed by a u64 payload
pub fn record(key: u64, payload: u64) -> Vec<u8> {
    let mut v = Vec::with_capacity(16);
    v.extend_from_slice(&key.to_be_bytes());
    v.extend_from_slice(&payload.to_be_bytes());
    v
}
