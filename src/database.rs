//! Database Module
//!
//! Lifecycle, transaction creation, and the publish commit boundary.
//!
//! ## Responsibilities
//! - Resolve and own the storage backend
//! - Recover committed state on start
//! - Hand out snapshot-isolated Transactions
//! - Publish a transaction's modified files atomically

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::config::Config;
use crate::error::{Result, StoreError};
use crate::key::Key;
use crate::storage::{BackendRegistry, Blob, Staged, StorageBackend};
use crate::transaction::{Transaction, TransactionStatus};

/// Committed file set at one generation
///
/// Immutable once built; publish swaps in a new one.
pub(crate) struct Snapshot {
    pub(crate) generation: u64,
    pub(crate) files: HashMap<Key, Arc<dyn Blob>>,
}

impl Snapshot {
    fn empty() -> Self {
        Self {
            generation: 0,
            files: HashMap::new(),
        }
    }
}

/// Database lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Created,
    Started,
    Stopped,
}

/// State shared by a Database and every Transaction it creates
pub(crate) struct Shared {
    pub(crate) config: Config,
    pub(crate) backend: Box<dyn StorageBackend>,
    lifecycle: RwLock<Lifecycle>,

    /// Current committed snapshot, replaced whole on publish
    committed: RwLock<Arc<Snapshot>>,

    /// Serializes publishers
    publish_lock: Mutex<()>,

    next_txn: AtomicU64,
}

impl Shared {
    pub(crate) fn ensure_started(&self) -> Result<()> {
        match *self.lifecycle.read() {
            Lifecycle::Started => Ok(()),
            other => Err(StoreError::InvalidState(format!(
                "database is {:?}, expected Started",
                other
            ))),
        }
    }
}

/// Outcome of a successful publish
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublishReport {
    /// Generation visible to transactions created from now on
    pub generation: u64,
    pub files_written: usize,
    pub bytes_written: u64,
}

/// Transactional, key-addressed file store
///
/// ## Concurrency Model
/// - `create_transaction` and reads of the committed snapshot take a read lock
/// - `publish` is serialized by `publish_lock`; the new snapshot becomes
///   visible in one pointer swap, so a transaction sees all of a publish or
///   none of it
/// - `start`/`stop` against the same directory must be serialized by the caller
pub struct Database {
    shared: Arc<Shared>,
}

impl Database {
    /// Create a database using the default backend registry
    ///
    /// Unknown `config.backend` identifiers fail with `NotSupported`.
    pub fn open(config: Config) -> Result<Self> {
        Self::open_with_registry(config, &BackendRegistry::with_defaults())
    }

    /// Create a database resolving the backend through `registry`
    pub fn open_with_registry(config: Config, registry: &BackendRegistry) -> Result<Self> {
        config.validate()?;
        let backend = registry.create(&config)?;
        Ok(Self::with_backend(config, backend))
    }

    /// Create a database over an already-built backend
    pub fn with_backend(config: Config, backend: Box<dyn StorageBackend>) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                backend,
                lifecycle: RwLock::new(Lifecycle::Created),
                committed: RwLock::new(Arc::new(Snapshot::empty())),
                publish_lock: Mutex::new(()),
                next_txn: AtomicU64::new(1),
            }),
        }
    }

    /// In-memory database with default settings
    pub fn in_memory() -> Result<Self> {
        Self::open(Config::default())
    }

    /// Recover committed state and begin accepting transactions
    pub fn start(&self) -> Result<()> {
        let mut lifecycle = self.shared.lifecycle.write();
        if *lifecycle != Lifecycle::Created {
            return Err(StoreError::InvalidState(format!(
                "cannot start a database that is {:?}",
                *lifecycle
            )));
        }

        let recovered = self.shared.backend.recover()?;
        let file_count = recovered.len();
        let snapshot = Snapshot {
            generation: 0,
            files: recovered.into_iter().collect(),
        };
        *self.shared.committed.write() = Arc::new(snapshot);
        *lifecycle = Lifecycle::Started;

        tracing::info!(
            backend = self.shared.backend.name(),
            files = file_count,
            "Database started"
        );
        Ok(())
    }

    /// Stop accepting transactions and release the backend
    ///
    /// Existing transactions can no longer open files or publish.
    pub fn stop(&self) -> Result<()> {
        {
            let mut lifecycle = self.shared.lifecycle.write();
            if *lifecycle != Lifecycle::Started {
                return Err(StoreError::InvalidState(format!(
                    "cannot stop a database that is {:?}",
                    *lifecycle
                )));
            }
            *lifecycle = Lifecycle::Stopped;
        }

        // Wait out an in-flight publish before releasing anything
        let _publish = self.shared.publish_lock.lock();
        *self.shared.committed.write() = Arc::new(Snapshot::empty());
        self.shared.backend.shutdown()?;

        tracing::info!(backend = self.shared.backend.name(), "Database stopped");
        Ok(())
    }

    pub fn lifecycle(&self) -> Lifecycle {
        *self.shared.lifecycle.read()
    }

    pub fn is_started(&self) -> bool {
        self.lifecycle() == Lifecycle::Started
    }

    /// Begin a transaction reading the current committed snapshot
    pub fn create_transaction(&self) -> Result<Transaction> {
        self.shared.ensure_started()?;
        let snapshot = Arc::clone(&self.shared.committed.read());
        let sequence = self.shared.next_txn.fetch_add(1, Ordering::SeqCst);
        let txn = Transaction::new(Arc::clone(&self.shared), snapshot, sequence);
        tracing::debug!(txn = %txn.id(), "Transaction created");
        Ok(txn)
    }

    /// Commit every file `transaction` modified, then end it
    ///
    /// Steps:
    /// 1. Validate ownership and state
    /// 2. Hand modified working copies to the backend (atomic on its side)
    /// 3. Swap in the new committed snapshot
    /// 4. Release the transaction's files
    ///
    /// On error the transaction stays active and nothing becomes visible.
    /// A read-only database refuses any publish that carries changes.
    pub fn publish(&self, transaction: &Transaction) -> Result<PublishReport> {
        if !Arc::ptr_eq(&self.shared, &transaction.shared) {
            return Err(StoreError::InvalidArgument(format!(
                "transaction {} belongs to another database",
                transaction.id()
            )));
        }
        let _publish = self.shared.publish_lock.lock();
        self.shared.ensure_started()?;

        let mut state = transaction.state.lock();
        state.ensure_active()?;

        let current = Arc::clone(&self.shared.committed.read());
        let mut staged: Vec<Staged<'_>> = state
            .slots
            .iter_mut()
            .filter(|slot| slot.dirty)
            .map(|slot| Staged {
                key: slot.key,
                len: slot.len,
                stream: &mut **slot.cache.get_mut(),
            })
            .collect();

        if staged.is_empty() {
            drop(staged);
            state.end(TransactionStatus::Published);
            return Ok(PublishReport {
                generation: current.generation,
                files_written: 0,
                bytes_written: 0,
            });
        }

        if self.shared.config.read_only {
            return Err(StoreError::AccessDenied(
                "database is open read-only".to_string(),
            ));
        }

        let generation = current.generation + 1;
        let bytes_written: u64 = staged.iter().map(|s| s.len).sum();
        let written = self.shared.backend.persist(generation, &mut staged)?;
        drop(staged);

        let files_written = written.len();
        let mut files = current.files.clone();
        files.extend(written);
        *self.shared.committed.write() = Arc::new(Snapshot { generation, files });

        state.end(TransactionStatus::Published);

        tracing::debug!(
            txn = %transaction.id(),
            generation,
            files = files_written,
            bytes = bytes_written,
            "Transaction published"
        );
        Ok(PublishReport {
            generation,
            files_written,
            bytes_written,
        })
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Generation of the current committed snapshot
    pub fn generation(&self) -> u64 {
        self.shared.committed.read().generation
    }

    /// Published keys, sorted
    pub fn committed_keys(&self) -> Result<Vec<Key>> {
        self.shared.ensure_started()?;
        let mut keys: Vec<Key> = self.shared.committed.read().files.keys().copied().collect();
        keys.sort();
        Ok(keys)
    }

    pub fn backend_name(&self) -> &str {
        self.shared.backend.name()
    }

    pub fn config(&self) -> &Config {
        &self.shared.config
    }
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database")
            .field("backend", &self.backend_name())
            .field("lifecycle", &self.lifecycle())
            .field("generation", &self.generation())
            .finish()
    }
}
