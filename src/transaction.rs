//! Transaction
//!
//! Snapshot-isolated view of a Database that issues DataFile handles and
//! buffers every mutation in private working copies until publish.
//!
//! ## Ownership
//! The transaction owns an arena of file slots. DataFile handles are
//! `(transaction state, slot index)` pairs; ending the transaction drops all
//! slots at once and turns every outstanding handle into an error.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::address::Address;
use crate::database::{Shared, Snapshot};
use crate::datafile::{AccessMode, DataFile, FileSlot};
use crate::error::{Result, StoreError};
use crate::key::Key;

/// Where a transaction is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionStatus {
    Active,
    Published,
    Aborted,
}

/// Mutable state shared between a Transaction and its DataFiles
pub(crate) struct TxnState {
    pub(crate) id: Address,
    pub(crate) status: TransactionStatus,

    /// Arena of working copies, indexed by DataFile::slot
    pub(crate) slots: Vec<FileSlot>,

    /// Key → slot index
    pub(crate) by_key: HashMap<Key, usize>,
}

impl TxnState {
    pub(crate) fn ensure_active(&self) -> Result<()> {
        match self.status {
            TransactionStatus::Active => Ok(()),
            status => Err(StoreError::InvalidState(format!(
                "transaction {} has ended ({:?})",
                self.id, status
            ))),
        }
    }

    /// Release every slot and mark the transaction finished
    pub(crate) fn end(&mut self, status: TransactionStatus) {
        self.status = status;
        self.slots.clear();
        self.by_key.clear();
    }
}

/// Isolated unit of work against a Database
pub struct Transaction {
    id: Address,

    /// Owning database
    pub(crate) shared: Arc<Shared>,

    /// Committed state as of creation
    snapshot: Arc<Snapshot>,

    pub(crate) state: Arc<Mutex<TxnState>>,
}

impl Transaction {
    pub(crate) fn new(shared: Arc<Shared>, snapshot: Arc<Snapshot>, sequence: u64) -> Self {
        let id = Address::new(snapshot.generation as i64, sequence);
        let state = TxnState {
            id,
            status: TransactionStatus::Active,
            slots: Vec::new(),
            by_key: HashMap::new(),
        };
        Self {
            id,
            shared,
            snapshot,
            state: Arc::new(Mutex::new(state)),
        }
    }

    /// `(snapshot generation, sequence)`
    pub fn id(&self) -> Address {
        self.id
    }

    /// Generation of the committed snapshot this transaction reads
    pub fn snapshot_generation(&self) -> u64 {
        self.snapshot.generation
    }

    pub fn status(&self) -> TransactionStatus {
        self.state.lock().status
    }

    pub fn is_active(&self) -> bool {
        self.status() == TransactionStatus::Active
    }

    /// Open or create the file at `key`
    ///
    /// The first open of a key materializes a private working copy of its
    /// committed content. Later opens in the same transaction share that copy
    /// but get their own cursor and access mode.
    pub fn get_file(&self, key: Key, mode: AccessMode) -> Result<DataFile> {
        self.shared.ensure_started()?;

        let mut state = self.state.lock();
        state.ensure_active()?;

        let slot = match state.by_key.get(&key) {
            Some(&slot) => slot,
            None => {
                let mut stream = self.shared.backend.scratch()?;
                let len = match self.snapshot.files.get(&key) {
                    Some(blob) => blob.copy_into(&mut stream)?,
                    None => 0,
                };
                let page_size = self.shared.config.page_size;
                state.slots.push(FileSlot::new(key, stream, len, page_size));
                let slot = state.slots.len() - 1;
                state.by_key.insert(key, slot);
                tracing::trace!(txn = %self.id, key = %key, len, "Opened working copy");
                slot
            }
        };

        Ok(DataFile::new(
            Arc::clone(&self.state),
            self.id,
            slot,
            key,
            mode,
            self.shared.config.cache_page_limit,
        ))
    }

    /// Whether `key` exists in the snapshot or was opened here
    pub fn contains_file(&self, key: &Key) -> Result<bool> {
        let state = self.state.lock();
        state.ensure_active()?;
        Ok(self.snapshot.files.contains_key(key) || state.by_key.contains_key(key))
    }

    /// Every visible key, sorted
    pub fn keys(&self) -> Result<Vec<Key>> {
        let state = self.state.lock();
        state.ensure_active()?;
        let keys: BTreeSet<Key> = self
            .snapshot
            .files
            .keys()
            .chain(state.by_key.keys())
            .copied()
            .collect();
        Ok(keys.into_iter().collect())
    }

    /// Keys modified in this transaction, sorted
    pub fn modified_keys(&self) -> Result<Vec<Key>> {
        let state = self.state.lock();
        state.ensure_active()?;
        let mut keys: Vec<Key> = state
            .slots
            .iter()
            .filter(|s| s.dirty)
            .map(|s| s.key)
            .collect();
        keys.sort();
        Ok(keys)
    }

    /// End the transaction, discarding its changes
    pub fn abort(self) {
        // Drop does the work
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        let mut state = self.state.lock();
        if state.status == TransactionStatus::Active {
            tracing::debug!(txn = %self.id, "Transaction aborted");
            state.end(TransactionStatus::Aborted);
        }
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.id)
            .field("status", &self.status())
            .finish()
    }
}
