//! DataFile
//!
//! Random-access, byte-addressable view of one Key inside a Transaction.
//!
//! A DataFile is a handle, not the storage: the bytes live in a slot owned by
//! the issuing Transaction. Every operation checks that the transaction is
//! still active and fails with `InvalidState` once it has been published or
//! aborted.
//!
//! ## Read / write path
//! ```text
//!   read_at ──▶ PagedCache ──(miss)──▶ working stream
//!   write_at ─────────────────────────▶ working stream
//!                   └── invalidate_section(pos, len)
//! ```

use std::fmt;
use std::io::{self, Seek, SeekFrom, Write};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::address::Address;
use crate::cache::PagedCache;
use crate::error::{Result, StoreError};
use crate::key::Key;
use crate::storage::Stream;
use crate::transaction::TxnState;

/// Chunk size for copies between files
const COPY_CHUNK: usize = 64 * 1024;

/// How a DataFile handle may be used
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    ReadOnly,
    ReadWrite,
}

// =============================================================================
// File Slot (transaction-owned storage)
// =============================================================================

/// Working copy of one Key, owned by a Transaction
pub(crate) struct FileSlot {
    pub(crate) key: Key,

    /// Read cache over the working stream
    pub(crate) cache: PagedCache<Box<dyn Stream>>,

    /// Valid length; the stream is kept at exactly this size
    pub(crate) len: u64,

    /// Modified since the transaction started
    pub(crate) dirty: bool,

    /// A BinaryCollection currently indexes this file
    pub(crate) collection_open: bool,
}

impl FileSlot {
    pub(crate) fn new(key: Key, stream: Box<dyn Stream>, len: u64, page_size: usize) -> Self {
        Self {
            key,
            cache: PagedCache::new(stream, page_size),
            len,
            dirty: false,
            collection_open: false,
        }
    }

    fn read_at(&mut self, pos: u64, buf: &mut [u8], cache_page_limit: usize) -> Result<usize> {
        if pos >= self.len || buf.is_empty() {
            return Ok(0);
        }
        let want = buf.len().min((self.len - pos) as usize);
        self.cache.clear_cache(cache_page_limit);
        self.cache.read_full(pos, &mut buf[..want])?;
        Ok(want)
    }

    /// Fail unless `size` bytes at `pos` lie inside the file
    fn check_range(&self, pos: u64, size: u64) -> Result<()> {
        match pos.checked_add(size) {
            Some(end) if end <= self.len => Ok(()),
            _ => Err(StoreError::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("{} ends before byte {}", self.key, pos.saturating_add(size)),
            ))),
        }
    }

    /// Make sure the stream can hold `end` bytes before anything is changed
    fn grow_to(&mut self, end: u64) -> Result<()> {
        if end <= self.len {
            return Ok(());
        }
        self.cache.get_mut().reserve(end).map_err(|e| {
            StoreError::InvalidArgument(format!(
                "{} cannot grow to {end} bytes: {e}",
                self.key
            ))
        })
    }

    fn write_at(&mut self, pos: u64, buf: &[u8]) -> Result<()> {
        if buf.is_empty() {
            return Ok(());
        }
        let end = pos.checked_add(buf.len() as u64).ok_or_else(|| {
            StoreError::InvalidArgument(format!(
                "write of {} bytes at {pos} overflows the file size",
                buf.len()
            ))
        })?;
        self.grow_to(end)?;

        let stream = self.cache.get_mut();
        stream.seek(SeekFrom::Start(pos))?;
        stream.write_all(buf)?;

        // Gap between old end and pos is zero-filled by the stream
        let dirty_from = pos.min(self.len);
        self.cache.invalidate_section(dirty_from, end - dirty_from);
        self.len = self.len.max(end);
        self.dirty = true;
        Ok(())
    }

    fn set_len(&mut self, len: u64) -> Result<()> {
        if len == self.len {
            return Ok(());
        }
        self.grow_to(len)?;
        self.cache.get_mut().set_len(len)?;
        let (lo, hi) = if len < self.len { (len, self.len) } else { (self.len, len) };
        self.cache.invalidate_section(lo, hi - lo);
        self.len = len;
        self.dirty = true;
        Ok(())
    }
}

// =============================================================================
// DataFile Handle
// =============================================================================

/// Handle to a transaction-owned file
pub struct DataFile {
    /// Owning transaction's state (arena of slots)
    txn: Arc<Mutex<TxnState>>,

    txn_id: Address,

    /// Index of this file's slot in the arena
    slot: usize,

    key: Key,
    mode: AccessMode,

    /// Cursor for sequential read/write
    position: u64,

    cache_page_limit: usize,
}

impl DataFile {
    pub(crate) fn new(
        txn: Arc<Mutex<TxnState>>,
        txn_id: Address,
        slot: usize,
        key: Key,
        mode: AccessMode,
        cache_page_limit: usize,
    ) -> Self {
        Self {
            txn,
            txn_id,
            slot,
            key,
            mode,
            position: 0,
            cache_page_limit,
        }
    }

    pub fn key(&self) -> Key {
        self.key
    }

    pub fn mode(&self) -> AccessMode {
        self.mode
    }

    pub fn is_writable(&self) -> bool {
        self.mode == AccessMode::ReadWrite
    }

    /// Id of the owning transaction
    pub fn transaction_id(&self) -> Address {
        self.txn_id
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    /// Move the cursor to `position`, which must lie in `0..=len`
    pub fn set_position(&mut self, position: i64) -> Result<()> {
        if position < 0 {
            return Err(StoreError::InvalidArgument(format!(
                "negative position {position}"
            )));
        }
        let position = position as u64;
        let len = self.len()?;
        if position > len {
            return Err(StoreError::InvalidArgument(format!(
                "position {position} is past the end of {} ({len} bytes)",
                self.key
            )));
        }
        self.position = position;
        Ok(())
    }

    pub fn len(&self) -> Result<u64> {
        self.with_slot(|slot| Ok(slot.len))
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Pages fetched from the working copy by this file's read cache
    pub fn cache_misses(&self) -> Result<u64> {
        self.with_slot(|slot| Ok(slot.cache.cache_misses()))
    }

    // =========================================================================
    // Sequential I/O
    // =========================================================================

    /// Read from the cursor, advancing it by the bytes read (0 at end)
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let n = self.read_at(self.position, buf)?;
        self.position += n as u64;
        Ok(n)
    }

    /// Write at the cursor, advancing it; extends the file as needed
    pub fn write(&mut self, buf: &[u8]) -> Result<usize> {
        // Cursor writes never leave a gap: position <= len always holds
        self.write_at(self.position, buf)?;
        self.position += buf.len() as u64;
        Ok(buf.len())
    }

    // =========================================================================
    // Positional I/O (cursor untouched)
    // =========================================================================

    /// Read up to `buf.len()` bytes at `pos`; short only at end of file
    pub fn read_at(&self, pos: u64, buf: &mut [u8]) -> Result<usize> {
        let limit = self.cache_page_limit;
        self.with_slot(|slot| slot.read_at(pos, buf, limit))
    }

    /// Fill `buf` from `pos` or fail with `UnexpectedEof`
    pub fn read_exact_at(&self, pos: u64, buf: &mut [u8]) -> Result<()> {
        let n = self.read_at(pos, buf)?;
        if n < buf.len() {
            return Err(StoreError::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("{} ends before byte {}", self.key, pos + buf.len() as u64),
            )));
        }
        Ok(())
    }

    /// Write `buf` at `pos`; a gap past the current end reads back as zeros
    pub fn write_at(&mut self, pos: u64, buf: &[u8]) -> Result<()> {
        self.ensure_writable()?;
        self.with_slot(|slot| slot.write_at(pos, buf))
    }

    /// Truncate or extend; new bytes are zero. The cursor is clamped to the
    /// new length.
    pub fn set_len(&mut self, len: u64) -> Result<()> {
        self.ensure_writable()?;
        self.with_slot(|slot| slot.set_len(len))?;
        self.position = self.position.min(len);
        Ok(())
    }

    /// Copy the first `len` bytes of this file over `target`, which ends up
    /// exactly `len` bytes long
    ///
    /// Both handles must belong to the same live transaction.
    pub fn copy_to(&self, target: &mut DataFile, len: u64) -> Result<()> {
        if !Arc::ptr_eq(&self.txn, &target.txn) {
            return Err(StoreError::InvalidArgument(format!(
                "cannot copy {} into {}: different transactions",
                self.key, target.key
            )));
        }
        target.ensure_writable()?;

        let mut state = self.txn.lock();
        state.ensure_active()?;

        let src_len = state.slots[self.slot].len;
        if len > src_len {
            return Err(StoreError::InvalidArgument(format!(
                "copy length {len} exceeds {} bytes in {}",
                src_len, self.key
            )));
        }
        if self.slot == target.slot {
            return Ok(());
        }

        let limit = self.cache_page_limit;
        let (src, dst) = two_slots(&mut state.slots, self.slot, target.slot);
        dst.set_len(0)?;
        let mut chunk = vec![0u8; COPY_CHUNK.min(len as usize).max(1)];
        let mut pos = 0u64;
        while pos < len {
            let n = chunk.len().min((len - pos) as usize);
            src.read_at(pos, &mut chunk[..n], limit)?;
            dst.write_at(pos, &chunk[..n])?;
            pos += n as u64;
        }
        dst.dirty = true;
        drop(state);

        target.position = target.position.min(len);
        Ok(())
    }

    // =========================================================================
    // Framing Helpers
    // =========================================================================

    /// Big-endian u32 at `pos`; `UnexpectedEof` if it runs past the end
    pub(crate) fn read_u32_at(&self, pos: u64) -> Result<u32> {
        let limit = self.cache_page_limit;
        self.with_slot(|slot| {
            slot.check_range(pos, 4)?;
            slot.cache.clear_cache(limit);
            slot.cache.read_u32(pos)
        })
    }

    /// Big-endian u64 at `pos`; `UnexpectedEof` if it runs past the end
    pub(crate) fn read_u64_at(&self, pos: u64) -> Result<u64> {
        let limit = self.cache_page_limit;
        self.with_slot(|slot| {
            slot.check_range(pos, 8)?;
            slot.cache.clear_cache(limit);
            slot.cache.read_u64(pos)
        })
    }

    /// Mark this file as indexed by a collection; only one at a time
    pub(crate) fn claim_collection(&self) -> Result<()> {
        self.with_slot(|slot| {
            if slot.collection_open {
                return Err(StoreError::InvalidState(format!(
                    "{} is already open as a collection in this transaction",
                    slot.key
                )));
            }
            slot.collection_open = true;
            Ok(())
        })
    }

    /// Release the claim; a no-op once the transaction has ended
    pub(crate) fn release_collection(&self) {
        let mut state = self.txn.lock();
        if let Some(slot) = state.slots.get_mut(self.slot) {
            slot.collection_open = false;
        }
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn ensure_writable(&self) -> Result<()> {
        if self.mode == AccessMode::ReadOnly {
            return Err(StoreError::AccessDenied(format!(
                "{} was opened read-only",
                self.key
            )));
        }
        Ok(())
    }

    /// Run `f` on this handle's slot while the transaction is active
    fn with_slot<R>(&self, f: impl FnOnce(&mut FileSlot) -> Result<R>) -> Result<R> {
        let mut state = self.txn.lock();
        state.ensure_active()?;
        f(&mut state.slots[self.slot])
    }
}

/// Disjoint mutable borrows of two slots, `a != b`
fn two_slots(slots: &mut [FileSlot], a: usize, b: usize) -> (&mut FileSlot, &mut FileSlot) {
    if a < b {
        let (left, right) = slots.split_at_mut(b);
        (&mut left[a], &mut right[0])
    } else {
        let (left, right) = slots.split_at_mut(a);
        (&mut right[0], &mut left[b])
    }
}

impl fmt::Debug for DataFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataFile")
            .field("key", &self.key)
            .field("mode", &self.mode)
            .field("position", &self.position)
            .field("transaction", &self.txn_id)
            .finish()
    }
}

// =============================================================================
// std::io adapters
// =============================================================================

fn to_io(e: StoreError) -> io::Error {
    match e {
        StoreError::Io(e) => e,
        StoreError::AccessDenied(msg) => io::Error::new(io::ErrorKind::PermissionDenied, msg),
        StoreError::InvalidArgument(msg) => io::Error::new(io::ErrorKind::InvalidInput, msg),
        other => io::Error::new(io::ErrorKind::Other, other.to_string()),
    }
}

impl io::Read for DataFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        DataFile::read(self, buf).map_err(to_io)
    }
}

impl io::Write for DataFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        DataFile::write(self, buf).map_err(to_io)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl io::Seek for DataFile {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(p) => p as i128,
            SeekFrom::Current(d) => self.position as i128 + d as i128,
            SeekFrom::End(d) => self.len().map_err(to_io)? as i128 + d as i128,
        };
        let target = i64::try_from(target)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "seek out of range"))?;
        self.set_position(target).map_err(to_io)?;
        Ok(self.position)
    }
}
