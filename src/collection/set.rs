//! BinaryCollection
//!
//! Sorted, duplicate-free records spliced directly into a DataFile.

use std::cmp::Ordering;

use crate::datafile::DataFile;
use crate::error::{Result, StoreError};

use super::cursor::{Cursor, Iter};
use super::tail::Tail;
use super::{Binary, COUNT_OFFSET, HEADER_SIZE, LEN_PREFIX, MAGIC, MAX_VALUE_LEN, VERSION};

/// Bytes moved per step when shifting the record region
const SHIFT_CHUNK: u64 = 64 * 1024;

/// Persistent ordered set of binary values inside one DataFile
///
/// Holds a borrowed handle; the Transaction owns the file. Mutations are
/// visible to other handles on the same key right away and become durable
/// when the transaction is published. Only one collection may index a given
/// file per transaction at a time, since each keeps its own offset table.
///
/// ## Costs
/// - `open`: one length-prefix read per record
/// - `contains` / `tail`: O(log n) record reads
/// - `add` / `remove`: O(log n) reads plus an O(bytes after the splice point)
///   shift
/// - `len`: O(1)
pub struct BinaryCollection<'f> {
    file: &'f mut DataFile,

    /// Start offset of every record, ascending
    offsets: Vec<u64>,

    /// End of the last record (== file length)
    end: u64,

    /// Longest value `add` accepts
    max_value_len: usize,
}

impl<'f> BinaryCollection<'f> {
    /// Wrap `file`, initializing it when empty
    ///
    /// A non-empty file has its header checked and its record offsets
    /// loaded:
    /// 1. Check magic and version
    /// 2. Walk the length prefixes to the end of the file
    /// 3. Check the stored count
    ///
    /// Value order is not re-checked here; see [`verify`](Self::verify).
    /// Fails with `InvalidState` while another collection on the same key is
    /// open in this transaction.
    pub fn open(file: &'f mut DataFile) -> Result<Self> {
        file.claim_collection()?;
        let index = match Self::load_offsets(file) {
            Ok(index) => index,
            Err(e) => {
                file.release_collection();
                return Err(e);
            }
        };

        let fresh = index.is_none();
        let (offsets, end) = index.unwrap_or((Vec::new(), HEADER_SIZE));
        let mut collection = Self {
            file,
            offsets,
            end,
            max_value_len: MAX_VALUE_LEN,
        };
        // A read-only empty file is simply an empty collection
        if fresh && collection.file.is_writable() {
            collection.write_header()?;
        }
        Ok(collection)
    }

    /// Cap the length of values `add` accepts (never above `MAX_VALUE_LEN`)
    pub fn with_max_value_len(mut self, max: usize) -> Self {
        self.max_value_len = max.min(MAX_VALUE_LEN);
        self
    }

    pub fn max_value_len(&self) -> usize {
        self.max_value_len
    }

    /// Full scan: every record is read and the values must be strictly
    /// ascending
    pub fn verify(&self) -> Result<()> {
        let mut previous: Option<Binary> = None;
        for rank in 0..self.len() {
            let value = self.value_at(rank)?;
            if let Some(prev) = &previous {
                if prev >= &value {
                    return Err(StoreError::Corruption(format!(
                        "{}: record at {} is out of order",
                        self.file.key(),
                        self.offsets[rank]
                    )));
                }
            }
            previous = Some(value);
        }
        Ok(())
    }

    /// Offsets and end of the records in `file`, `None` for an empty file
    fn load_offsets(file: &DataFile) -> Result<Option<(Vec<u64>, u64)>> {
        let len = file.len()?;
        if len == 0 {
            return Ok(None);
        }
        if len < HEADER_SIZE {
            return Err(StoreError::Corruption(format!(
                "{}: {} bytes is too short for a collection header",
                file.key(),
                len
            )));
        }

        let mut magic = [0u8; 6];
        file.read_exact_at(0, &mut magic)?;
        if &magic[0..4] != MAGIC {
            return Err(StoreError::Corruption(format!(
                "{}: invalid collection magic {:?}",
                file.key(),
                &magic[0..4]
            )));
        }
        let version = u16::from_be_bytes([magic[4], magic[5]]);
        if version != VERSION {
            return Err(StoreError::Corruption(format!(
                "{}: unsupported collection version {}",
                file.key(),
                version
            )));
        }
        let count = file.read_u64_at(COUNT_OFFSET)?;

        let mut offsets = Vec::with_capacity(count.min(1 << 20) as usize);
        let mut pos = HEADER_SIZE;
        while pos < len {
            if pos + LEN_PREFIX > len {
                return Err(StoreError::Corruption(format!(
                    "{}: truncated record header at {}",
                    file.key(),
                    pos
                )));
            }
            let value_len = file.read_u32_at(pos)? as u64;
            let next = pos + LEN_PREFIX + value_len;
            if next > len {
                return Err(StoreError::Corruption(format!(
                    "{}: record at {} runs past end of file",
                    file.key(),
                    pos
                )));
            }
            offsets.push(pos);
            pos = next;
        }

        if offsets.len() as u64 != count {
            return Err(StoreError::Corruption(format!(
                "{}: header count {} but {} records",
                file.key(),
                count,
                offsets.len()
            )));
        }
        Ok(Some((offsets, len)))
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Number of elements (maintained, never counted)
    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    pub fn contains(&self, value: &[u8]) -> Result<bool> {
        Ok(self.search(value)?.is_ok())
    }

    /// Smallest element
    pub fn first(&self) -> Result<Binary> {
        if self.is_empty() {
            return Err(StoreError::EmptyCollection);
        }
        self.value_at(0)
    }

    /// Largest element
    pub fn last(&self) -> Result<Binary> {
        if self.is_empty() {
            return Err(StoreError::EmptyCollection);
        }
        self.value_at(self.len() - 1)
    }

    /// View of every element `>= value`
    pub fn tail(&self, value: &[u8]) -> Result<Tail<'_, 'f>> {
        let start = self.lower_bound(value)?;
        Ok(Tail::new(self, start))
    }

    /// Fresh ascending pass over all elements
    pub fn iter(&self) -> Iter<'_, 'f> {
        Iter::new(self, 0, self.len())
    }

    /// Enumerator that can remove the element it is positioned on
    pub fn cursor(&mut self) -> Cursor<'_, 'f> {
        Cursor::new(self)
    }

    /// The wrapped file
    pub fn file(&self) -> &DataFile {
        &*self.file
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    /// Insert `value`; false (and no change) when already present
    pub fn add(&mut self, value: &[u8]) -> Result<bool> {
        if value.len() > self.max_value_len {
            return Err(StoreError::InvalidArgument(format!(
                "value of {} bytes exceeds the {} byte record limit",
                value.len(),
                self.max_value_len
            )));
        }
        let rank = match self.search(value)? {
            Ok(_) => return Ok(false),
            Err(rank) => rank,
        };
        self.ensure_writable()?;

        let at = self.offset_of(rank);
        let record = LEN_PREFIX + value.len() as u64;

        // Open a gap, then fill it
        self.shift(at, self.end, record as i64)?;
        let mut framed = Vec::with_capacity(record as usize);
        framed.extend_from_slice(&(value.len() as u32).to_be_bytes());
        framed.extend_from_slice(value);
        self.file.write_at(at, &framed)?;

        for offset in &mut self.offsets[rank..] {
            *offset += record;
        }
        self.offsets.insert(rank, at);
        self.end += record;
        self.write_count()?;
        Ok(true)
    }

    /// Delete `value`; false (and no change) when absent
    pub fn remove(&mut self, value: &[u8]) -> Result<bool> {
        match self.search(value)? {
            Ok(rank) => {
                self.ensure_writable()?;
                self.remove_at(rank)?;
                Ok(true)
            }
            Err(_) => Ok(false),
        }
    }

    /// Remove every element for which `keep` returns false; returns how many
    /// were removed
    pub fn retain(&mut self, mut keep: impl FnMut(&Binary) -> bool) -> Result<usize> {
        let mut removed = 0;
        let mut cursor = self.cursor();
        while cursor.move_next()? {
            let drop_it = cursor.current().map(|v| !keep(v)).unwrap_or(false);
            if drop_it && cursor.remove_current()? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    // =========================================================================
    // Crate-internal access (tail, cursor)
    // =========================================================================

    /// Element at `rank` (0-based, ascending)
    pub(crate) fn value_at(&self, rank: usize) -> Result<Binary> {
        let start = self.offsets[rank] + LEN_PREFIX;
        let stop = self.offset_of(rank + 1);
        let mut value = vec![0u8; (stop - start) as usize];
        self.file.read_exact_at(start, &mut value)?;
        Ok(Binary::from(value))
    }

    /// Rank of the first element `>= value`
    pub(crate) fn lower_bound(&self, value: &[u8]) -> Result<usize> {
        Ok(match self.search(value)? {
            Ok(rank) | Err(rank) => rank,
        })
    }

    /// Binary search; `Ok(rank)` when found, `Err(insertion rank)` otherwise
    pub(crate) fn search(&self, value: &[u8]) -> Result<std::result::Result<usize, usize>> {
        let mut lo = 0;
        let mut hi = self.offsets.len();
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            match self.value_at(mid)?.as_bytes().cmp(value) {
                Ordering::Less => lo = mid + 1,
                Ordering::Greater => hi = mid,
                Ordering::Equal => return Ok(Ok(mid)),
            }
        }
        Ok(Err(lo))
    }

    /// Excise the record at `rank`
    pub(crate) fn remove_at(&mut self, rank: usize) -> Result<()> {
        self.ensure_writable()?;
        let at = self.offsets[rank];
        let record = self.offset_of(rank + 1) - at;

        self.shift(at + record, self.end, -(record as i64))?;
        self.end -= record;
        self.file.set_len(self.end)?;

        self.offsets.remove(rank);
        for offset in &mut self.offsets[rank..] {
            *offset -= record;
        }
        self.write_count()?;
        Ok(())
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    /// Start of the record at `rank`, or the end of the region
    fn offset_of(&self, rank: usize) -> u64 {
        self.offsets.get(rank).copied().unwrap_or(self.end)
    }

    fn ensure_writable(&self) -> Result<()> {
        if !self.file.is_writable() {
            return Err(StoreError::AccessDenied(format!(
                "{} was opened read-only",
                self.file.key()
            )));
        }
        Ok(())
    }

    /// Move bytes `[from, to)` by `delta`, chunk by chunk in the direction
    /// that never overwrites unread bytes
    fn shift(&mut self, from: u64, to: u64, delta: i64) -> Result<()> {
        if from >= to || delta == 0 {
            return Ok(());
        }
        let mut buf = vec![0u8; SHIFT_CHUNK.min(to - from) as usize];

        if delta > 0 {
            // Back to front
            let delta = delta as u64;
            let mut hi = to;
            while hi > from {
                let lo = hi.saturating_sub(SHIFT_CHUNK).max(from);
                let chunk = &mut buf[..(hi - lo) as usize];
                self.file.read_exact_at(lo, chunk)?;
                self.file.write_at(lo + delta, chunk)?;
                hi = lo;
            }
        } else {
            // Front to back
            let delta = delta.unsigned_abs();
            let mut lo = from;
            while lo < to {
                let hi = (lo + SHIFT_CHUNK).min(to);
                let chunk = &mut buf[..(hi - lo) as usize];
                self.file.read_exact_at(lo, chunk)?;
                self.file.write_at(lo - delta, chunk)?;
                lo = hi;
            }
        }
        Ok(())
    }

    fn write_header(&mut self) -> Result<()> {
        let mut header = [0u8; HEADER_SIZE as usize];
        header[0..4].copy_from_slice(MAGIC);
        header[4..6].copy_from_slice(&VERSION.to_be_bytes());
        header[COUNT_OFFSET as usize..].copy_from_slice(&(self.len() as u64).to_be_bytes());
        self.file.write_at(0, &header)
    }

    fn write_count(&mut self) -> Result<()> {
        let count = (self.len() as u64).to_be_bytes();
        self.file.write_at(COUNT_OFFSET, &count)
    }
}

impl Drop for BinaryCollection<'_> {
    fn drop(&mut self) {
        self.file.release_collection();
    }
}

impl<'c, 'f> IntoIterator for &'c BinaryCollection<'f> {
    type Item = Result<Binary>;
    type IntoIter = Iter<'c, 'f>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
