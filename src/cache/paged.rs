//! PagedCache implementation
//!
//! HashMap of fixed-size pages keyed by page number.

use std::collections::HashMap;
use std::io::{Read, Seek, SeekFrom};

use crate::error::Result;

/// Fixed-page read-through cache over a stream
///
/// ## Concurrency:
/// None. Callers sharing one instance must serialize access themselves.
pub struct PagedCache<S> {
    /// Wrapped stream (reads on miss only)
    stream: S,

    /// Page number → page bytes (always `page_size` long, zero padded)
    pages: HashMap<u64, Box<[u8]>>,

    page_size: usize,

    hits: u64,
    misses: u64,
}

impl<S: Read + Seek> PagedCache<S> {
    /// Wrap `stream` with pages of `page_size` bytes
    ///
    /// A zero page size is bumped to 1.
    pub fn new(stream: S, page_size: usize) -> Self {
        Self {
            stream,
            pages: HashMap::new(),
            page_size: page_size.max(1),
            hits: 0,
            misses: 0,
        }
    }

    /// Read from the single page containing `pos`
    ///
    /// Returns `min(buf.len(), bytes left in that page)`. Bytes past the end
    /// of the stream come back as zeros; the caller tracks the valid length.
    pub fn read(&mut self, pos: u64, buf: &mut [u8]) -> Result<usize> {
        let page_size = self.page_size as u64;
        let page_no = pos / page_size;
        let in_page = (pos % page_size) as usize;
        let n = buf.len().min(self.page_size - in_page);
        if n == 0 {
            return Ok(0);
        }

        let page = self.page(page_no)?;
        buf[..n].copy_from_slice(&page[in_page..in_page + n]);
        Ok(n)
    }

    pub fn read_u8(&mut self, pos: u64) -> Result<u8> {
        let mut b = [0u8; 1];
        self.read_full(pos, &mut b)?;
        Ok(b[0])
    }

    pub fn read_i16(&mut self, pos: u64) -> Result<i16> {
        let mut b = [0u8; 2];
        self.read_full(pos, &mut b)?;
        Ok(i16::from_be_bytes(b))
    }

    pub fn read_i32(&mut self, pos: u64) -> Result<i32> {
        let mut b = [0u8; 4];
        self.read_full(pos, &mut b)?;
        Ok(i32::from_be_bytes(b))
    }

    pub fn read_i64(&mut self, pos: u64) -> Result<i64> {
        let mut b = [0u8; 8];
        self.read_full(pos, &mut b)?;
        Ok(i64::from_be_bytes(b))
    }

    pub fn read_u32(&mut self, pos: u64) -> Result<u32> {
        Ok(self.read_i32(pos)? as u32)
    }

    pub fn read_u64(&mut self, pos: u64) -> Result<u64> {
        Ok(self.read_i64(pos)? as u64)
    }

    /// Fill `buf` completely, crossing page boundaries as needed
    pub fn read_full(&mut self, mut pos: u64, buf: &mut [u8]) -> Result<()> {
        let mut done = 0;
        while done < buf.len() {
            let n = self.read(pos, &mut buf[done..])?;
            done += n;
            pos += n as u64;
        }
        Ok(())
    }

    /// Evict every cached page overlapping `[pos, pos + size)`
    pub fn invalidate_section(&mut self, pos: u64, size: u64) {
        if size == 0 || self.pages.is_empty() {
            return;
        }
        let page_size = self.page_size as u64;
        let first = pos / page_size;
        let last = pos.saturating_add(size - 1) / page_size;

        if last - first >= self.pages.len() as u64 {
            self.pages.retain(|&no, _| no < first || no > last);
        } else {
            for no in first..=last {
                self.pages.remove(&no);
            }
        }
    }

    /// Drop the whole cache once it holds more than `threshold` pages
    pub fn clear_cache(&mut self, threshold: usize) {
        if self.pages.len() > threshold {
            self.pages.clear();
        }
    }

    pub fn cache_hits(&self) -> u64 {
        self.hits
    }

    pub fn cache_misses(&self) -> u64 {
        self.misses
    }

    /// Number of pages currently cached
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn get_ref(&self) -> &S {
        &self.stream
    }

    /// Mutable access to the wrapped stream.
    ///
    /// Writes made through this reference are invisible to the cache until
    /// the affected section is invalidated.
    pub fn get_mut(&mut self) -> &mut S {
        &mut self.stream
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    /// Cached page, fetching it from the stream on a miss
    fn page(&mut self, page_no: u64) -> Result<&[u8]> {
        if self.pages.contains_key(&page_no) {
            self.hits += 1;
        } else {
            self.misses += 1;
            let page = self.fetch(page_no)?;
            self.pages.insert(page_no, page);
        }
        Ok(&self.pages[&page_no][..])
    }

    fn fetch(&mut self, page_no: u64) -> Result<Box<[u8]>> {
        let mut page = vec![0u8; self.page_size].into_boxed_slice();
        self.stream
            .seek(SeekFrom::Start(page_no * self.page_size as u64))?;

        // Short read at end of stream leaves the zero tail in place
        let mut filled = 0;
        while filled < page.len() {
            match self.stream.read(&mut page[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(page)
    }
}
