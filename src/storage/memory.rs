//! In-memory storage backend.

use std::collections::HashMap;
use std::io::{Cursor, Write};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::RwLock;

use super::{drain_staged, Blob, BlobSet, Staged, StorageBackend, Stream};
use crate::config::MEMORY_BACKEND;
use crate::error::Result;
use crate::key::Key;

/// Published content held as a shared byte buffer
pub struct MemoryBlob(Bytes);

impl MemoryBlob {
    pub fn new(bytes: Bytes) -> Self {
        Self(bytes)
    }
}

impl Blob for MemoryBlob {
    fn len(&self) -> u64 {
        self.0.len() as u64
    }

    fn copy_into(&self, out: &mut dyn Write) -> Result<u64> {
        out.write_all(&self.0)?;
        Ok(self.0.len() as u64)
    }
}

/// In-memory storage backend.
///
/// Published files live as long as the backend. A backend shared through an
/// `Arc` (see [`BackendRegistry::register`](super::BackendRegistry::register))
/// survives across Database instances; otherwise everything is lost on drop.
pub struct MemoryBackend {
    files: RwLock<HashMap<Key, Arc<MemoryBlob>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            files: RwLock::new(HashMap::new()),
        }
    }

    /// Number of published files
    pub fn file_count(&self) -> usize {
        self.files.read().len()
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageBackend for MemoryBackend {
    fn name(&self) -> &str {
        MEMORY_BACKEND
    }

    fn recover(&self) -> Result<BlobSet> {
        Ok(self
            .files
            .read()
            .iter()
            .map(|(key, blob)| (*key, Arc::clone(blob) as Arc<dyn Blob>))
            .collect())
    }

    fn scratch(&self) -> Result<Box<dyn Stream>> {
        Ok(Box::new(Cursor::new(Vec::new())))
    }

    fn persist(&self, _generation: u64, staged: &mut [Staged<'_>]) -> Result<BlobSet> {
        // Copy everything out first so a failed read leaves the map untouched
        let mut blobs = Vec::with_capacity(staged.len());
        for entry in staged.iter_mut() {
            let mut buf = Vec::with_capacity(entry.len as usize);
            drain_staged(entry, &mut buf)?;
            blobs.push((entry.key, Arc::new(MemoryBlob::new(Bytes::from(buf)))));
        }

        let mut files = self.files.write();
        for (key, blob) in &blobs {
            files.insert(*key, Arc::clone(blob));
        }

        Ok(blobs
            .into_iter()
            .map(|(key, blob)| (key, blob as Arc<dyn Blob>))
            .collect())
    }
}
