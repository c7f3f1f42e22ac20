//! Storage Module
//!
//! Pluggable backends that hold published file contents.
//!
//! ## Responsibilities
//! - Hand out scratch streams for transaction-private working copies
//! - Persist a transaction's modified files as one atomic publish
//! - Rebuild the committed file set on start (crash recovery)
//!
//! Backends are selected by identifier through a [`BackendRegistry`] that is
//! populated explicitly at startup. "memory" and "filesystem" are registered
//! by default; callers may register their own.
//!
//! ## Filesystem Layout
//! ```text
//! {data_dir}/
//!   ├── 00000001-0000000000000000-0000000000000002.dat   (published file)
//!   ├── ....dat.pending                                 (mid-publish copy)
//!   ├── COMMIT                                          (commit journal)
//!   └── retired/                                        (superseded files still
//!                                                        read by old snapshots)
//! ```

mod filesystem;
mod journal;
mod memory;

use std::collections::HashMap;
use std::fs::File;
use std::io::{self, Cursor, Read, Seek, Write};
use std::sync::Arc;

use tempfile::SpooledTempFile;

use crate::config::{Config, FILESYSTEM_BACKEND, MEMORY_BACKEND};
use crate::error::{Result, StoreError};
use crate::key::Key;

pub use filesystem::FileSystemBackend;
pub use journal::CommitRecord;
pub use memory::MemoryBackend;

// =============================================================================
// Streams and Blobs
// =============================================================================

/// Random-access byte stream that can also be resized
///
/// Backs the working copy of every open DataFile.
pub trait Stream: Read + Write + Seek + Send {
    fn set_len(&mut self, len: u64) -> io::Result<()>;

    /// Make room for `len` bytes without changing the length
    ///
    /// Fails with an error, never a panic, when the stream cannot grow that
    /// far.
    fn reserve(&mut self, len: u64) -> io::Result<()> {
        let _ = len;
        Ok(())
    }
}

impl Stream for Cursor<Vec<u8>> {
    fn set_len(&mut self, len: u64) -> io::Result<()> {
        Stream::reserve(self, len)?;
        // reserve() proved the cast fits
        self.get_mut().resize(len as usize, 0);
        Ok(())
    }

    fn reserve(&mut self, len: u64) -> io::Result<()> {
        let len = usize::try_from(len)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "length exceeds memory"))?;
        let buf = self.get_mut();
        let extra = len.saturating_sub(buf.len());
        buf.try_reserve(extra)
            .map_err(|e| io::Error::new(io::ErrorKind::OutOfMemory, e.to_string()))
    }
}

impl Stream for File {
    fn set_len(&mut self, len: u64) -> io::Result<()> {
        File::set_len(self, len)
    }
}

/// In memory up to its threshold, then an unlinked temp file
impl Stream for SpooledTempFile {
    fn set_len(&mut self, len: u64) -> io::Result<()> {
        SpooledTempFile::set_len(self, len)
    }
}

/// Immutable published content of one file
pub trait Blob: Send + Sync {
    /// Length in bytes
    fn len(&self) -> u64;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Write the whole content to `out`, returning the byte count
    fn copy_into(&self, out: &mut dyn Write) -> Result<u64>;
}

/// A modified file handed to a backend during publish
pub struct Staged<'a> {
    pub key: Key,
    /// Valid length; the stream is never read past it
    pub len: u64,
    pub stream: &'a mut dyn Stream,
}

/// Committed files as returned by recovery and publish
pub type BlobSet = Vec<(Key, Arc<dyn Blob>)>;

// =============================================================================
// Backend Trait
// =============================================================================

/// Storage backend abstraction
pub trait StorageBackend: Send + Sync {
    /// Identifier this backend was registered under
    fn name(&self) -> &str;

    /// Load every published file, repairing interrupted publishes first
    fn recover(&self) -> Result<BlobSet>;

    /// Fresh, empty stream for a transaction-private working copy
    fn scratch(&self) -> Result<Box<dyn Stream>>;

    /// Durably replace the content of every staged key, all or nothing
    fn persist(&self, generation: u64, staged: &mut [Staged<'_>]) -> Result<BlobSet>;

    /// Release resources when the database stops
    fn shutdown(&self) -> Result<()> {
        Ok(())
    }
}

impl<T: StorageBackend + ?Sized> StorageBackend for Arc<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn recover(&self) -> Result<BlobSet> {
        (**self).recover()
    }

    fn scratch(&self) -> Result<Box<dyn Stream>> {
        (**self).scratch()
    }

    fn persist(&self, generation: u64, staged: &mut [Staged<'_>]) -> Result<BlobSet> {
        (**self).persist(generation, staged)
    }

    fn shutdown(&self) -> Result<()> {
        (**self).shutdown()
    }
}

/// Read exactly `len` bytes of a staged stream from offset 0 into `out`
pub(crate) fn drain_staged(staged: &mut Staged<'_>, out: &mut dyn Write) -> Result<u64> {
    staged.stream.seek(io::SeekFrom::Start(0))?;
    let mut limited = (&mut *staged.stream).take(staged.len);
    let copied = io::copy(&mut limited, out)?;
    if copied != staged.len {
        return Err(StoreError::Corruption(format!(
            "working copy of {} is {} bytes, expected {}",
            staged.key, copied, staged.len
        )));
    }
    Ok(copied)
}

// =============================================================================
// Backend Registry
// =============================================================================

/// Builds a backend from configuration
pub trait BackendFactory: Send + Sync {
    fn create(&self, config: &Config) -> Result<Box<dyn StorageBackend>>;
}

impl<F> BackendFactory for F
where
    F: Fn(&Config) -> Result<Box<dyn StorageBackend>> + Send + Sync,
{
    fn create(&self, config: &Config) -> Result<Box<dyn StorageBackend>> {
        self(config)
    }
}

/// Identifier → factory table, filled in at startup
#[derive(Clone)]
pub struct BackendRegistry {
    factories: HashMap<String, Arc<dyn BackendFactory>>,
}

impl BackendRegistry {
    /// Registry with no backends at all
    pub fn empty() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Registry with "memory" and "filesystem"
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry.register(MEMORY_BACKEND, |_: &Config| -> Result<Box<dyn StorageBackend>> {
            Ok(Box::new(MemoryBackend::new()))
        });
        registry.register(FILESYSTEM_BACKEND, |config: &Config| -> Result<Box<dyn StorageBackend>> {
            Ok(Box::new(FileSystemBackend::open(config)?))
        });
        registry
    }

    /// Add or replace the factory for `name`
    pub fn register(&mut self, name: impl Into<String>, factory: impl BackendFactory + 'static) {
        self.factories.insert(name.into(), Arc::new(factory));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Registered identifiers, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.keys().cloned().collect();
        names.sort();
        names
    }

    /// Build the backend named by `config.backend`
    pub fn create(&self, config: &Config) -> Result<Box<dyn StorageBackend>> {
        let factory = self.factories.get(&config.backend).ok_or_else(|| {
            StoreError::NotSupported(format!("unknown storage backend {:?}", config.backend))
        })?;
        factory.create(config)
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
