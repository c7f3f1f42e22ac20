//! Filesystem storage backend
//!
//! One file per published Key, installed by rename under a commit journal.
//!
//! ## Publish protocol
//! 1. Copy each staged working copy to `{key}.dat.pending` (fsync)
//! 2. Write the `COMMIT` journal listing those keys (temp + rename) - commit point
//! 3. Hard-link any `{key}.dat` still read by a live snapshot into `retired/`
//! 4. Rename every pending file over its `{key}.dat`
//! 5. Remove `COMMIT`
//!
//! On recovery a readable `COMMIT` is rolled forward (steps 4 and 5 redone);
//! pending files without a journal are leftovers of an aborted publish and
//! are deleted, as is everything under `retired/`.
//!
//! Published files are opened only while a working copy is filled from them,
//! so the number of descriptors does not grow with the number of keys.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tempfile::SpooledTempFile;

use super::journal::CommitRecord;
use super::{drain_staged, Blob, BlobSet, Staged, StorageBackend, Stream};
use crate::config::{Config, FILESYSTEM_BACKEND};
use crate::error::{Result, StoreError};
use crate::key::Key;

// =============================================================================
// DiskBlob
// =============================================================================

struct BlobLocation {
    path: PathBuf,

    /// Path points into `retired/` and is owned by this blob
    retired: bool,
}

/// Published content, read back by path on demand
///
/// When a later publish replaces the file, the backend first hard-links it
/// into `retired/` and repoints the blob there, so snapshots that still hold
/// the blob keep reading the old bytes. The retired link goes away with the
/// last reference.
pub struct DiskBlob {
    location: Mutex<BlobLocation>,
    len: u64,
}

impl DiskBlob {
    pub fn open(path: &Path) -> Result<Self> {
        let len = fs::metadata(path)?.len();
        Ok(Self {
            location: Mutex::new(BlobLocation {
                path: path.to_path_buf(),
                retired: false,
            }),
            len,
        })
    }

    fn retire_to(&self, path: PathBuf) {
        let mut location = self.location.lock();
        location.path = path;
        location.retired = true;
    }
}

impl Blob for DiskBlob {
    fn len(&self) -> u64 {
        self.len
    }

    fn copy_into(&self, out: &mut dyn Write) -> Result<u64> {
        // Held across open so a concurrent retire cannot move the file away
        let location = self.location.lock();
        let file = File::open(&location.path)?;
        let copied = std::io::copy(&mut file.take(self.len), out)?;
        if copied != self.len {
            return Err(StoreError::Corruption(format!(
                "published file shrank from {} to {} bytes",
                self.len, copied
            )));
        }
        Ok(copied)
    }
}

impl Drop for DiskBlob {
    fn drop(&mut self) {
        let location = self.location.get_mut();
        if location.retired {
            if let Err(e) = fs::remove_file(&location.path) {
                tracing::warn!(path = %location.path.display(), error = %e, "Failed to remove retired file");
            }
        }
    }
}

// =============================================================================
// FileSystemBackend
// =============================================================================

/// Filesystem storage backend
pub struct FileSystemBackend {
    /// Directory holding `.dat` files and the journal
    root: PathBuf,

    /// Directory for hard links to replaced files
    retired_dir: PathBuf,

    /// fsync pending files and the journal during publish
    sync: bool,

    /// Recovery leaves the directory untouched and persist is refused
    read_only: bool,

    /// In-memory size of a working copy before it spills to a temp file
    spill_bytes: usize,

    /// Blob currently installed under each key's `.dat` name
    installed: Mutex<HashMap<Key, Weak<DiskBlob>>>,
}

impl FileSystemBackend {
    const JOURNAL_FILENAME: &'static str = "COMMIT";
    const RETIRED_DIR: &'static str = "retired";
    const PENDING_SUFFIX: &'static str = ".pending";

    /// Open or create the store directory named by `config.data_dir`
    ///
    /// A read-only backend requires the directory to exist and creates nothing.
    pub fn open(config: &Config) -> Result<Self> {
        let root = config.data_dir.clone();
        let retired_dir = root.join(Self::RETIRED_DIR);
        if config.read_only {
            if !root.is_dir() {
                return Err(StoreError::Config(format!(
                    "read-only store directory {} does not exist",
                    root.display()
                )));
            }
        } else {
            fs::create_dir_all(&retired_dir)?;
        }

        Ok(Self {
            root,
            retired_dir,
            sync: config.sync_on_publish,
            read_only: config.read_only,
            spill_bytes: config.scratch_spill_bytes,
            installed: Mutex::new(HashMap::new()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the published file for `key`
    pub fn file_path(&self, key: &Key) -> PathBuf {
        self.root.join(key.file_name())
    }

    fn pending_path(&self, key: &Key) -> PathBuf {
        self.root
            .join(format!("{}{}", key.file_name(), Self::PENDING_SUFFIX))
    }

    fn journal_path(&self) -> PathBuf {
        self.root.join(Self::JOURNAL_FILENAME)
    }

    /// Install pending copies listed in `record`
    fn roll_forward(&self, record: &CommitRecord) -> Result<()> {
        for key in &record.keys {
            let pending = self.pending_path(key);
            // Already renamed before the interruption
            if pending.exists() {
                fs::rename(&pending, self.file_path(key))?;
            }
        }
        fs::remove_file(self.journal_path())?;
        Ok(())
    }

    /// Keep the bytes of every still-referenced blob under `record.keys`
    /// reachable after the rename replaces them
    fn retire_installed(&self, record: &CommitRecord) -> Result<()> {
        let mut installed = self.installed.lock();
        for key in &record.keys {
            let blob = match installed.remove(key).and_then(|weak| weak.upgrade()) {
                Some(blob) => blob,
                None => continue,
            };
            let retired = self
                .retired_dir
                .join(format!("{}.{:016x}", key.file_name(), record.generation));
            if retired.exists() {
                fs::remove_file(&retired)?;
            }
            fs::hard_link(self.file_path(key), &retired)?;
            tracing::debug!(key = %key, path = %retired.display(), "Retired file kept for older snapshot");
            blob.retire_to(retired);
        }
        Ok(())
    }

    fn install(&self, key: Key) -> Result<Arc<DiskBlob>> {
        let blob = Arc::new(DiskBlob::open(&self.file_path(&key))?);
        self.installed.lock().insert(key, Arc::downgrade(&blob));
        Ok(blob)
    }

    /// Delete leftovers: pending copies, a half-written journal temp file,
    /// and retired links of a previous process
    fn sweep(&self) -> Result<usize> {
        let mut removed = 0;
        for entry in fs::read_dir(&self.root)? {
            let path = entry?.path();
            if !path.is_file() {
                continue;
            }
            let name = path.file_name().map(|n| n.to_string_lossy().into_owned());
            let stale = match name.as_deref() {
                Some(n) => n.ends_with(Self::PENDING_SUFFIX) || n == "COMMIT.tmp",
                None => false,
            };
            if stale {
                tracing::warn!(path = %path.display(), "Removing leftover from interrupted publish");
                fs::remove_file(&path)?;
                removed += 1;
            }
        }
        for entry in fs::read_dir(&self.retired_dir)? {
            let path = entry?.path();
            if path.is_file() {
                fs::remove_file(&path)?;
            }
        }
        Ok(removed)
    }
}

impl StorageBackend for FileSystemBackend {
    fn name(&self) -> &str {
        FILESYSTEM_BACKEND
    }

    /// On startup:
    /// 1. Roll forward a committed-but-uninstalled publish
    /// 2. Remove leftovers of an uncommitted publish
    /// 3. Index every `.dat` file
    ///
    /// Read-only mode skips steps 1 and 2 and reports what it left alone.
    fn recover(&self) -> Result<BlobSet> {
        if self.read_only {
            if self.journal_path().exists() {
                tracing::warn!(
                    path = %self.journal_path().display(),
                    "Interrupted publish left in place; showing the previous state"
                );
            }
        } else {
            if let Some(record) = CommitRecord::read(&self.journal_path())? {
                tracing::warn!(
                    generation = record.generation,
                    files = record.keys.len(),
                    "Rolling forward interrupted publish"
                );
                self.roll_forward(&record)?;
            }

            let removed = self.sweep()?;
            if removed > 0 {
                tracing::info!(removed, "Discarded uncommitted publish leftovers");
            }
        }

        let mut blobs: BlobSet = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let path = entry?.path();
            if !path.is_file() {
                continue;
            }
            let key = match path
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(Key::parse_file_name)
            {
                Some(key) => key,
                None => continue,
            };
            blobs.push((key, self.install(key)? as Arc<dyn Blob>));
        }
        Ok(blobs)
    }

    fn scratch(&self) -> Result<Box<dyn Stream>> {
        Ok(Box::new(SpooledTempFile::new(self.spill_bytes)))
    }

    fn persist(&self, generation: u64, staged: &mut [Staged<'_>]) -> Result<BlobSet> {
        if self.read_only {
            return Err(StoreError::AccessDenied(format!(
                "store at {} is open read-only",
                self.root.display()
            )));
        }

        // Step 1: pending copies. Failure here leaves only pending files,
        // which the next recovery deletes.
        for entry in staged.iter_mut() {
            let file = File::create(self.pending_path(&entry.key))?;
            let mut writer = BufWriter::new(file);
            drain_staged(entry, &mut writer)?;
            let file = writer
                .into_inner()
                .map_err(|e| StoreError::Io(e.into_error()))?;
            if self.sync {
                file.sync_all()?;
            }
        }

        // Step 2: commit point
        let keys: Vec<Key> = staged.iter().map(|s| s.key).collect();
        let record = CommitRecord::new(generation, keys);
        record.write(&self.journal_path(), self.sync)?;

        // Step 3, 4 + 5: install
        self.retire_installed(&record)?;
        self.roll_forward(&record)?;

        let mut blobs: BlobSet = Vec::with_capacity(record.keys.len());
        for key in record.keys {
            blobs.push((key, self.install(key)? as Arc<dyn Blob>));
        }
        Ok(blobs)
    }

    fn shutdown(&self) -> Result<()> {
        if self.sync && !self.read_only {
            // Directory fsync makes the renames durable where supported
            if let Ok(dir) = File::open(&self.root) {
                let _ = dir.sync_all();
            }
        }
        Ok(())
    }
}
