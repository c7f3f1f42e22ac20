//! Configuration for shardstore
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;

use crate::cache::DEFAULT_PAGE_SIZE;
use crate::error::{Result, StoreError};

/// Identifier of the in-memory backend
pub const MEMORY_BACKEND: &str = "memory";

/// Identifier of the filesystem backend
pub const FILESYSTEM_BACKEND: &str = "filesystem";

/// Main configuration for a Database instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Root directory for the filesystem backend.
    /// Internal structure:
    ///   {data_dir}/
    ///     ├── COMMIT           (commit journal, only present mid-publish)
    ///     ├── retired/         (replaced files still read by older snapshots)
    ///     └── *.dat            (one file per published Key)
    pub data_dir: PathBuf,

    /// Backend identifier, resolved through the backend registry
    pub backend: String,

    /// fsync files and the journal during publish
    pub sync_on_publish: bool,

    /// Open the store without recovery; publish is refused
    pub read_only: bool,

    /// Working copies stay in memory up to this many bytes, then spill to an
    /// unlinked temp file
    pub scratch_spill_bytes: usize,

    // -------------------------------------------------------------------------
    // Cache Configuration
    // -------------------------------------------------------------------------
    /// Page size of the read cache beneath every open DataFile (bytes)
    pub page_size: usize,

    /// Drop a DataFile's whole page cache once it holds more pages than this
    pub cache_page_limit: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./shardstore_data"),
            backend: MEMORY_BACKEND.to_string(),
            sync_on_publish: true,
            read_only: false,
            scratch_spill_bytes: 1024 * 1024,
            page_size: DEFAULT_PAGE_SIZE,
            cache_page_limit: 1024,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Check values that would make the store unusable
    pub fn validate(&self) -> Result<()> {
        if self.page_size == 0 {
            return Err(StoreError::Config("page_size must be non-zero".to_string()));
        }
        if self.backend.is_empty() {
            return Err(StoreError::Config("backend identifier is empty".to_string()));
        }
        Ok(())
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the data directory (root for filesystem storage)
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_dir = path.into();
        self
    }

    /// Set the backend identifier ("memory", "filesystem", or a registered one)
    pub fn backend(mut self, name: impl Into<String>) -> Self {
        self.config.backend = name.into();
        self
    }

    /// Shortcut for the filesystem backend rooted at `path`
    pub fn filesystem(self, path: impl Into<PathBuf>) -> Self {
        self.backend(FILESYSTEM_BACKEND).data_dir(path)
    }

    /// Enable or disable fsync during publish
    pub fn sync_on_publish(mut self, sync: bool) -> Self {
        self.config.sync_on_publish = sync;
        self
    }

    /// Open without recovery and refuse publish
    pub fn read_only(mut self, read_only: bool) -> Self {
        self.config.read_only = read_only;
        self
    }

    /// Set the in-memory size of a working copy before it spills to disk
    pub fn scratch_spill_bytes(mut self, bytes: usize) -> Self {
        self.config.scratch_spill_bytes = bytes;
        self
    }

    /// Set the read cache page size (in bytes)
    pub fn page_size(mut self, size: usize) -> Self {
        self.config.page_size = size;
        self
    }

    /// Set the per-file cache page limit
    pub fn cache_page_limit(mut self, pages: usize) -> Self {
        self.config.cache_page_limit = pages;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
