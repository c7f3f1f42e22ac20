//! # shardstore
//!
//! A sharded, transactional storage substrate with:
//! - Key-addressed virtual files under snapshot-isolated transactions
//! - Atomic publish as the single commit boundary
//! - Pluggable backends (in-memory, filesystem with a commit journal)
//! - A paged read cache beneath every open file
//! - Persistent ordered binary sets for building on-disk indices
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 BinaryCollection / Tail                      │
//! │          (ordered set spliced into one DataFile)             │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │ &mut DataFile
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │              Transaction ──issues──▶ DataFile                │
//! │        (arena of working copies, snapshot reads)             │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!          ┌────────────┴────────────┐
//!          │                         │
//!          ▼                         ▼
//!   ┌─────────────┐          ┌─────────────┐
//!   │ PagedCache  │          │  Database   │
//!   │ (per file)  │          │  (publish)  │
//!   └─────────────┘          └──────┬──────┘
//!                                   │
//!                                   ▼
//!                           ┌─────────────┐
//!                           │   Backend   │
//!                           │ memory / fs │
//!                           └─────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod address;
pub mod key;
pub mod cache;
pub mod storage;
pub mod datafile;
pub mod transaction;
pub mod database;
pub mod collection;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{StoreError, Result};
pub use config::Config;
pub use address::Address;
pub use key::Key;
pub use cache::PagedCache;
pub use datafile::{AccessMode, DataFile};
pub use transaction::{Transaction, TransactionStatus};
pub use database::{Database, Lifecycle, PublishReport};
pub use collection::{Binary, BinaryCollection, Tail};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of shardstore
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
