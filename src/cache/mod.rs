//! Cache Module
//!
//! Read-through page cache layered over a raw byte stream.
//!
//! ## Responsibilities
//! - Turn many small positional reads into whole-page stream reads
//! - Drop pages that a writer reports as changed
//! - Count hits and misses
//!
//! The cache never sees writes. Anything that writes to the wrapped stream
//! must call [`PagedCache::invalidate_section`] for the bytes it touched.

mod paged;

pub use paged::PagedCache;

/// Default page size (4KB)
pub const DEFAULT_PAGE_SIZE: usize = 4096;
