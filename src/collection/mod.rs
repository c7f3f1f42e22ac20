//! Collection Module
//!
//! Persistent ordered set of binary values stored inside one DataFile.
//!
//! ## Order
//! Byte-by-byte unsigned comparison; on equal prefix the shorter value sorts
//! first. An all-zero value of length L is therefore strictly less than an
//! all-zero value of any length greater than L. This is exactly the ordering
//! of `[u8]`.
//!
//! ## File Format
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │ Header (16 bytes)                                         │
//! │   Magic: "BCOL" (4) | Version: u16 (2) | Reserved (2)     │
//! │   Count: u64 (8)                                          │
//! ├───────────────────────────────────────────────────────────┤
//! │ Records (variable), strictly ascending                    │
//! │   [Len: u32][Value bytes]                                 │
//! │   ... repeated for each element ...                       │
//! └───────────────────────────────────────────────────────────┘
//! ```
//! Integers are big-endian. The file ends exactly after the last record.
//! Record offsets are loaded into memory when the file is wrapped, which
//! makes every lookup a binary search over the offset table.

mod binary;
mod cursor;
mod set;
mod tail;

pub use binary::Binary;
pub use cursor::{Cursor, Iter};
pub use set::BinaryCollection;
pub use tail::Tail;

// =============================================================================
// Shared Constants (used by set, cursor, tail)
// =============================================================================

/// Magic bytes identifying a collection file
pub(crate) const MAGIC: &[u8; 4] = b"BCOL";

/// Current collection format version
pub(crate) const VERSION: u16 = 1;

/// Header size: Magic (4) + Version (2) + Reserved (2) + Count (8) = 16 bytes
pub(crate) const HEADER_SIZE: u64 = 16;

/// Offset of the count field inside the header
pub(crate) const COUNT_OFFSET: u64 = 8;

/// Length prefix in front of every record
pub(crate) const LEN_PREFIX: u64 = 4;

/// Largest value a record can frame
pub const MAX_VALUE_LEN: usize = u32::MAX as usize;
