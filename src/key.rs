//! Key
//!
//! Names exactly one logical file inside a Database's namespace: a category
//! tag plus the two numeric words of an [`Address`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::address::Address;
use crate::error::{Result, StoreError};

/// Compound file identifier
///
/// Ordered by category, then address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Key {
    category: u32,
    address: Address,
}

impl Key {
    /// File name suffix used by the filesystem backend
    pub(crate) const FILE_SUFFIX: &'static str = "dat";

    pub const fn new(category: u32, high: i64, low: u64) -> Self {
        Self {
            category,
            address: Address::new(high, low),
        }
    }

    pub const fn from_address(category: u32, address: Address) -> Self {
        Self { category, address }
    }

    pub const fn category(&self) -> u32 {
        self.category
    }

    pub const fn address(&self) -> Address {
        self.address
    }

    /// "0000002a-0000000000000001-0000000000000007.dat"
    pub(crate) fn file_name(&self) -> String {
        format!(
            "{:08x}-{:016x}-{:016x}.{}",
            self.category,
            self.address.high() as u64,
            self.address.low(),
            Self::FILE_SUFFIX
        )
    }

    /// Inverse of `file_name`; None for anything that is not a key file
    pub(crate) fn parse_file_name(name: &str) -> Option<Self> {
        let stem = name.strip_suffix(Self::FILE_SUFFIX)?.strip_suffix('.')?;
        let mut parts = stem.split('-');
        let category = parts.next().filter(|p| p.len() == 8)?;
        let high = parts.next().filter(|p| p.len() == 16)?;
        let low = parts.next().filter(|p| p.len() == 16)?;
        if parts.next().is_some() {
            return None;
        }
        Some(Self::new(
            u32::from_str_radix(category, 16).ok()?,
            u64::from_str_radix(high, 16).ok()? as i64,
            u64::from_str_radix(low, 16).ok()?,
        ))
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:x}/{}", self.category, self.address)
    }
}

impl FromStr for Key {
    type Err = StoreError;

    /// Parse `"{category:x}/{high:x}.{low:x}"`
    fn from_str(s: &str) -> Result<Self> {
        let (category, address) = s
            .split_once('/')
            .ok_or_else(|| StoreError::InvalidArgument(format!("malformed key: {s:?}")))?;
        let category = u32::from_str_radix(category, 16)
            .map_err(|e| StoreError::InvalidArgument(format!("bad key category {category:?}: {e}")))?;
        Ok(Self::from_address(category, address.parse()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_name_round_trip() {
        let key = Key::new(0x2a, -3, 7);
        let name = key.file_name();
        assert_eq!(name, "0000002a-fffffffffffffffd-0000000000000007.dat");
        assert_eq!(Key::parse_file_name(&name), Some(key));
    }

    #[test]
    fn test_parse_file_name_rejects_foreign_files() {
        assert_eq!(Key::parse_file_name("COMMIT"), None);
        assert_eq!(Key::parse_file_name("0000002a-0-0.dat"), None);
        assert_eq!(
            Key::parse_file_name("0000002a-0000000000000000-0000000000000000.pending"),
            None
        );
    }

    #[test]
    fn test_text_form() {
        let key = Key::new(3, 1, 0xff);
        assert_eq!(key.to_string(), "3/1.ff");
        assert_eq!("3/1.ff".parse::<Key>().unwrap(), key);
        assert!(matches!("3-1.ff".parse::<Key>(), Err(StoreError::InvalidArgument(_))));
        assert!(matches!("x/1.ff".parse::<Key>(), Err(StoreError::InvalidArgument(_))));
    }

    #[test]
    fn test_ordering_category_first() {
        assert!(Key::new(1, i64::MAX, u64::MAX) < Key::new(2, i64::MIN, 0));
        assert!(Key::new(1, 0, 1) < Key::new(1, 0, u64::MAX));
    }
}
