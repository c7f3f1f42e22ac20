//! 128-bit Address
//!
//! A two-word, totally ordered identifier. Used for transaction ids and as
//! the numeric part of every [`Key`](crate::Key).
//!
//! ## Ordering
//! `high` compares as a signed 64-bit integer first; ties are broken by `low`
//! compared as unsigned, so a `low` with its sign bit set sorts after one
//! without.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError};

/// Two-word identifier with a total order
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    high: i64,
    low: u64,
}

impl Address {
    /// Size of the big-endian byte form
    pub const BYTES: usize = 16;

    pub const MIN: Address = Address { high: i64::MIN, low: 0 };
    pub const MAX: Address = Address { high: i64::MAX, low: u64::MAX };

    pub const fn new(high: i64, low: u64) -> Self {
        Self { high, low }
    }

    pub const fn high(&self) -> i64 {
        self.high
    }

    pub const fn low(&self) -> u64 {
        self.low
    }

    /// Big-endian encoding: high word then low word
    pub fn to_bytes(&self) -> [u8; Self::BYTES] {
        let mut out = [0u8; Self::BYTES];
        out[..8].copy_from_slice(&self.high.to_be_bytes());
        out[8..].copy_from_slice(&self.low.to_be_bytes());
        out
    }

    pub fn from_bytes(bytes: [u8; Self::BYTES]) -> Self {
        let mut high = [0u8; 8];
        let mut low = [0u8; 8];
        high.copy_from_slice(&bytes[..8]);
        low.copy_from_slice(&bytes[8..]);
        Self {
            high: i64::from_be_bytes(high),
            low: u64::from_be_bytes(low),
        }
    }
}

impl From<(i64, u64)> for Address {
    fn from((high, low): (i64, u64)) -> Self {
        Self::new(high, low)
    }
}

impl From<Address> for (i64, u64) {
    fn from(address: Address) -> Self {
        (address.high, address.low)
    }
}

impl Ord for Address {
    fn cmp(&self, other: &Self) -> Ordering {
        self.high
            .cmp(&other.high)
            .then_with(|| self.low.cmp(&other.low))
    }
}

impl PartialOrd for Address {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Hash for Address {
    fn hash<H: Hasher>(&self, state: &mut H) {
        // Lower bits of the low word only; equal addresses still hash equal.
        state.write_u32(self.low as u32);
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:x}.{:x}", self.high as u64, self.low)
    }
}

impl FromStr for Address {
    type Err = StoreError;

    /// Parse the `Display` form, `"{high:x}.{low:x}"`
    fn from_str(s: &str) -> Result<Self> {
        let (high, low) = s
            .split_once('.')
            .ok_or_else(|| StoreError::InvalidArgument(format!("malformed address: {s:?}")))?;
        let high = u64::from_str_radix(high, 16)
            .map_err(|e| StoreError::InvalidArgument(format!("bad address high word {high:?}: {e}")))?;
        let low = u64::from_str_radix(low, 16)
            .map_err(|e| StoreError::InvalidArgument(format!("bad address low word {low:?}: {e}")))?;
        Ok(Self::new(high as i64, low))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::hash_map::DefaultHasher;

    fn hash_of(a: &Address) -> u64 {
        let mut h = DefaultHasher::new();
        a.hash(&mut h);
        h.finish()
    }

    #[test]
    fn test_high_word_is_signed() {
        assert!(Address::new(-1, 0) < Address::new(0, 0));
        assert!(Address::new(i64::MIN, u64::MAX) < Address::new(i64::MAX, 0));
    }

    #[test]
    fn test_low_word_is_unsigned() {
        let small = Address::new(7, 1);
        let big = Address::new(7, 0x8000_0000_0000_0000);
        assert!(small < big);
        assert!(Address::new(7, u64::MAX) > big);
    }

    #[test]
    fn test_equality_needs_both_words() {
        assert_eq!(Address::new(3, 4), Address::new(3, 4));
        assert_ne!(Address::new(3, 4), Address::new(4, 4));
        assert_ne!(Address::new(3, 4), Address::new(3, 5));
    }

    #[test]
    fn test_hash_uses_low_bits() {
        assert_eq!(hash_of(&Address::new(1, 42)), hash_of(&Address::new(2, 42)));
        assert_eq!(
            hash_of(&Address::new(0, 0x1_0000_0005)),
            hash_of(&Address::new(0, 5))
        );
    }

    #[test]
    fn test_display_and_parse() {
        let a = Address::new(0x1f, 0xabc);
        assert_eq!(a.to_string(), "1f.abc");
        assert_eq!("1f.abc".parse::<Address>().unwrap(), a);

        let negative = Address::new(-1, 2);
        assert_eq!(negative.to_string(), "ffffffffffffffff.2");
        assert_eq!(negative.to_string().parse::<Address>().unwrap(), negative);

        assert!(matches!(
            "nodot".parse::<Address>(),
            Err(StoreError::InvalidArgument(_))
        ));
        assert!(matches!(
            "zz.1".parse::<Address>(),
            Err(StoreError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_bytes_and_pairs() {
        let a = Address::new(-5, 99);
        assert_eq!(Address::from_bytes(a.to_bytes()), a);
        assert_eq!(Address::from((-5, 99)), a);
        let pair: (i64, u64) = a.into();
        assert_eq!(pair, (-5, 99));
    }
}
