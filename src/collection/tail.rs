//! Tail view
//!
//! Elements greater than or equal to a bound, read straight from the
//! collection's file starting at the bound's rank. Nothing is copied.

use crate::error::{Result, StoreError};

use super::cursor::Iter;
use super::set::BinaryCollection;
use super::Binary;

/// Live sub-collection of elements `>= bound`
pub struct Tail<'c, 'f> {
    collection: &'c BinaryCollection<'f>,

    /// Rank of the first element in the view
    start: usize,
}

impl<'c, 'f> Tail<'c, 'f> {
    pub(crate) fn new(collection: &'c BinaryCollection<'f>, start: usize) -> Self {
        Self { collection, start }
    }

    pub fn len(&self) -> usize {
        self.collection.len().saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Smallest element in the view
    pub fn first(&self) -> Result<Binary> {
        if self.is_empty() {
            return Err(StoreError::EmptyCollection);
        }
        self.collection.value_at(self.start)
    }

    pub fn contains(&self, value: &[u8]) -> Result<bool> {
        Ok(match self.collection.search(value)? {
            Ok(rank) => rank >= self.start,
            Err(_) => false,
        })
    }

    /// Narrower view of elements `>= value` that are also in this one
    pub fn tail(&self, value: &[u8]) -> Result<Tail<'c, 'f>> {
        let start = self.collection.lower_bound(value)?.max(self.start);
        Ok(Tail::new(self.collection, start))
    }

    pub fn iter(&self) -> Iter<'c, 'f> {
        Iter::new(self.collection, self.start, self.collection.len())
    }
}

impl<'c, 'f> IntoIterator for &Tail<'c, 'f> {
    type Item = Result<Binary>;
    type IntoIter = Iter<'c, 'f>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
