//! Collection enumeration
//!
//! `Iter` is a read-only pass; `Cursor` can also remove the element it is
//! positioned on without disturbing the rest of the pass.

use crate::error::Result;

use super::set::BinaryCollection;
use super::Binary;

/// Ascending pass over a rank range of a collection
///
/// Reads each element from the file on demand.
pub struct Iter<'c, 'f> {
    collection: &'c BinaryCollection<'f>,
    next: usize,
    end: usize,
}

impl<'c, 'f> Iter<'c, 'f> {
    pub(crate) fn new(collection: &'c BinaryCollection<'f>, start: usize, end: usize) -> Self {
        Self {
            collection,
            next: start,
            end,
        }
    }
}

impl<'c, 'f> Iterator for Iter<'c, 'f> {
    type Item = Result<Binary>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.end {
            return None;
        }
        let item = self.collection.value_at(self.next);
        self.next += 1;
        Some(item)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.end.saturating_sub(self.next);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Iter<'_, '_> {}

/// Enumerator with in-place removal
///
/// ```text
///   move_next() ──▶ current() ──▶ remove_current()
///        ▲                               │
///        └──── continues at the element that followed the removed one
/// ```
pub struct Cursor<'c, 'f> {
    collection: &'c mut BinaryCollection<'f>,

    /// Rank the next `move_next` will yield
    next: usize,

    /// Rank and value of the element last yielded
    current: Option<(usize, Binary)>,
}

impl<'c, 'f> Cursor<'c, 'f> {
    pub(crate) fn new(collection: &'c mut BinaryCollection<'f>) -> Self {
        Self {
            collection,
            next: 0,
            current: None,
        }
    }

    /// Advance; false once the pass is exhausted
    pub fn move_next(&mut self) -> Result<bool> {
        if self.next >= self.collection.len() {
            self.current = None;
            return Ok(false);
        }
        let value = self.collection.value_at(self.next)?;
        self.current = Some((self.next, value));
        self.next += 1;
        Ok(true)
    }

    /// Element last yielded by `move_next`, if still present
    pub fn current(&self) -> Option<&Binary> {
        self.current.as_ref().map(|(_, value)| value)
    }

    /// Remove the current element; false when there is none
    ///
    /// The following `move_next` yields the element after the removed one.
    pub fn remove_current(&mut self) -> Result<bool> {
        let rank = match &self.current {
            Some((rank, _)) => *rank,
            None => return Ok(false),
        };
        self.collection.remove_at(rank)?;
        self.current = None;
        self.next = rank;
        Ok(true)
    }

    /// Rewind to the start for a fresh pass
    pub fn reset(&mut self) {
        self.next = 0;
        self.current = None;
    }
}
