//! Key range filtering for ordered entry streams.
//!
//! Leaf walks hand their entries through a `RangeFilter`, which drops entries
//! outside the bounds and ends the walk as soon as the stream passes the far
//! bound in its direction of travel.

use crate::error::Result;
use std::ops::{Bound, RangeBounds};

/// Traversal direction for range scans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

/// A generic iterator adapter that filters entries by a key range.
/// This can wrap any iterator that produces `Result<(Vec<u8>, Vec<u8>)>` items
/// in key order (ascending or descending, per `direction`).
///
/// # Examples
///
/// ```ignore
/// let filtered = RangeFilter::new(walk, b"k10".to_vec()..=b"k20".to_vec(), Direction::Asc);
/// for result in filtered {
///     // Only entries with keys in the range will be yielded
/// }
/// ```
pub struct RangeFilter<I, R>
where
    I: Iterator<Item = Result<(Vec<u8>, Vec<u8>)>>,
    R: RangeBounds<Vec<u8>>,
{
    inner: I,
    range: R,
    direction: Direction,
    done: bool,
}

impl<I, R> RangeFilter<I, R>
where
    I: Iterator<Item = Result<(Vec<u8>, Vec<u8>)>>,
    R: RangeBounds<Vec<u8>>,
{
    /// Create a new range filter that wraps the given iterator.
    pub fn new(inner: I, range: R, direction: Direction) -> Self {
        Self {
            inner,
            range,
            direction,
            done: false,
        }
    }

    fn before_start(&self, key: &[u8]) -> bool {
        match self.range.start_bound() {
            Bound::Included(start) => key < start.as_slice(),
            Bound::Excluded(start) => key <= start.as_slice(),
            Bound::Unbounded => false,
        }
    }

    fn after_end(&self, key: &[u8]) -> bool {
        match self.range.end_bound() {
            Bound::Included(end) => key > end.as_slice(),
            Bound::Excluded(end) => key >= end.as_slice(),
            Bound::Unbounded => false,
        }
    }

    /// Check if a key is past the bound the stream is moving towards.
    fn is_key_exhausted(&self, key: &[u8]) -> bool {
        match self.direction {
            Direction::Asc => self.after_end(key),
            Direction::Desc => self.before_start(key),
        }
    }
}

impl<I, R> Iterator for RangeFilter<I, R>
where
    I: Iterator<Item = Result<(Vec<u8>, Vec<u8>)>>,
    R: RangeBounds<Vec<u8>>,
{
    type Item = Result<(Vec<u8>, Vec<u8>)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        loop {
            match self.inner.next()? {
                Ok((key, value)) => {
                    if self.is_key_exhausted(&key) {
                        self.done = true;
                        return None;
                    }
                    if !self.before_start(&key) && !self.after_end(&key) {
                        return Some(Ok((key, value)));
                    }
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }
    }
}
