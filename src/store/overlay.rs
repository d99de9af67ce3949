//! Write buffer over a store.
//!
//! An `Overlay` answers reads from its buffered writes first and the
//! underlying store second, but sends nothing to the store until `commit`.
//! Write calls that touch several structures (a block batch and its indexes,
//! a tree insert and the overflow list it opens) run against one overlay, so
//! a failure anywhere in the call leaves the store untouched.

use std::collections::BTreeMap;
use std::ops::RangeBounds;

use crossbeam_skiplist::SkipMap;

use super::KeyValueStore;
use crate::error::Result;

/// A buffered write: `Some` puts the value, `None` deletes the key.
pub type BufferedWrite = (Vec<u8>, Option<Vec<u8>>);

pub struct Overlay<'a, S: KeyValueStore> {
    inner: &'a S,
    writes: SkipMap<Vec<u8>, Option<Vec<u8>>>,
}

impl<'a, S: KeyValueStore> Overlay<'a, S> {
    pub fn new(inner: &'a S) -> Self {
        Self {
            inner,
            writes: SkipMap::new(),
        }
    }

    pub fn staged_len(&self) -> usize {
        self.writes.len()
    }

    /// Buffered writes in key order.
    pub fn into_writes(self) -> Vec<BufferedWrite> {
        self.writes.into_iter().collect()
    }

    /// Applies a batch of buffered writes to `store`.
    pub fn apply(store: &S, writes: Vec<BufferedWrite>) -> Result<()> {
        let count = writes.len();
        for (key, value) in writes {
            match value {
                Some(bytes) => store.put(&key, bytes)?,
                None => store.delete(&key)?,
            }
        }
        tracing::trace!(count, "applied buffered writes");
        Ok(())
    }

    /// Sends every buffered write to the underlying store.
    pub fn commit(self) -> Result<()> {
        let inner = self.inner;
        Self::apply(inner, self.into_writes())
    }
}

impl<'a, S: KeyValueStore> KeyValueStore for Overlay<'a, S> {
    type ScanIterator<'b> = std::vec::IntoIter<Result<(Vec<u8>, Vec<u8>)>>
    where
        Self: Sized + 'b;

    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        match self.writes.get(key) {
            Some(entry) => Ok(entry.value().clone()),
            None => self.inner.get(key),
        }
    }

    fn put(&self, key: &[u8], value: Vec<u8>) -> Result<()> {
        self.writes.insert(key.to_vec(), Some(value));
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> Result<()> {
        self.writes.insert(key.to_vec(), None);
        Ok(())
    }

    fn scan<'b>(
        &'b self,
        range: impl RangeBounds<Vec<u8>> + Clone + Send + Sync + 'b,
    ) -> Self::ScanIterator<'b> {
        let mut merged = BTreeMap::new();
        for entry in self.inner.scan(range.clone()) {
            match entry {
                Ok((key, value)) => {
                    merged.insert(key, value);
                }
                Err(err) => return vec![Err(err)].into_iter(),
            }
        }
        for entry in self.writes.range(range) {
            match entry.value() {
                Some(value) => {
                    merged.insert(entry.key().clone(), value.clone());
                }
                None => {
                    merged.remove(entry.key());
                }
            }
        }
        merged.into_iter().map(Ok).collect::<Vec<_>>().into_iter()
    }

    fn tx_id(&self) -> String {
        self.inner.tx_id()
    }

    fn tx_timestamp(&self) -> i64 {
        self.inner.tx_timestamp()
    }

    fn create_composite_key(&self, object_type: &str, parts: &[&[u8]]) -> Vec<u8> {
        self.inner.create_composite_key(object_type, parts)
    }

    fn split_composite_key(&self, key: &[u8]) -> Result<(String, Vec<Vec<u8>>)> {
        self.inner.split_composite_key(key)
    }
}
