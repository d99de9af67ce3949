pub mod memory;
pub mod overlay;

pub use memory::MemoryStore;
pub use overlay::Overlay;

use crate::encoding::keycode;
use crate::error::Result;
use std::ops::RangeBounds;

/// The ordered key-value ledger the engine runs on.
///
/// Every call happens inside one ledger transaction; the store is the only
/// source of truth and the engine never locks it.
pub trait KeyValueStore {
    /// The iterator returned by scan().
    type ScanIterator<'a>: ScanIterator + 'a
    where
        Self: Sized + 'a;

    /// Retrieves the value for a given key.
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Inserts or updates a key-value pair.
    fn put(&self, key: &[u8], value: Vec<u8>) -> Result<()>;

    /// Removes a key. Removing a missing key is not an error.
    fn delete(&self, key: &[u8]) -> Result<()>;

    /// Iterates over an ordered range of key-value pairs.
    fn scan<'a>(
        &'a self,
        range: impl RangeBounds<Vec<u8>> + Clone + Send + Sync + 'a,
    ) -> Self::ScanIterator<'a>
    where
        Self: Sized;

    /// Id of the transaction the current call runs in.
    fn tx_id(&self) -> String;

    /// Timestamp of the current transaction, in seconds.
    fn tx_timestamp(&self) -> i64;

    /// Iterates over all key-value pairs starting with the given prefix.
    fn scan_prefix<'a>(&'a self, prefix: &[u8]) -> Self::ScanIterator<'a>
    where
        Self: Sized,
    {
        let start = std::ops::Bound::Included(prefix.to_vec());
        let end = match prefix.iter().rposition(|b| *b != 0xff) {
            Some(i) => std::ops::Bound::Excluded(
                prefix[..i]
                    .iter()
                    .chain(std::iter::once(&(prefix[i] + 1)))
                    .copied()
                    .collect::<Vec<u8>>(),
            ),
            None => std::ops::Bound::Unbounded,
        };
        self.scan((start, end))
    }

    /// Iterates over every composite key of `object_type` whose leading parts
    /// equal `parts`.
    fn scan_by_prefix<'a>(&'a self, object_type: &str, parts: &[&[u8]]) -> Self::ScanIterator<'a>
    where
        Self: Sized,
    {
        let prefix = self.create_composite_key(object_type, parts);
        self.scan_prefix(&prefix)
    }

    fn create_composite_key(&self, object_type: &str, parts: &[&[u8]]) -> Vec<u8> {
        keycode::encode_composite(object_type, parts)
    }

    fn split_composite_key(&self, key: &[u8]) -> Result<(String, Vec<Vec<u8>>)> {
        keycode::decode_composite(key)
    }
}

pub trait ScanIterator: Iterator<Item = Result<(Vec<u8>, Vec<u8>)>> {}

impl<I> ScanIterator for I where I: Iterator<Item = Result<(Vec<u8>, Vec<u8>)>> {}
