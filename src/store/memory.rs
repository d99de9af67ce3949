//! In-memory ledger store on a skip list.
//!
//! `SkipMap` keeps keys in byte order, which is all the engine needs from its
//! substrate: point reads, writes and ordered range scans. Scans return a
//! snapshot of the matching range, so writes issued while a caller is still
//! draining a scan do not disturb it.

use super::KeyValueStore;
use crate::error::Result;
use crossbeam_skiplist::SkipMap;
use std::ops::RangeBounds;
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug, Default)]
pub struct MemoryStore {
    data: SkipMap<Vec<u8>, Vec<u8>>,
    tx_id: String,
    tx_timestamp: i64,
    writes: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a new transaction context for subsequent calls.
    pub fn begin(&mut self, tx_id: impl Into<String>, tx_timestamp: i64) {
        self.tx_id = tx_id.into();
        self.tx_timestamp = tx_timestamp;
    }

    /// Number of puts and deletes issued so far.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl KeyValueStore for MemoryStore {
    type ScanIterator<'a> = std::vec::IntoIter<Result<(Vec<u8>, Vec<u8>)>>;

    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.data.get(key).map(|entry| entry.value().clone()))
    }

    fn put(&self, key: &[u8], value: Vec<u8>) -> Result<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.data.insert(key.to_vec(), value);
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> Result<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.data.remove(key);
        Ok(())
    }

    fn scan<'a>(
        &'a self,
        range: impl RangeBounds<Vec<u8>> + Clone + Send + Sync + 'a,
    ) -> Self::ScanIterator<'a> {
        self.data
            .range(range)
            .map(|entry| Ok((entry.key().clone(), entry.value().clone())))
            .collect::<Vec<_>>()
            .into_iter()
    }

    fn tx_id(&self) -> String {
        self.tx_id.clone()
    }

    fn tx_timestamp(&self) -> i64 {
        self.tx_timestamp
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(iter: impl Iterator<Item = Result<(Vec<u8>, Vec<u8>)>>) -> Vec<Vec<u8>> {
        iter.map(|r| r.unwrap().0).collect()
    }

    #[test]
    fn test_put_get_delete() {
        let store = MemoryStore::new();
        store.put(b"a", b"1".to_vec()).unwrap();
        assert_eq!(store.get(b"a").unwrap(), Some(b"1".to_vec()));
        store.delete(b"a").unwrap();
        assert_eq!(store.get(b"a").unwrap(), None);
        assert_eq!(store.write_count(), 2);
    }

    #[test]
    fn test_scan_is_ordered() {
        let store = MemoryStore::new();
        for key in [b"c", b"a", b"b", b"d"] {
            store.put(key, vec![]).unwrap();
        }
        let scanned = keys(store.scan(b"b".to_vec()..=b"c".to_vec()));
        assert_eq!(scanned, vec![b"b".to_vec(), b"c".to_vec()]);
    }

    #[test]
    fn test_scan_prefix() {
        let store = MemoryStore::new();
        store.put(b"ab\xff", vec![]).unwrap();
        store.put(b"ab\x01", vec![]).unwrap();
        store.put(b"ac", vec![]).unwrap();
        store.put(b"a", vec![]).unwrap();
        let scanned = keys(store.scan_prefix(b"ab"));
        assert_eq!(scanned, vec![b"ab\x01".to_vec(), b"ab\xff".to_vec()]);
    }

    #[test]
    fn test_scan_by_composite_prefix() {
        let store = MemoryStore::new();
        let k1 = store.create_composite_key("block", &[b"users", &1u64.to_be_bytes()]);
        let k2 = store.create_composite_key("block", &[b"users", &2u64.to_be_bytes()]);
        let k3 = store.create_composite_key("block", &[b"orders", &1u64.to_be_bytes()]);
        for k in [&k1, &k2, &k3] {
            store.put(k, vec![]).unwrap();
        }
        let scanned = keys(store.scan_by_prefix("block", &[b"users"]));
        assert_eq!(scanned, vec![k1.clone(), k2]);

        let (object_type, parts) = store.split_composite_key(&k1).unwrap();
        assert_eq!(object_type, "block");
        assert_eq!(parts[0], b"users");
    }

    #[test]
    fn test_transaction_context() {
        let mut store = MemoryStore::new();
        store.begin("tx-1", 1_700_000_000);
        assert_eq!(store.tx_id(), "tx-1");
        assert_eq!(store.tx_timestamp(), 1_700_000_000);
    }
}
