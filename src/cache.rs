//! Call-scoped node cache.
//!
//! One `NodeCache` lives for exactly one write call (a tree insert, a list
//! append, a block batch). Reads made during the call land in the read map so
//! the same node is fetched from the store at most once; mutated nodes are
//! staged in the write map and handed back in key order for a single flush at
//! the end of the call. Nothing here outlives the call.

use std::{
    collections::{BTreeMap, HashMap},
    fmt::Debug,
    hash::Hash,
};

use crate::error::Result;

pub struct NodeCache<K, V>
where
    K: Ord + Eq + Hash + Clone + Debug,
    V: Clone,
{
    /// nodes read from the store during this call
    reads: HashMap<K, V>,
    /// nodes mutated during this call, flushed in key order
    writes: BTreeMap<K, V>,
    stats: Stats,
}

impl<K, V> NodeCache<K, V>
where
    K: Ord + Eq + Hash + Clone + Debug,
    V: Clone,
{
    pub fn new() -> Self {
        NodeCache {
            reads: HashMap::new(),
            writes: BTreeMap::new(),
            stats: Stats::default(),
        }
    }

    /// Returns the newest known version of the node, staged writes first.
    pub fn get(&mut self, key: &K) -> Option<&V> {
        let found = self.writes.get(key).or_else(|| self.reads.get(key));
        if found.is_some() {
            self.stats.hits += 1;
        } else {
            self.stats.misses += 1;
        }
        found
    }

    /// Returns the cached node or loads it with `fetch`, remembering the result.
    pub fn load<F>(&mut self, key: &K, fetch: F) -> Result<Option<V>>
    where
        F: FnOnce(&K) -> Result<Option<V>>,
    {
        if let Some(value) = self.get(key) {
            return Ok(Some(value.clone()));
        }
        let fetched = fetch(key)?;
        if let Some(value) = &fetched {
            self.reads.insert(key.clone(), value.clone());
        }
        Ok(fetched)
    }

    /// Stages a mutated node for the end-of-call flush.
    pub fn stage(&mut self, key: K, value: V) {
        self.writes.insert(key, value);
    }

    pub fn staged_len(&self) -> usize {
        self.writes.len()
    }

    /// Consumes the cache, yielding staged writes in key order.
    pub fn into_writes(self) -> BTreeMap<K, V> {
        self.writes
    }

    /// Hits and misses so far, reported when the owning call flushes.
    pub fn stats(&self) -> (usize, usize) {
        (self.stats.hits, self.stats.misses)
    }
}

impl<K, V> Default for NodeCache<K, V>
where
    K: Ord + Eq + Hash + Clone + Debug,
    V: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Default)]
struct Stats {
    hits: usize,
    misses: usize,
}
