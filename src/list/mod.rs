//! Overflow lists.
//!
//! A doubly linked, append-only chain of size-bounded nodes holding the value
//! set of one index key once it outgrows an inline collection. The head keeps
//! `first`, `last`, the node counter and the value count current as nodes are
//! appended, so no scan is ever needed to find the tail.
//!
//! ```text
//! head ─first─▶ [n1] ⇄ [n2] ⇄ ... ⇄ [nk] ◀─last─ head
//! ```

use serde::{Deserialize, Serialize};

use crate::cache::NodeCache;
use crate::config::EngineConfig;
use crate::encoding::bincode::serialized_size;
use crate::encoding::format::{Composite, Formatter};
use crate::encoding::Value;
use crate::error::Result;
use crate::filter::Direction;
use crate::pointer::Pointer;
use crate::store::KeyValueStore;
use crate::Error;

const LIST_HEAD: &str = "list.head";
const LIST_NODE: &str = "list.node";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListHead {
    pub key: Vec<u8>,
    /// Last pointer handed out.
    pub order: Pointer,
    pub count: u64,
    pub first: Pointer,
    pub last: Pointer,
}

impl ListHead {
    fn new(key: &[u8]) -> Self {
        Self {
            key: key.to_vec(),
            order: Pointer::NULL,
            count: 0,
            first: Pointer::NULL,
            last: Pointer::NULL,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListNode {
    pub prev: Pointer,
    pub next: Pointer,
    pub values: Vec<Vec<u8>>,
}

/// Fails with `InvalidArgument` when `value` cannot fit an empty list
/// node under `config`.
pub fn check_value(config: &EngineConfig, value: &[u8]) -> Result<()> {
    let empty_size = serialized_size(&ListNode::default())?;
    if empty_size + serialized_size(&value)? > config.node_size {
        return Err(Error::InvalidArgument(format!(
            "value of {} bytes does not fit an overflow list node",
            value.len()
        )));
    }
    Ok(())
}

pub struct OverflowList<'a, S: KeyValueStore> {
    store: &'a S,
    config: &'a EngineConfig,
}

impl<'a, S: KeyValueStore> OverflowList<'a, S> {
    pub fn new(store: &'a S, config: &'a EngineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { store, config })
    }

    fn head_key(&self, key: &[u8]) -> Vec<u8> {
        self.store.create_composite_key(LIST_HEAD, &[key])
    }

    fn node_key(&self, key: &[u8], pointer: Pointer) -> Vec<u8> {
        self.store
            .create_composite_key(LIST_NODE, &[key, &pointer.to_bytes()])
    }

    /// Returns the list head for `key`, creating an empty list if needed.
    pub fn create_head(&self, key: &[u8]) -> Result<ListHead> {
        if key.is_empty() {
            return Err(Error::InvalidArgument("list key is empty".to_string()));
        }
        if let Some(head) = self.search_head(key)? {
            return Ok(head);
        }
        let head = ListHead::new(key);
        self.store.put(&self.head_key(key), head.encode()?)?;
        tracing::debug!(key = %Composite::key(key), "created overflow list");
        Ok(head)
    }

    pub fn search_head(&self, key: &[u8]) -> Result<Option<ListHead>> {
        match self.store.get(&self.head_key(key))? {
            Some(bytes) => Ok(Some(ListHead::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    fn read_node(&self, key: &[u8], pointer: Pointer) -> Result<ListNode> {
        tracing::trace!(pointer = %pointer, "reading list node");
        match self.store.get(&self.node_key(key, pointer))? {
            Some(bytes) => ListNode::decode(&bytes),
            None => {
                tracing::warn!(key = %Composite::key(key), pointer = %pointer, "list node missing");
                Err(Error::Corrupt(format!(
                    "overflow list node {} is missing",
                    pointer
                )))
            }
        }
    }

    /// Appends `values` at the tail, opening a new tail node whenever the
    /// current one would exceed the node size.
    pub fn insert(&self, head: &ListHead, values: &[Vec<u8>]) -> Result<ListHead> {
        for value in values {
            check_value(self.config, value)?;
        }
        let empty_size = serialized_size(&ListNode::default())?;

        let mut head = head.clone();
        let mut cache: NodeCache<Pointer, ListNode> = NodeCache::new();

        let (mut tail_ptr, mut tail, mut size) = if head.last.is_null() {
            (Pointer::NULL, None, 0)
        } else {
            let node = self.read_node(&head.key, head.last)?;
            let size = serialized_size(&node)?;
            (head.last, Some(node), size)
        };

        for value in values {
            let value_size = serialized_size(value)?;
            let full = match &tail {
                Some(_) => size + value_size > self.config.node_size,
                None => true,
            };
            if full {
                let pointer = head.order.next()?;
                head.order = pointer;
                let mut node = ListNode {
                    prev: tail_ptr,
                    ..ListNode::default()
                };
                if let Some(mut old) = tail.take() {
                    old.next = pointer;
                    cache.stage(tail_ptr, old);
                }
                if head.first.is_null() {
                    head.first = pointer;
                }
                head.last = pointer;
                node.values.push(value.clone());
                size = empty_size + value_size;
                tail_ptr = pointer;
                tail = Some(node);
            } else if let Some(node) = tail.as_mut() {
                node.values.push(value.clone());
                size += value_size;
            }
            head.count += 1;
        }

        if let Some(node) = tail {
            cache.stage(tail_ptr, node);
        }

        // Encode everything before the first write goes out.
        let (hits, misses) = cache.stats();
        tracing::trace!(
            key = %Composite::key(&head.key),
            nodes = cache.staged_len(),
            hits,
            misses,
            "flushing overflow list"
        );
        let mut batch = Vec::with_capacity(cache.staged_len() + 1);
        for (pointer, node) in cache.into_writes() {
            batch.push((self.node_key(&head.key, pointer), node.encode()?));
        }
        batch.push((self.head_key(&head.key), head.encode()?));
        for (key, bytes) in batch {
            self.store.put(&key, bytes)?;
        }
        Ok(head)
    }

    /// Reads up to `limit` values from one end of the list, returning them
    /// together with the list's total value count.
    pub fn search_by_range(
        &self,
        head: &ListHead,
        direction: Direction,
        limit: usize,
    ) -> Result<(Vec<Vec<u8>>, u64)> {
        let mut out = Vec::new();
        let mut pointer = match direction {
            Direction::Asc => head.first,
            Direction::Desc => head.last,
        };
        let mut visited = 0u32;
        while !pointer.is_null() && out.len() < limit {
            visited += 1;
            if visited > head.order.get() {
                return Err(Error::Corrupt(format!(
                    "overflow list {} links form a cycle",
                    Composite::key(&head.key)
                )));
            }
            let node = self.read_node(&head.key, pointer)?;
            let wanted = limit - out.len();
            match direction {
                Direction::Asc => {
                    out.extend(node.values.into_iter().take(wanted));
                    pointer = node.next;
                }
                Direction::Desc => {
                    out.extend(node.values.into_iter().rev().take(wanted));
                    pointer = node.prev;
                }
            }
        }
        Ok((out, head.count))
    }
}
