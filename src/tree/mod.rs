//! B+Tree secondary index over byte keys.
//!
//! One tree per (table, column). Nodes live in the key-value store addressed
//! by `Pointer`; all parent/child and sibling relations are stored pointers,
//! never in-memory references. Leaves form a doubly linked chain used by
//! range scans, and every internal key is the smallest key of its subtree.
//!
//! Leaf values carry a trailing tag (see `encoding::tagged`). A key's value
//! set grows from a single value to an inline collection and, once the
//! collection reaches the configured threshold, into an overflow list.
//!
//! Writes go through a call-scoped `NodeCache` and are flushed together,
//! head last, at the end of each call.

mod insert;
pub mod mode;
pub mod node;
mod scan;

pub use mode::InsertMode;
pub use node::{NodeKind, OrderMode, TreeHead, TreeNode};
pub use scan::IndexEntry;

use itertools::Itertools as _;

use crate::cache::NodeCache;
use crate::config::EngineConfig;
use crate::encoding::format::{Formatter, Raw};
use crate::encoding::keycode;
use crate::encoding::tagged::{decode_collection, decode_value, ValueTag};
use crate::encoding::Value;
use crate::error::Result;
use crate::filter::Direction;
use crate::list::OverflowList;
use crate::pointer::Pointer;
use crate::store::{KeyValueStore, Overlay};
use crate::Error;
use node::{is_tombstone, nearest, tombstone, Nearest};

const TREE_HEAD: &str = "tree.head";
const TREE_NODE: &str = "tree.node";
const LIST_KEY: &str = "tree.list";

/// One step of a root-to-leaf descent: the node and the child index taken.
#[derive(Debug, Clone, Copy)]
pub(crate) struct PathStep {
    pub pointer: Pointer,
    pub index: usize,
}

pub(crate) type TreeCache = NodeCache<Pointer, TreeNode>;

pub struct IndexTree<'a, S: KeyValueStore> {
    store: &'a S,
    config: &'a EngineConfig,
}

impl<'a, S: KeyValueStore> IndexTree<'a, S> {
    pub fn new(store: &'a S, config: &'a EngineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { store, config })
    }

    pub fn config(&self) -> &EngineConfig {
        self.config
    }

    fn head_key(&self, table: &str, column: &str) -> Vec<u8> {
        self.store
            .create_composite_key(TREE_HEAD, &[table.as_bytes(), column.as_bytes()])
    }

    fn node_key(&self, head: &TreeHead, pointer: Pointer) -> Vec<u8> {
        self.store.create_composite_key(
            TREE_NODE,
            &[
                head.table.as_bytes(),
                head.column.as_bytes(),
                &pointer.to_bytes(),
            ],
        )
    }

    /// Key of the overflow list backing `key`'s value set.
    fn list_key(&self, head: &TreeHead, key: &[u8]) -> Vec<u8> {
        keycode::encode_composite(
            LIST_KEY,
            &[
                head.table.as_bytes(),
                head.column.as_bytes(),
                key,
                &head.list_counter.to_be_bytes(),
            ],
        )
    }

    /// Returns the head for (table, column), creating an empty tree if needed.
    pub fn create_head(&self, table: &str, column: &str, order: OrderMode) -> Result<TreeHead> {
        if table.is_empty() || column.is_empty() {
            return Err(Error::InvalidArgument(
                "table and column names must not be empty".to_string(),
            ));
        }
        if let Some(head) = self.search_head(table, column)? {
            return Ok(head);
        }
        let head = TreeHead::new(table, column, order);
        self.store.put(&self.head_key(table, column), head.encode()?)?;
        tracing::debug!(table, column, ?order, "created index head");
        Ok(head)
    }

    pub fn search_head(&self, table: &str, column: &str) -> Result<Option<TreeHead>> {
        match self.store.get(&self.head_key(table, column))? {
            Some(bytes) => Ok(Some(TreeHead::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Lists the column names that have an index head for `table`.
    pub fn columns(&self, table: &str) -> Result<Vec<String>> {
        let mut columns = Vec::new();
        for entry in self.store.scan_by_prefix(TREE_HEAD, &[table.as_bytes()]) {
            let (_, bytes) = entry?;
            columns.push(TreeHead::decode(&bytes)?.column);
        }
        Ok(columns)
    }

    fn read_node(&self, head: &TreeHead, pointer: Pointer) -> Result<Option<TreeNode>> {
        tracing::trace!(table = %head.table, column = %head.column, pointer = %pointer, "reading node");
        match self.store.get(&self.node_key(head, pointer))? {
            Some(bytes) => Ok(Some(TreeNode::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Loads a node that some stored pointer refers to.
    pub(crate) fn load_node(
        &self,
        head: &TreeHead,
        cache: &mut TreeCache,
        pointer: Pointer,
    ) -> Result<TreeNode> {
        match cache.load(&pointer, |p| self.read_node(head, *p))? {
            Some(node) => Ok(node),
            None => {
                tracing::warn!(
                    table = %head.table,
                    column = %head.column,
                    pointer = %pointer,
                    "referenced node missing"
                );
                Err(Error::Corrupt(format!(
                    "index {}.{} node {} is missing",
                    head.table, head.column, pointer
                )))
            }
        }
    }

    /// Walks from the root to the leaf responsible for `key`.
    pub(crate) fn descend(
        &self,
        head: &TreeHead,
        cache: &mut TreeCache,
        key: &[u8],
    ) -> Result<(Vec<PathStep>, TreeNode)> {
        let mut path = Vec::with_capacity(head.height as usize);
        let mut node = self.load_node(head, cache, head.root)?;
        while !node.is_leaf() {
            if path.len() >= head.height as usize {
                return Err(Error::Corrupt(format!(
                    "index {}.{} is deeper than its height {}",
                    head.table, head.column, head.height
                )));
            }
            let (index, _) = nearest(&node.keys, key);
            let child = node.child(index)?;
            path.push(PathStep {
                pointer: node.pointer,
                index,
            });
            node = self.load_node(head, cache, child)?;
        }
        Ok((path, node))
    }

    /// Encodes every staged node and the head, then writes them.
    pub(crate) fn flush(&self, head: &TreeHead, cache: TreeCache) -> Result<()> {
        self.flush_with(head, cache, Overlay::new(self.store))
    }

    /// Like `flush`, also writing the overflow list records buffered in
    /// `lists` once every node is encoded.
    pub(crate) fn flush_with(
        &self,
        head: &TreeHead,
        cache: TreeCache,
        lists: Overlay<'_, S>,
    ) -> Result<()> {
        let (hits, misses) = cache.stats();
        let mut batch = Vec::with_capacity(cache.staged_len() + 1);
        for (pointer, node) in cache.into_writes() {
            batch.push((self.node_key(head, pointer), node.encode()?));
        }
        batch.push((self.head_key(&head.table, &head.column), head.encode()?));
        tracing::trace!(
            table = %head.table,
            column = %head.column,
            nodes = batch.len() - 1,
            lists = lists.staged_len(),
            hits,
            misses,
            "flushing index"
        );
        lists.commit()?;
        for (key, bytes) in batch {
            self.store.put(&key, bytes)?;
        }
        Ok(())
    }

    /// Exact-match lookup. Deleted keys are not found.
    pub fn search(&self, head: &TreeHead, key: &[u8]) -> Result<Option<(Vec<u8>, ValueTag)>> {
        if key.is_empty() {
            return Err(Error::InvalidArgument("index key is empty".to_string()));
        }
        if head.is_empty() {
            return Ok(None);
        }
        let mut cache = TreeCache::new();
        let (_, leaf) = self.descend(head, &mut cache, key)?;
        match nearest(&leaf.keys, key) {
            (index, Nearest::Equal) => {
                let (tag, payload) = decode_value(&leaf.values[index])?;
                if is_tombstone(tag, payload) {
                    Ok(None)
                } else {
                    Ok(Some((payload.to_vec(), tag)))
                }
            }
            _ => Ok(None),
        }
    }

    /// Writes a delete marker over a live key.
    pub fn delete(&self, head: &TreeHead, key: &[u8]) -> Result<TreeHead> {
        if key.is_empty() {
            return Err(Error::InvalidArgument("index key is empty".to_string()));
        }
        let not_found = || {
            Error::NotFound(format!(
                "key {} in index {}.{}",
                Raw::key(key),
                head.table,
                head.column
            ))
        };
        if head.is_empty() {
            return Err(not_found());
        }
        let mut head = head.clone();
        let mut cache = TreeCache::new();
        let (_, mut leaf) = self.descend(&head, &mut cache, key)?;
        let index = match nearest(&leaf.keys, key) {
            (index, Nearest::Equal) => index,
            _ => return Err(not_found()),
        };
        let (tag, payload) = decode_value(&leaf.values[index])?;
        if is_tombstone(tag, payload) {
            return Err(not_found());
        }
        leaf.values[index] = tombstone();
        head.key_count = head.key_count.saturating_sub(1);
        cache.stage(leaf.pointer, leaf);
        self.flush(&head, cache)?;
        Ok(head)
    }

    /// Expands a leaf value into its value set: up to `limit` values from the
    /// requested end, plus the total number of values.
    pub fn resolve_values(
        &self,
        tag: ValueTag,
        payload: &[u8],
        direction: Direction,
        limit: usize,
    ) -> Result<(Vec<Vec<u8>>, u64)> {
        match tag {
            ValueTag::Data => Ok((
                std::iter::once(payload.to_vec()).take(limit).collect(),
                1,
            )),
            ValueTag::Collection => {
                let values = decode_collection(payload)?;
                let total = values.len() as u64;
                let values = match direction {
                    Direction::Asc => values.into_iter().take(limit).collect(),
                    Direction::Desc => values.into_iter().rev().take(limit).collect(),
                };
                Ok((values, total))
            }
            ValueTag::LinkedList => {
                let list = OverflowList::new(self.store, self.config)?;
                let head = list.search_head(payload)?.ok_or_else(|| {
                    Error::Corrupt(format!(
                        "overflow list {} is missing",
                        Raw::key(payload)
                    ))
                })?;
                list.search_by_range(&head, direction, limit)
            }
            ValueTag::Pointer => Err(Error::Corrupt(
                "leaf value is a child pointer".to_string(),
            )),
        }
    }

    /// Renders the tree level by level. Diagnostic only.
    pub fn print(&self, head: &TreeHead) -> Result<String> {
        let mut out = format!(
            "{}.{} height={} nodes={} keys={} order={:?}\n",
            head.table, head.column, head.height, head.node_count, head.key_count, head.order
        );
        if head.is_empty() {
            return Ok(out);
        }
        let mut cache = TreeCache::new();
        let mut level = vec![head.root];
        let mut depth = 0;
        while !level.is_empty() {
            let mut next = Vec::new();
            let mut rendered = Vec::new();
            for pointer in level {
                let node = self.load_node(head, &mut cache, pointer)?;
                rendered.push(format!(
                    "{}[{}]",
                    node.pointer,
                    node.keys.iter().map(|k| Raw::key(k)).join(" ")
                ));
                if !node.is_leaf() {
                    for index in 0..node.len() {
                        next.push(node.child(index)?);
                    }
                }
            }
            out.push_str(&format!("L{}: {}\n", depth, rendered.join(" ")));
            level = next;
            depth += 1;
            if depth > head.height as usize {
                return Err(Error::Corrupt(format!(
                    "index {}.{} is deeper than its height",
                    head.table, head.column
                )));
            }
        }
        Ok(out)
    }
}
