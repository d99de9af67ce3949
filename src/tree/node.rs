//! Tree records as they are stored: one head per (table, column) and one
//! record per node, each addressed by its `Pointer`.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::encoding::tagged::{decode_value, encode_value, ValueTag};
use crate::error::Result;
use crate::pointer::Pointer;
use crate::Error;

/// Key ordering hint for a tree.
///
/// `Ascending` and `Descending` trees expect mostly monotonic keys and split
/// cheaply when a key lands at the matching edge of the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OrderMode {
    #[default]
    Default,
    Ascending,
    Descending,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeHead {
    pub table: String,
    pub column: String,
    pub root: Pointer,
    pub height: u8,
    pub node_order: u32,
    pub node_count: u32,
    pub key_count: u64,
    pub first_leaf: Pointer,
    pub last_leaf: Pointer,
    pub order: OrderMode,
    /// Generation counter for overflow lists opened by this tree.
    pub list_counter: u32,
}

impl TreeHead {
    pub fn new(table: &str, column: &str, order: OrderMode) -> Self {
        Self {
            table: table.to_string(),
            column: column.to_string(),
            root: Pointer::NULL,
            height: 0,
            node_order: 0,
            node_count: 0,
            key_count: 0,
            first_leaf: Pointer::NULL,
            last_leaf: Pointer::NULL,
            order,
            list_counter: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_null()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeKind {
    Root,
    Child,
    Leaf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeNode {
    pub pointer: Pointer,
    pub kind: NodeKind,
    pub keys: Vec<Vec<u8>>,
    /// Tagged values; internal nodes hold only `Pointer` values.
    pub values: Vec<Vec<u8>>,
    pub prev: Pointer,
    pub next: Pointer,
}

impl TreeNode {
    pub fn new(pointer: Pointer, kind: NodeKind) -> Self {
        Self {
            pointer,
            kind,
            keys: Vec::new(),
            values: Vec::new(),
            prev: Pointer::NULL,
            next: Pointer::NULL,
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.kind == NodeKind::Leaf
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Resolves the child pointer stored at `index` of an internal node.
    pub fn child(&self, index: usize) -> Result<Pointer> {
        let value = self.values.get(index).ok_or_else(|| {
            Error::Corrupt(format!("node {} has no child at {}", self.pointer, index))
        })?;
        match decode_value(value)? {
            (ValueTag::Pointer, payload) => Pointer::from_bytes(payload),
            (tag, _) => Err(Error::Corrupt(format!(
                "node {} holds {:?} where a child pointer belongs",
                self.pointer, tag
            ))),
        }
    }

    pub fn insert_entry(&mut self, index: usize, key: Vec<u8>, value: Vec<u8>) {
        self.keys.insert(index, key);
        self.values.insert(index, value);
    }

    pub fn insert_child(&mut self, index: usize, key: Vec<u8>, child: Pointer) {
        self.insert_entry(index, key, pointer_value(child));
    }

    /// Checks the per-node ordering and shape invariants.
    pub fn check(&self) -> Result<()> {
        if self.keys.len() != self.values.len() {
            return Err(Error::Corrupt(format!(
                "node {} has {} keys but {} values",
                self.pointer,
                self.keys.len(),
                self.values.len()
            )));
        }
        if self.keys.windows(2).any(|w| w[0] >= w[1]) {
            return Err(Error::Corrupt(format!(
                "node {} keys out of order",
                self.pointer
            )));
        }
        Ok(())
    }
}

pub fn pointer_value(pointer: Pointer) -> Vec<u8> {
    encode_value(ValueTag::Pointer, &pointer.to_bytes())
}

/// The logical delete marker: a `Data` value with an empty payload.
pub fn tombstone() -> Vec<u8> {
    encode_value(ValueTag::Data, &[])
}

pub fn is_tombstone(tag: ValueTag, payload: &[u8]) -> bool {
    tag == ValueTag::Data && payload.is_empty()
}

/// Where a key falls relative to the entry at the returned index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Nearest {
    /// The key is at the index.
    Equal,
    /// The key sorts before the index (only ever index 0).
    LessThan,
    /// The key sorts after the index and before the next entry, if any.
    GreaterThan,
}

/// Finds the entry nearest to `key` in an ordered key list.
///
/// The first and last keys are checked before falling back to binary search,
/// since appends and prepends dominate for ordered indexes. An empty list
/// yields `(0, LessThan)`.
pub fn nearest(keys: &[Vec<u8>], key: &[u8]) -> (usize, Nearest) {
    let Some(first) = keys.first() else {
        return (0, Nearest::LessThan);
    };
    match key.cmp(first.as_slice()) {
        Ordering::Less => return (0, Nearest::LessThan),
        Ordering::Equal => return (0, Nearest::Equal),
        Ordering::Greater => {}
    }
    let last = keys.len() - 1;
    match key.cmp(keys[last].as_slice()) {
        Ordering::Greater => return (last, Nearest::GreaterThan),
        Ordering::Equal => return (last, Nearest::Equal),
        Ordering::Less => {}
    }
    match keys.binary_search_by(|candidate| candidate.as_slice().cmp(key)) {
        Ok(index) => (index, Nearest::Equal),
        // index >= 1 here: the key is greater than the first key
        Err(index) => (index - 1, Nearest::GreaterThan),
    }
}

/// Position at which `key` would be inserted into a leaf.
pub fn insert_position(index: usize, nearest: Nearest) -> usize {
    match nearest {
        Nearest::Equal | Nearest::LessThan => index,
        Nearest::GreaterThan => index + 1,
    }
}
