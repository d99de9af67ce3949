use super::mode::{format_value, Formatted, InsertMode};
use super::node::{
    insert_position, is_tombstone, nearest, Nearest, NodeKind, OrderMode, TreeHead, TreeNode,
};
use super::{IndexTree, PathStep, TreeCache};
use crate::encoding::format::{Composite, Formatter};
use crate::encoding::tagged::{decode_value, encode_value, ValueTag};
use crate::error::Result;
use crate::list::{check_value, OverflowList};
use crate::pointer::Pointer;
use crate::store::{KeyValueStore, Overlay};
use crate::Error;

/// Outcome of splitting one node in two. Exactly one of the halves is newly
/// allocated; `new_left` says which.
struct Split {
    left: TreeNode,
    right: TreeNode,
    new_left: bool,
}

impl<'a, S: KeyValueStore> IndexTree<'a, S> {
    /// Inserts `value` under `key` according to `mode` and returns the
    /// updated head. Nothing is written if the call fails.
    pub fn insert(
        &self,
        head: &TreeHead,
        key: &[u8],
        value: &[u8],
        mode: InsertMode,
    ) -> Result<TreeHead> {
        if key.is_empty() {
            return Err(Error::InvalidArgument("index key is empty".to_string()));
        }
        if value.is_empty() {
            return Err(Error::InvalidArgument("index value is empty".to_string()));
        }

        if mode == InsertMode::Append {
            // values of an appendable key may end up in an overflow list
            check_value(self.config, value)?;
        }

        let mut head = head.clone();
        let mut cache = TreeCache::new();
        let lists = Overlay::new(self.store);

        if head.is_empty() {
            let pointer = self.allocate(&mut head)?;
            head.root = pointer;
            head.first_leaf = pointer;
            head.last_leaf = pointer;
            head.height = 1;
            cache.stage(pointer, TreeNode::new(pointer, NodeKind::Leaf));
            tracing::debug!(table = %head.table, column = %head.column, "created leaf root");
        }

        let (path, mut leaf) = self.descend(&head, &mut cache, key)?;
        let (index, near) = nearest(&leaf.keys, key);
        let found = near == Nearest::Equal;

        let existing = if found {
            let (tag, payload) = decode_value(&leaf.values[index])?;
            (!is_tombstone(tag, payload)).then_some((tag, payload))
        } else {
            None
        };
        let live = existing.is_some();
        let formatted = format_value(
            mode,
            key,
            existing,
            value,
            self.config.collection_threshold,
        )?;

        let stored = match formatted {
            Formatted::Store { tag, payload } => encode_value(tag, &payload),
            Formatted::ListAppend { list_key } => {
                let list = OverflowList::new(&lists, self.config)?;
                let list_head = list.search_head(&list_key)?.ok_or_else(|| {
                    tracing::warn!(list = %Composite::key(&list_key), "overflow list head missing");
                    Error::Corrupt(format!(
                        "overflow list {} is missing",
                        Composite::key(&list_key)
                    ))
                })?;
                list.insert(&list_head, &[value.to_vec()])?;
                lists.commit()?;
                return Ok(head);
            }
            Formatted::Promote { values } => {
                head.list_counter = head.list_counter.checked_add(1).ok_or_else(|| {
                    Error::CapacityExceeded(format!(
                        "index {}.{} ran out of list keys",
                        head.table, head.column
                    ))
                })?;
                let list_key = self.list_key(&head, key);
                let list = OverflowList::new(&lists, self.config)?;
                let list_head = list.create_head(&list_key)?;
                list.insert(&list_head, &values)?;
                tracing::debug!(
                    list = %Composite::key(&list_key),
                    values = values.len(),
                    "promoted collection to overflow list"
                );
                encode_value(ValueTag::LinkedList, &list_key)
            }
        };

        if found {
            leaf.values[index] = stored;
            if !live {
                head.key_count += 1;
            }
            cache.stage(leaf.pointer, leaf);
        } else {
            let position = insert_position(index, near);
            leaf.insert_entry(position, key.to_vec(), stored);
            head.key_count += 1;
            if position == 0 {
                self.lower_minimum(&head, &mut cache, &path, key)?;
            }
            self.rebalance(&mut head, &mut cache, path, leaf, position)?;
        }

        self.flush_with(&head, cache, lists)?;
        Ok(head)
    }

    /// Hands out the next node pointer of this tree.
    fn allocate(&self, head: &mut TreeHead) -> Result<Pointer> {
        let pointer = Pointer::new(head.node_order).next()?;
        head.node_order = pointer.get();
        head.node_count += 1;
        Ok(pointer)
    }

    /// Keeps every internal key equal to the smallest key below it after
    /// `key` became the new first key of its leaf.
    fn lower_minimum(
        &self,
        head: &TreeHead,
        cache: &mut TreeCache,
        path: &[PathStep],
        key: &[u8],
    ) -> Result<()> {
        for step in path.iter().rev() {
            let mut parent = self.load_node(head, cache, step.pointer)?;
            if key >= parent.keys[step.index].as_slice() {
                break;
            }
            parent.keys[step.index] = key.to_vec();
            cache.stage(parent.pointer, parent);
            if step.index != 0 {
                break;
            }
        }
        Ok(())
    }

    /// Splits `node` while it holds too many keys, carrying each split up
    /// the path and growing a new root when the old one splits.
    fn rebalance(
        &self,
        head: &mut TreeHead,
        cache: &mut TreeCache,
        mut path: Vec<PathStep>,
        node: TreeNode,
        position: usize,
    ) -> Result<()> {
        let mut node = node;
        let mut position = Some(position);
        while node.len() > self.config.max_node_keys {
            let Split {
                left,
                right,
                new_left,
            } = self.split(head, cache, node, position.take())?;
            let (left_key, left_ptr) = (left.keys[0].clone(), left.pointer);
            let (right_key, right_ptr) = (right.keys[0].clone(), right.pointer);
            cache.stage(left_ptr, left);
            cache.stage(right_ptr, right);

            match path.pop() {
                Some(step) => {
                    let mut parent = self.load_node(head, cache, step.pointer)?;
                    if new_left {
                        parent.insert_child(step.index, left_key.clone(), left_ptr);
                    } else {
                        parent.insert_child(step.index + 1, right_key.clone(), right_ptr);
                    }
                    parent.keys[step.index] = left_key;
                    parent.keys[step.index + 1] = right_key;
                    node = parent;
                }
                None => {
                    if head.height >= self.config.max_tree_height {
                        tracing::warn!(
                            table = %head.table,
                            column = %head.column,
                            height = head.height,
                            "index is full"
                        );
                        return Err(Error::CapacityExceeded(format!(
                            "index {}.{} is full at height {}",
                            head.table, head.column, head.height
                        )));
                    }
                    let pointer = self.allocate(head)?;
                    let mut root = TreeNode::new(pointer, NodeKind::Root);
                    root.insert_child(0, left_key, left_ptr);
                    root.insert_child(1, right_key, right_ptr);
                    head.root = pointer;
                    head.height += 1;
                    tracing::debug!(
                        table = %head.table,
                        column = %head.column,
                        root = %pointer,
                        height = head.height,
                        "grew new root"
                    );
                    cache.stage(pointer, root);
                    return Ok(());
                }
            }
        }
        cache.stage(node.pointer, node);
        Ok(())
    }

    /// Splits one overfull node. `position` is where the new key landed
    /// when `node` is the leaf that took the insert.
    ///
    /// Ordered trees split off a single-key leaf when the key extends the
    /// tree at its growing edge; every other split cuts at `ceil(n/2)`.
    fn split(
        &self,
        head: &mut TreeHead,
        cache: &mut TreeCache,
        mut node: TreeNode,
        position: Option<usize>,
    ) -> Result<Split> {
        let n = node.len();
        let sibling_ptr = self.allocate(head)?;
        if node.kind == NodeKind::Root {
            node.kind = NodeKind::Child;
        }
        let mut sibling = TreeNode::new(sibling_ptr, node.kind);

        let edge_left = node.is_leaf()
            && head.order == OrderMode::Descending
            && node.pointer == head.first_leaf
            && position == Some(0);
        let edge_right = node.is_leaf()
            && head.order == OrderMode::Ascending
            && node.pointer == head.last_leaf
            && position == Some(n - 1);

        if edge_left {
            sibling.keys = node.keys.drain(..1).collect();
            sibling.values = node.values.drain(..1).collect();
            sibling.next = node.pointer;
            sibling.prev = node.prev;
            if node.prev.is_null() {
                head.first_leaf = sibling_ptr;
            } else {
                let mut prev = self.load_node(head, cache, node.prev)?;
                prev.next = sibling_ptr;
                cache.stage(prev.pointer, prev);
            }
            node.prev = sibling_ptr;
            tracing::debug!(
                table = %head.table,
                column = %head.column,
                node = %node.pointer,
                sibling = %sibling_ptr,
                "split leaf at left edge"
            );
            return Ok(Split {
                left: sibling,
                right: node,
                new_left: true,
            });
        }

        let mid = if edge_right { n - 1 } else { (n + 1) / 2 };
        sibling.keys = node.keys.split_off(mid);
        sibling.values = node.values.split_off(mid);
        if node.is_leaf() {
            sibling.prev = node.pointer;
            sibling.next = node.next;
            if node.next.is_null() {
                head.last_leaf = sibling_ptr;
            } else {
                let mut next = self.load_node(head, cache, node.next)?;
                next.prev = sibling_ptr;
                cache.stage(next.pointer, next);
            }
            node.next = sibling_ptr;
        }
        tracing::debug!(
            table = %head.table,
            column = %head.column,
            node = %node.pointer,
            sibling = %sibling_ptr,
            kind = ?node.kind,
            "split node"
        );
        Ok(Split {
            left: node,
            right: sibling,
            new_left: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::filter::Direction;
    use crate::store::MemoryStore;
    use crate::tree::tests::{key, roomy};
    use proptest::prelude::*;
    use std::collections::BTreeMap;

    /// Walks every node and checks the structural invariants: ordered keys,
    /// internal keys equal to the first key of their child, one height for
    /// every leaf, and a leaf chain that visits all keys in order.
    fn check_tree<S: KeyValueStore>(tree: &IndexTree<'_, S>, head: &TreeHead) -> Vec<Vec<u8>> {
        let mut cache = TreeCache::new();
        let mut leaves = Vec::new();
        let mut stack = vec![(head.root, 1u8)];
        let mut nodes = 0;
        while let Some((pointer, depth)) = stack.pop() {
            nodes += 1;
            let node = tree.load_node(head, &mut cache, pointer).unwrap();
            node.check().unwrap();
            assert!(node.len() <= tree.config.max_node_keys);
            if node.is_leaf() {
                assert_eq!(depth, head.height);
                leaves.push(pointer);
                continue;
            }
            for index in (0..node.len()).rev() {
                let child = tree.load_node(head, &mut cache, node.child(index).unwrap()).unwrap();
                assert_eq!(node.keys[index], child.keys[0]);
                stack.push((child.pointer, depth + 1));
            }
        }
        assert_eq!(nodes, head.node_count);

        let mut chained = Vec::new();
        let mut keys = Vec::new();
        let mut pointer = head.first_leaf;
        let mut prev = Pointer::NULL;
        while !pointer.is_null() {
            let leaf = tree.load_node(head, &mut cache, pointer).unwrap();
            assert_eq!(leaf.prev, prev);
            chained.push(pointer);
            keys.extend(leaf.keys.iter().cloned());
            prev = pointer;
            pointer = leaf.next;
        }
        assert_eq!(prev, head.last_leaf);
        assert_eq!(chained, leaves);
        assert!(keys.windows(2).all(|w| w[0] < w[1]));
        keys
    }

    #[test]
    fn test_insert_into_empty_tree() {
        let store = MemoryStore::new();
        let config = EngineConfig::default();
        let tree = IndexTree::new(&store, &config).unwrap();
        let head = tree.create_head("t", "c", OrderMode::Default).unwrap();

        let head = tree.insert(&head, b"k", b"v", InsertMode::Default).unwrap();
        assert_eq!(head.height, 1);
        assert_eq!(head.node_count, 1);
        assert_eq!(head.key_count, 1);
        assert_eq!(head.root, head.first_leaf);
        assert_eq!(head.root, head.last_leaf);
        assert_eq!(tree.search_head("t", "c").unwrap(), Some(head.clone()));
        assert_eq!(
            tree.search(&head, b"k").unwrap(),
            Some((b"v".to_vec(), ValueTag::Data))
        );
    }

    #[test]
    fn test_rejects_empty_input() {
        let store = MemoryStore::new();
        let config = EngineConfig::default();
        let tree = IndexTree::new(&store, &config).unwrap();
        let head = tree.create_head("t", "c", OrderMode::Default).unwrap();
        let writes = store.write_count();
        assert!(matches!(
            tree.insert(&head, b"", b"v", InsertMode::Default),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            tree.insert(&head, b"k", b"", InsertMode::Default),
            Err(Error::InvalidArgument(_))
        ));
        assert_eq!(store.write_count(), writes);
    }

    #[test]
    fn test_first_split_creates_root() {
        let store = MemoryStore::new();
        let config = EngineConfig::default();
        let tree = IndexTree::new(&store, &config).unwrap();
        let mut head = tree.create_head("t", "c", OrderMode::Default).unwrap();
        for i in 0..4 {
            head = tree.insert(&head, &key(i), b"v", InsertMode::Default).unwrap();
        }
        assert_eq!(head.height, 2);
        assert_eq!(head.node_count, 3);
        assert_ne!(head.first_leaf, head.last_leaf);

        let mut cache = TreeCache::new();
        let root = tree.load_node(&head, &mut cache, head.root).unwrap();
        assert_eq!(root.kind, NodeKind::Root);
        assert_eq!(root.keys, vec![key(0), key(2)]);
        let left = tree.load_node(&head, &mut cache, head.first_leaf).unwrap();
        assert_eq!(left.keys, vec![key(0), key(1)]);
        check_tree(&tree, &head);
    }

    #[test]
    fn test_default_policy_fills_up() {
        let store = MemoryStore::new();
        let config = EngineConfig::default();
        let tree = IndexTree::new(&store, &config).unwrap();
        let mut head = tree.create_head("t", "c", OrderMode::Default).unwrap();

        let mut full = None;
        for i in 0..1000 {
            match tree.insert(&head, &key(i), b"v", InsertMode::Default) {
                Ok(next) => head = next,
                Err(e) => {
                    full = Some((i, e));
                    break;
                }
            }
        }
        let (at, err) = full.expect("tree never filled");
        assert!(matches!(err, Error::CapacityExceeded(_)));
        assert_eq!(head.height, config.max_tree_height);
        assert_eq!(head.key_count, at as u64);

        // the failed insert left the stored tree untouched
        assert_eq!(tree.search_head("t", "c").unwrap(), Some(head.clone()));
        assert_eq!(check_tree(&tree, &head).len(), at as usize);
        assert_eq!(tree.search(&head, &key(at)).unwrap(), None);
    }

    #[test]
    fn test_ascending_edge_split_keeps_left_full() {
        let store = MemoryStore::new();
        let config = roomy();
        let tree = IndexTree::new(&store, &config).unwrap();
        let mut head = tree.create_head("t", "pk", OrderMode::Ascending).unwrap();
        for i in 0..4 {
            head = tree.insert(&head, &key(i), b"v", InsertMode::Default).unwrap();
        }
        let mut cache = TreeCache::new();
        let left = tree.load_node(&head, &mut cache, head.first_leaf).unwrap();
        let right = tree.load_node(&head, &mut cache, head.last_leaf).unwrap();
        assert_eq!(left.keys, vec![key(0), key(1), key(2)]);
        assert_eq!(right.keys, vec![key(3)]);

        for i in 4..40 {
            head = tree.insert(&head, &key(i), b"v", InsertMode::Default).unwrap();
        }
        assert_eq!(check_tree(&tree, &head).len(), 40);
    }

    #[test]
    fn test_descending_edge_split_keeps_right_full() {
        let store = MemoryStore::new();
        let config = roomy();
        let tree = IndexTree::new(&store, &config).unwrap();
        let mut head = tree.create_head("t", "ts", OrderMode::Descending).unwrap();
        for i in (36..40).rev() {
            head = tree.insert(&head, &key(i), b"v", InsertMode::Default).unwrap();
        }
        let mut cache = TreeCache::new();
        let left = tree.load_node(&head, &mut cache, head.first_leaf).unwrap();
        let right = tree.load_node(&head, &mut cache, head.last_leaf).unwrap();
        assert_eq!(left.keys, vec![key(36)]);
        assert_eq!(right.keys, vec![key(37), key(38), key(39)]);

        for i in (0..36).rev() {
            head = tree.insert(&head, &key(i), b"v", InsertMode::Default).unwrap();
        }
        let keys = check_tree(&tree, &head);
        assert_eq!(keys, (0..40).map(key).collect::<Vec<_>>());
    }

    #[test]
    fn test_ordered_tree_accepts_out_of_order_keys() {
        let store = MemoryStore::new();
        let config = roomy();
        let tree = IndexTree::new(&store, &config).unwrap();
        let mut head = tree.create_head("t", "pk", OrderMode::Ascending).unwrap();
        for i in [10, 3, 50, 7, 1, 30, 2, 45, 20, 8] {
            head = tree.insert(&head, &key(i), b"v", InsertMode::Default).unwrap();
        }
        assert_eq!(check_tree(&tree, &head).len(), 10);
        assert!(tree.search(&head, &key(7)).unwrap().is_some());
    }

    #[test]
    fn test_replace_and_change() {
        let store = MemoryStore::new();
        let config = EngineConfig::default();
        let tree = IndexTree::new(&store, &config).unwrap();
        let head = tree.create_head("t", "c", OrderMode::Default).unwrap();

        let head = tree.insert(&head, b"k", b"v1", InsertMode::Change).unwrap();
        let head = tree.insert(&head, b"k", b"v2", InsertMode::Replace).unwrap();
        assert_eq!(
            tree.search(&head, b"k").unwrap(),
            Some((b"v2".to_vec(), ValueTag::Data))
        );
        let head = tree.insert(&head, b"k", b"v3", InsertMode::Change).unwrap();
        assert_eq!(
            tree.search(&head, b"k").unwrap(),
            Some((b"v3".to_vec(), ValueTag::Data))
        );
        assert_eq!(head.key_count, 1);
    }

    #[test]
    fn test_append_promotion() {
        let store = MemoryStore::new();
        let config = EngineConfig::default();
        let tree = IndexTree::new(&store, &config).unwrap();
        let mut head = tree.create_head("t", "fk", OrderMode::Default).unwrap();
        let values: Vec<Vec<u8>> = (0..60).map(|i| format!("row{:03}", i).into_bytes()).collect();

        for value in &values[..49] {
            head = tree.insert(&head, b"k", value, InsertMode::Append).unwrap();
        }
        let (_, tag) = tree.search(&head, b"k").unwrap().unwrap();
        assert_eq!(tag, ValueTag::Collection);

        head = tree.insert(&head, b"k", &values[49], InsertMode::Append).unwrap();
        let (payload, tag) = tree.search(&head, b"k").unwrap().unwrap();
        assert_eq!(tag, ValueTag::LinkedList);
        assert_eq!(head.list_counter, 1);

        let (asc, total) = tree
            .resolve_values(tag, &payload, Direction::Asc, usize::MAX)
            .unwrap();
        assert_eq!(total, 50);
        assert_eq!(asc, values[..50].to_vec());
        let (desc, _) = tree
            .resolve_values(tag, &payload, Direction::Desc, usize::MAX)
            .unwrap();
        assert_eq!(desc, values[..50].iter().rev().cloned().collect::<Vec<_>>());

        // later appends bypass the leaf
        for value in &values[50..] {
            head = tree.insert(&head, b"k", value, InsertMode::Append).unwrap();
        }
        let (same, _) = tree.search(&head, b"k").unwrap().unwrap();
        assert_eq!(same, payload);
        let (all, total) = tree
            .resolve_values(tag, &payload, Direction::Asc, usize::MAX)
            .unwrap();
        assert_eq!(total, 60);
        assert_eq!(all, values);
        assert_eq!(head.key_count, 1);
    }

    #[test]
    fn test_reinsert_after_delete_of_collection() {
        let store = MemoryStore::new();
        let config = EngineConfig::default();
        let tree = IndexTree::new(&store, &config).unwrap();
        let mut head = tree.create_head("t", "c", OrderMode::Default).unwrap();
        for value in [b"a", b"b", b"c"] {
            head = tree.insert(&head, b"k", value, InsertMode::Append).unwrap();
        }
        head = tree.delete(&head, b"k").unwrap();
        assert_eq!(tree.search(&head, b"k").unwrap(), None);

        head = tree.insert(&head, b"k", b"fresh", InsertMode::Default).unwrap();
        assert_eq!(
            tree.search(&head, b"k").unwrap(),
            Some((b"fresh".to_vec(), ValueTag::Data))
        );
        assert!(matches!(
            tree.insert(&head, b"k", b"again", InsertMode::Default),
            Err(Error::UniqueViolation(_))
        ));
    }

    #[test]
    fn test_reinsert_after_delete_of_list() {
        let store = MemoryStore::new();
        let config = EngineConfig::default().collection_threshold(3);
        let tree = IndexTree::new(&store, &config).unwrap();
        let mut head = tree.create_head("t", "c", OrderMode::Default).unwrap();
        for value in [b"a", b"b", b"c", b"d"] {
            head = tree.insert(&head, b"k", value, InsertMode::Append).unwrap();
        }
        let (old_list, tag) = tree.search(&head, b"k").unwrap().unwrap();
        assert_eq!(tag, ValueTag::LinkedList);

        head = tree.delete(&head, b"k").unwrap();
        assert_eq!(tree.search(&head, b"k").unwrap(), None);
        head = tree.insert(&head, b"k", b"x", InsertMode::Default).unwrap();
        assert!(matches!(
            tree.insert(&head, b"k", b"y", InsertMode::Default),
            Err(Error::UniqueViolation(_))
        ));

        // promoting again opens a fresh list; the old one is left behind
        for value in [b"y", b"z"] {
            head = tree.insert(&head, b"k", value, InsertMode::Append).unwrap();
        }
        let (new_list, tag) = tree.search(&head, b"k").unwrap().unwrap();
        assert_eq!(tag, ValueTag::LinkedList);
        assert_ne!(new_list, old_list);
        let (values, total) = tree
            .resolve_values(tag, &new_list, Direction::Asc, usize::MAX)
            .unwrap();
        assert_eq!(values, vec![b"x".to_vec(), b"y".to_vec(), b"z".to_vec()]);
        assert_eq!(total, 3);
    }

    #[test]
    fn test_append_rejects_value_too_large_for_a_list_node() {
        let store = MemoryStore::new();
        let config = EngineConfig::default();
        let tree = IndexTree::new(&store, &config).unwrap();
        let mut head = tree.create_head("t", "c", OrderMode::Default).unwrap();
        let values: Vec<Vec<u8>> = (0..50).map(|i| format!("v{:02}", i).into_bytes()).collect();
        for value in &values[..49] {
            head = tree.insert(&head, b"k", value, InsertMode::Append).unwrap();
        }

        let writes = store.write_count();
        let result = tree.insert(&head, b"k", &vec![7u8; 5000], InsertMode::Append);
        assert!(matches!(result, Err(Error::InvalidArgument(_))));
        assert_eq!(store.write_count(), writes);

        // the key still promotes on the next append that fits
        head = tree.insert(&head, b"k", &values[49], InsertMode::Append).unwrap();
        let (payload, tag) = tree.search(&head, b"k").unwrap().unwrap();
        assert_eq!(tag, ValueTag::LinkedList);
        let (all, total) = tree
            .resolve_values(tag, &payload, Direction::Asc, usize::MAX)
            .unwrap();
        assert_eq!(total, 50);
        assert_eq!(all, values);
    }

    #[test]
    fn test_failed_promotion_writes_nothing() {
        let store = MemoryStore::new();
        let config = EngineConfig::default().collection_threshold(2);
        let tree = IndexTree::new(&store, &config).unwrap();
        let head = tree.create_head("t", "c", OrderMode::Default).unwrap();
        let big = vec![1u8; 5000];
        let head = tree.insert(&head, b"k", &big, InsertMode::Default).unwrap();

        let writes = store.write_count();
        let result = tree.insert(&head, b"k", b"small", InsertMode::Append);
        assert!(matches!(result, Err(Error::InvalidArgument(_))));
        assert_eq!(store.write_count(), writes);

        let list = OverflowList::new(&store, &config).unwrap();
        let mut staged = head.clone();
        staged.list_counter += 1;
        assert_eq!(list.search_head(&tree.list_key(&staged, b"k")).unwrap(), None);
        assert_eq!(
            tree.search(&head, b"k").unwrap(),
            Some((big, ValueTag::Data))
        );
    }

    #[test]
    fn test_new_minimum_propagates_up() {
        let store = MemoryStore::new();
        let config = roomy();
        let tree = IndexTree::new(&store, &config).unwrap();
        let mut head = tree.create_head("t", "c", OrderMode::Default).unwrap();
        for i in (10..40).rev() {
            head = tree.insert(&head, &key(i), b"v", InsertMode::Default).unwrap();
        }
        head = tree.insert(&head, &key(0), b"v", InsertMode::Default).unwrap();
        let mut cache = TreeCache::new();
        let root = tree.load_node(&head, &mut cache, head.root).unwrap();
        assert_eq!(root.keys[0], key(0));
        check_tree(&tree, &head);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn prop_round_trip(keys in prop::collection::btree_set(
            prop::collection::vec(any::<u8>(), 1..12), 1..120)
        ) {
            let store = MemoryStore::new();
            let config = EngineConfig::default().max_tree_height(32);
            let tree = IndexTree::new(&store, &config).unwrap();
            let mut head = tree.create_head("t", "c", OrderMode::Default).unwrap();

            // insert in a scrambled but deterministic order
            let mut order: Vec<&Vec<u8>> = keys.iter().collect();
            order.sort_by_key(|k| crate::hasher::checksum(k));
            for k in &order {
                let value = [b"v".as_slice(), k.as_slice()].concat();
                head = tree.insert(&head, k, &value, InsertMode::Default).unwrap();
            }

            prop_assert_eq!(head.key_count, keys.len() as u64);
            for k in &keys {
                let value = [b"v".as_slice(), k.as_slice()].concat();
                prop_assert_eq!(tree.search(&head, k).unwrap(), Some((value, ValueTag::Data)));
            }
            let scanned = check_tree(&tree, &head);
            prop_assert_eq!(scanned, keys.iter().cloned().collect::<Vec<_>>());
        }

        #[test]
        fn prop_default_is_unique(keys in prop::collection::vec(0u32..40, 1..80)) {
            let store = MemoryStore::new();
            let config = EngineConfig::default().max_tree_height(32);
            let tree = IndexTree::new(&store, &config).unwrap();
            let mut head = tree.create_head("t", "c", OrderMode::Default).unwrap();
            let mut model = BTreeMap::new();

            for (n, i) in keys.iter().enumerate() {
                let value = format!("v{}", n).into_bytes();
                match tree.insert(&head, &key(*i), &value, InsertMode::Default) {
                    Ok(next) => {
                        prop_assert!(!model.contains_key(i));
                        model.insert(*i, value);
                        head = next;
                    }
                    Err(Error::UniqueViolation(_)) => prop_assert!(model.contains_key(i)),
                    Err(e) => return Err(TestCaseError::fail(e.to_string())),
                }
            }
            for (i, value) in &model {
                prop_assert_eq!(
                    tree.search(&head, &key(*i)).unwrap(),
                    Some((value.clone(), ValueTag::Data))
                );
            }
        }

        #[test]
        fn prop_delete_then_reinsert(
            keys in prop::collection::btree_set(0u32..200, 1..60),
            drop_every in 2usize..5,
        ) {
            let store = MemoryStore::new();
            let config = EngineConfig::default().max_tree_height(32);
            let tree = IndexTree::new(&store, &config).unwrap();
            let mut head = tree.create_head("t", "c", OrderMode::Ascending).unwrap();
            for i in &keys {
                head = tree.insert(&head, &key(*i), b"old", InsertMode::Default).unwrap();
            }
            let dropped: Vec<u32> = keys.iter().copied().step_by(drop_every).collect();
            for i in &dropped {
                head = tree.delete(&head, &key(*i)).unwrap();
            }
            prop_assert_eq!(head.key_count, (keys.len() - dropped.len()) as u64);
            for i in &dropped {
                prop_assert_eq!(tree.search(&head, &key(*i)).unwrap(), None);
                head = tree.insert(&head, &key(*i), b"new", InsertMode::Default).unwrap();
            }
            prop_assert_eq!(head.key_count, keys.len() as u64);
            for i in &keys {
                let want: &[u8] = if dropped.contains(i) { b"new" } else { b"old" };
                prop_assert_eq!(
                    tree.search(&head, &key(*i)).unwrap(),
                    Some((want.to_vec(), ValueTag::Data))
                );
            }
        }
    }
}
