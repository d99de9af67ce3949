use std::ops::Bound;

use super::node::{is_tombstone, nearest, Nearest, TreeHead, TreeNode};
use super::{IndexTree, TreeCache};
use crate::encoding::tagged::{decode_value, ValueTag};
use crate::error::Result;
use crate::filter::{Direction, RangeFilter};
use crate::pointer::Pointer;
use crate::store::KeyValueStore;
use crate::Error;

/// One live leaf entry returned by a range scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
    pub tag: ValueTag,
}

/// Iterates raw leaf entries along the leaf chain in one direction, starting
/// at a positioned cursor. Yields delete markers too; callers filter.
struct LeafWalk<'t, 'a, S: KeyValueStore> {
    tree: &'t IndexTree<'a, S>,
    head: &'t TreeHead,
    cache: TreeCache,
    current: Option<TreeNode>,
    /// Asc: index of the next entry. Desc: number of entries still ahead.
    cursor: usize,
    direction: Direction,
    visited: u32,
}

impl<'t, 'a, S: KeyValueStore> LeafWalk<'t, 'a, S> {
    /// Positions the walk on the first entry at or beyond the near bound.
    fn seek(
        tree: &'t IndexTree<'a, S>,
        head: &'t TreeHead,
        start: Option<&[u8]>,
        end: Option<&[u8]>,
        direction: Direction,
    ) -> Result<Self> {
        let mut cache = TreeCache::new();
        let (leaf, cursor) = match (direction, start, end) {
            (Direction::Asc, Some(start), _) => {
                let (_, leaf) = tree.descend(head, &mut cache, start)?;
                let cursor = match nearest(&leaf.keys, start) {
                    (i, Nearest::Equal) | (i, Nearest::LessThan) => i,
                    (i, Nearest::GreaterThan) => i + 1,
                };
                (leaf, cursor)
            }
            (Direction::Asc, None, _) => (tree.load_node(head, &mut cache, head.first_leaf)?, 0),
            (Direction::Desc, _, Some(end)) => {
                let (_, leaf) = tree.descend(head, &mut cache, end)?;
                let cursor = match nearest(&leaf.keys, end) {
                    (i, Nearest::Equal) | (i, Nearest::GreaterThan) => i + 1,
                    (i, Nearest::LessThan) => i,
                };
                (leaf, cursor)
            }
            (Direction::Desc, _, None) => {
                let leaf = tree.load_node(head, &mut cache, head.last_leaf)?;
                let cursor = leaf.len();
                (leaf, cursor)
            }
        };
        Ok(Self {
            tree,
            head,
            cache,
            current: Some(leaf),
            cursor,
            direction,
            visited: 1,
        })
    }

    fn step(&mut self, pointer: Pointer) -> Option<Result<()>> {
        if pointer.is_null() {
            self.current = None;
            return None;
        }
        self.visited += 1;
        if self.visited > self.head.node_count {
            self.current = None;
            tracing::warn!(
                table = %self.head.table,
                column = %self.head.column,
                "leaf chain does not terminate"
            );
            return Some(Err(Error::Corrupt(format!(
                "index {}.{} leaf chain forms a cycle",
                self.head.table, self.head.column
            ))));
        }
        match self.tree.load_node(self.head, &mut self.cache, pointer) {
            Ok(node) => {
                self.cursor = match self.direction {
                    Direction::Asc => 0,
                    Direction::Desc => node.len(),
                };
                self.current = Some(node);
                Some(Ok(()))
            }
            Err(e) => {
                self.current = None;
                Some(Err(e))
            }
        }
    }
}

impl<S: KeyValueStore> Iterator for LeafWalk<'_, '_, S> {
    type Item = Result<(Vec<u8>, Vec<u8>)>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let node = self.current.as_ref()?;
            let next = match self.direction {
                Direction::Asc if self.cursor < node.len() => {
                    let i = self.cursor;
                    self.cursor += 1;
                    return Some(Ok((node.keys[i].clone(), node.values[i].clone())));
                }
                Direction::Desc if self.cursor > 0 => {
                    self.cursor -= 1;
                    let i = self.cursor;
                    return Some(Ok((node.keys[i].clone(), node.values[i].clone())));
                }
                Direction::Asc => node.next,
                Direction::Desc => node.prev,
            };
            if let Err(e) = self.step(next)? {
                return Some(Err(e));
            }
        }
    }
}

fn inclusive(key: Option<&[u8]>) -> Bound<Vec<u8>> {
    match key {
        Some(key) => Bound::Included(key.to_vec()),
        None => Bound::Unbounded,
    }
}

impl<'a, S: KeyValueStore> IndexTree<'a, S> {
    /// Returns up to `limit` live entries with keys in `[start, end]`, walking
    /// from the low end for `Asc` and from the high end for `Desc`.
    pub fn search_by_range(
        &self,
        head: &TreeHead,
        start: Option<&[u8]>,
        end: Option<&[u8]>,
        direction: Direction,
        limit: usize,
    ) -> Result<Vec<IndexEntry>> {
        if let (Some(start), Some(end)) = (start, end) {
            if start > end {
                return Err(Error::InvalidArgument(
                    "range start is past range end".to_string(),
                ));
            }
        }
        if head.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let walk = LeafWalk::seek(self, head, start, end, direction)?;
        let range = (inclusive(start), inclusive(end));
        let mut entries = Vec::new();
        for item in RangeFilter::new(walk, range, direction) {
            let (key, value) = item?;
            let (tag, payload) = decode_value(&value)?;
            if is_tombstone(tag, payload) {
                continue;
            }
            entries.push(IndexEntry {
                key,
                value: payload.to_vec(),
                tag,
            });
            if entries.len() >= limit {
                break;
            }
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::store::MemoryStore;
    use crate::tree::tests::{key, roomy};
    use crate::tree::{InsertMode, OrderMode};
    use proptest::prelude::*;

    fn keys_of(entries: &[IndexEntry]) -> Vec<Vec<u8>> {
        entries.iter().map(|e| e.key.clone()).collect()
    }

    fn build<'a>(
        tree: &IndexTree<'a, MemoryStore>,
        keys: impl IntoIterator<Item = u32>,
    ) -> TreeHead {
        let mut head = tree.create_head("t", "c", OrderMode::Default).unwrap();
        for i in keys {
            head = tree.insert(&head, &key(i), &key(i), InsertMode::Default).unwrap();
        }
        head
    }

    #[test]
    fn test_full_scan_both_directions() {
        let store = MemoryStore::new();
        let config = roomy();
        let tree = IndexTree::new(&store, &config).unwrap();
        let head = build(&tree, [5, 1, 9, 3, 7, 2, 8, 6, 4, 0]);

        let asc = tree
            .search_by_range(&head, None, None, Direction::Asc, usize::MAX)
            .unwrap();
        assert_eq!(keys_of(&asc), (0..10).map(key).collect::<Vec<_>>());
        assert!(asc.iter().all(|e| e.tag == ValueTag::Data && e.value == e.key));

        let desc = tree
            .search_by_range(&head, None, None, Direction::Desc, usize::MAX)
            .unwrap();
        assert_eq!(keys_of(&desc), (0..10).rev().map(key).collect::<Vec<_>>());
    }

    #[test]
    fn test_bounds_are_inclusive() {
        let store = MemoryStore::new();
        let config = roomy();
        let tree = IndexTree::new(&store, &config).unwrap();
        let head = build(&tree, (0..30).map(|i| i * 2));

        let asc = tree
            .search_by_range(&head, Some(&key(10)), Some(&key(20)), Direction::Asc, 100)
            .unwrap();
        assert_eq!(keys_of(&asc), (5..=10).map(|i| key(i * 2)).collect::<Vec<_>>());

        // bounds that fall between stored keys
        let desc = tree
            .search_by_range(&head, Some(&key(11)), Some(&key(19)), Direction::Desc, 100)
            .unwrap();
        assert_eq!(keys_of(&desc), vec![key(18), key(16), key(14), key(12)]);

        let tail = tree
            .search_by_range(&head, Some(&key(55)), None, Direction::Asc, 100)
            .unwrap();
        assert_eq!(keys_of(&tail), vec![key(56), key(58)]);

        let none = tree
            .search_by_range(&head, Some(&key(100)), None, Direction::Asc, 100)
            .unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn test_limit_truncates_from_the_start() {
        let store = MemoryStore::new();
        let config = roomy();
        let tree = IndexTree::new(&store, &config).unwrap();
        let head = build(&tree, 0..20);

        let asc = tree
            .search_by_range(&head, Some(&key(3)), None, Direction::Asc, 4)
            .unwrap();
        assert_eq!(keys_of(&asc), vec![key(3), key(4), key(5), key(6)]);
        let desc = tree
            .search_by_range(&head, None, Some(&key(15)), Direction::Desc, 3)
            .unwrap();
        assert_eq!(keys_of(&desc), vec![key(15), key(14), key(13)]);
        assert!(tree
            .search_by_range(&head, None, None, Direction::Asc, 0)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_deleted_keys_are_skipped() {
        let store = MemoryStore::new();
        let config = roomy();
        let tree = IndexTree::new(&store, &config).unwrap();
        let mut head = build(&tree, 0..10);
        for i in [0, 4, 5, 9] {
            head = tree.delete(&head, &key(i)).unwrap();
        }
        let asc = tree
            .search_by_range(&head, None, None, Direction::Asc, 100)
            .unwrap();
        assert_eq!(
            keys_of(&asc),
            [1, 2, 3, 6, 7, 8].into_iter().map(key).collect::<Vec<_>>()
        );
        let desc = tree
            .search_by_range(&head, None, None, Direction::Desc, 2)
            .unwrap();
        assert_eq!(keys_of(&desc), vec![key(8), key(7)]);
    }

    #[test]
    fn test_invalid_and_empty_ranges() {
        let store = MemoryStore::new();
        let config = EngineConfig::default();
        let tree = IndexTree::new(&store, &config).unwrap();
        let head = tree.create_head("t", "c", OrderMode::Default).unwrap();
        assert!(tree
            .search_by_range(&head, None, None, Direction::Asc, 10)
            .unwrap()
            .is_empty());
        assert!(matches!(
            tree.search_by_range(&head, Some(b"b"), Some(b"a"), Direction::Asc, 10),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_broken_chain_is_corrupt() {
        let store = MemoryStore::new();
        let config = roomy();
        let tree = IndexTree::new(&store, &config).unwrap();
        let head = build(&tree, 0..12);

        let mut cache = TreeCache::new();
        let first = tree.load_node(&head, &mut cache, head.first_leaf).unwrap();
        store.delete(&tree.node_key(&head, first.next)).unwrap();

        let result = tree.search_by_range(&head, None, None, Direction::Asc, 100);
        assert!(matches!(result, Err(Error::Corrupt(_))));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn prop_range_matches_model(
            keys in prop::collection::btree_set(0u32..500, 0..150),
            a in 0u32..500,
            b in 0u32..500,
            limit in 1usize..200,
            desc in any::<bool>(),
        ) {
            let store = MemoryStore::new();
            let config = EngineConfig::default().max_tree_height(32);
            let tree = IndexTree::new(&store, &config).unwrap();
            let head = build(&tree, keys.iter().copied());
            let (lo, hi) = (a.min(b), a.max(b));
            let direction = if desc { Direction::Desc } else { Direction::Asc };

            let got = tree
                .search_by_range(&head, Some(&key(lo)), Some(&key(hi)), direction, limit)
                .unwrap();
            let mut want: Vec<Vec<u8>> = keys.range(lo..=hi).map(|i| key(*i)).collect();
            if desc {
                want.reverse();
            }
            want.truncate(limit);
            prop_assert_eq!(keys_of(&got), want);
        }
    }
}
