//! Row-level entry points.
//!
//! `IndexService` exposes secondary indexes addressed by (table, column)
//! names, creating trees on first write. `BlockService` stores and reads rows
//! and keeps each table's tally in the store between calls.

use crate::block::{BlockStore, RowFragment, RowId, RowVersion, TableMeta, TableTally};
use crate::config::EngineConfig;
use crate::encoding::Value;
use crate::error::Result;
use crate::filter::Direction;
use crate::store::KeyValueStore;
use crate::tree::{IndexEntry, IndexTree, InsertMode, OrderMode, TreeHead};
use crate::Error;

const TALLY: &str = "tally";

pub struct IndexService<'a, S: KeyValueStore> {
    tree: IndexTree<'a, S>,
}

impl<'a, S: KeyValueStore> IndexService<'a, S> {
    pub fn new(store: &'a S, config: &'a EngineConfig) -> Result<Self> {
        Ok(Self {
            tree: IndexTree::new(store, config)?,
        })
    }

    pub fn create_index(&self, table: &str, column: &str, order: OrderMode) -> Result<TreeHead> {
        self.tree.create_head(table, column, order)
    }

    /// Inserts into the (table, column) index, creating a `Default`-ordered
    /// index if none exists yet.
    pub fn put(
        &self,
        table: &str,
        column: &str,
        key: &[u8],
        value: &[u8],
        mode: InsertMode,
    ) -> Result<TreeHead> {
        let head = match self.tree.search_head(table, column)? {
            Some(head) => head,
            None => self.tree.create_head(table, column, OrderMode::Default)?,
        };
        self.tree.insert(&head, key, value, mode)
    }

    /// All values stored under `key` (up to `limit`, from the requested end)
    /// with their total count.
    pub fn get(
        &self,
        table: &str,
        column: &str,
        key: &[u8],
        direction: Direction,
        limit: usize,
    ) -> Result<Option<(Vec<Vec<u8>>, u64)>> {
        let Some(head) = self.tree.search_head(table, column)? else {
            return Ok(None);
        };
        match self.tree.search(&head, key)? {
            Some((payload, tag)) => Ok(Some(
                self.tree.resolve_values(tag, &payload, direction, limit)?,
            )),
            None => Ok(None),
        }
    }

    pub fn range(
        &self,
        table: &str,
        column: &str,
        start: Option<&[u8]>,
        end: Option<&[u8]>,
        direction: Direction,
        limit: usize,
    ) -> Result<Vec<IndexEntry>> {
        match self.tree.search_head(table, column)? {
            Some(head) => self.tree.search_by_range(&head, start, end, direction, limit),
            None => Ok(Vec::new()),
        }
    }

    pub fn delete(&self, table: &str, column: &str, key: &[u8]) -> Result<TreeHead> {
        let head = self
            .tree
            .search_head(table, column)?
            .ok_or_else(|| Error::NotFound(format!("index {}.{}", table, column)))?;
        self.tree.delete(&head, key)
    }

    /// Renders the (table, column) index for debugging.
    pub fn print(&self, table: &str, column: &str) -> Result<String> {
        let head = self
            .tree
            .search_head(table, column)?
            .ok_or_else(|| Error::NotFound(format!("index {}.{}", table, column)))?;
        self.tree.print(&head)
    }
}

pub struct BlockService<'a, S: KeyValueStore> {
    store: &'a S,
    blocks: BlockStore<'a, S>,
}

impl<'a, S: KeyValueStore> BlockService<'a, S> {
    pub fn new(store: &'a S, config: &'a EngineConfig) -> Result<Self> {
        Ok(Self {
            store,
            blocks: BlockStore::new(store, config)?,
        })
    }

    fn tally_key(&self, table: &str) -> Vec<u8> {
        self.store.create_composite_key(TALLY, &[table.as_bytes()])
    }

    /// The table's counters; zero for a table that was never written.
    pub fn tally(&self, table: &str) -> Result<TableTally> {
        match self.store.get(&self.tally_key(table))? {
            Some(bytes) => TableTally::decode(&bytes),
            None => Ok(TableTally::default()),
        }
    }

    /// Stores a batch of rows and persists the advanced tally.
    pub fn put_rows(&self, meta: &TableMeta, rows: &[RowFragment]) -> Result<TableTally> {
        let tally = self.tally(&meta.name)?;
        let tally = self.blocks.set_block_data(meta, &tally, rows)?;
        self.store.put(&self.tally_key(&meta.name), tally.encode()?)?;
        Ok(tally)
    }

    pub fn get_row(&self, table: &str, id: RowId) -> Result<Option<RowFragment>> {
        self.blocks.query_row_data(table, id)
    }

    pub fn get_rows(
        &self,
        table: &str,
        start: Option<RowId>,
        end: Option<RowId>,
        direction: Direction,
        limit: usize,
    ) -> Result<Vec<RowFragment>> {
        self.blocks
            .query_row_data_by_range(table, start, end, direction, limit)
    }

    pub fn get_row_history(
        &self,
        table: &str,
        id: RowId,
        direction: Direction,
        limit: usize,
    ) -> Result<Vec<RowVersion>> {
        self.blocks
            .query_row_data_history_by_range(table, id, direction, limit)
    }

    pub fn get_row_ids_by_foreign_key(
        &self,
        table: &str,
        fk: &str,
        value: &[u8],
        direction: Direction,
        limit: usize,
    ) -> Result<(Vec<RowId>, u64)> {
        self.blocks
            .query_row_id_by_foreign_key(table, fk, value, direction, limit)
    }
}
