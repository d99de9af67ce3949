//! Row block store.
//!
//! Rows are packed into fixed-capacity blocks numbered per table. A row that
//! does not fit the space left in a block continues in the next block, either
//! between two columns (`JoinRow`) or inside one column (`JoinColumn`).
//! Blocks are write-once; every batch allocates fresh blocks and a row update
//! simply points the primary index at the newer block.
//!
//! Three indexes per table are maintained through `IndexTree`:
//!
//! - the primary index maps a row id to the block holding its first fragment;
//! - the history index appends every block a row was ever written to;
//! - one foreign-key index per declared foreign key maps a column value to
//!   the ids of the rows that carry it.

pub mod codec;
pub mod data;
pub mod join;
pub mod pack;

pub use data::{
    BlockData, BlockId, ForeignKey, JoinType, RowFragment, RowId, RowOp, RowVersion, TableMeta,
    TableTally,
};

use std::collections::{HashMap, HashSet};

use crate::cache::NodeCache;
use crate::config::EngineConfig;
use crate::encoding::Key;
use crate::error::Result;
use crate::filter::Direction;
use crate::store::{KeyValueStore, Overlay};
use crate::tree::{IndexTree, InsertMode, OrderMode, TreeHead};
use crate::Error;
use codec::BLOCK_HEADER_SIZE;

const BLOCK: &str = "block";

/// Index column of the row id to first block mapping.
pub const PRIMARY_COLUMN: &str = "__pk";
/// Index column of the row id to block history mapping.
pub const HISTORY_COLUMN: &str = "__history";
const FOREIGN_KEY_PREFIX: &str = "fk.";

fn foreign_column(name: &str) -> String {
    format!("{}{}", FOREIGN_KEY_PREFIX, name)
}

fn decode_id(bytes: &[u8]) -> Result<u64> {
    <u64 as Key>::decode(bytes)
}

pub struct BlockStore<'a, S: KeyValueStore> {
    store: &'a S,
    config: &'a EngineConfig,
    tree: IndexTree<'a, S>,
}

impl<'a, S: KeyValueStore> BlockStore<'a, S> {
    pub fn new(store: &'a S, config: &'a EngineConfig) -> Result<Self> {
        let tree = IndexTree::new(store, config)?;
        Ok(Self {
            store,
            config,
            tree,
        })
    }

    fn block_key(&self, table: &str, id: BlockId) -> Vec<u8> {
        self.store
            .create_composite_key(BLOCK, &[table.as_bytes(), &Key::encode(&id)])
    }

    /// Writes a batch of rows into new blocks and updates the table's
    /// indexes, returning the advanced tally.
    ///
    /// The batch is checked against the primary index before anything is
    /// written: an `Add` of a live row id is a unique violation and a
    /// `Delete` of a missing one is not found. A row id that appears more than
    /// once is indexed at its first appearance.
    pub fn set_block_data(
        &self,
        meta: &TableMeta,
        tally: &TableTally,
        rows: &[RowFragment],
    ) -> Result<TableTally> {
        let table = meta.name.as_str();
        if table.is_empty() {
            return Err(Error::InvalidArgument("table name is empty".to_string()));
        }
        if rows.is_empty() {
            return Ok(tally.clone());
        }
        self.validate_batch(meta, rows)?;

        let tx_id = self.store.tx_id();
        let time = self.store.tx_timestamp();
        let capacity = self
            .config
            .block_size
            .checked_sub(BLOCK_HEADER_SIZE + tx_id.len())
            .ok_or_else(|| {
                Error::InvalidArgument(format!(
                    "transaction id of {} bytes leaves no room in a block",
                    tx_id.len()
                ))
            })?;
        let lengths: Vec<Vec<usize>> = rows.iter().map(RowFragment::column_lengths).collect();
        let plans = pack::plan_blocks(capacity, self.config.row_overhead, &lengths)?;
        let first_id = tally.block.checked_add(1).ok_or_else(|| {
            Error::CapacityExceeded(format!("table {} ran out of block ids", table))
        })?;
        let blocks = pack::build_blocks(&plans, rows, first_id, &tx_id, time)?;

        // first block of every row in the batch
        let mut first_block: HashMap<usize, BlockId> = HashMap::new();
        for (n, plan) in plans.iter().enumerate() {
            for fragment in &plan.fragments {
                first_block
                    .entry(fragment.row)
                    .or_insert(first_id + n as BlockId);
            }
        }

        // Blocks and every index write of the batch go to one overlay that
        // reaches the store only after the whole batch succeeded.
        let staged = Overlay::new(self.store);
        let tree = IndexTree::new(&staged, self.config)?;

        let mut cache: NodeCache<BlockId, BlockData> = NodeCache::new();
        for block in blocks {
            cache.stage(block.id, block);
        }
        let count = cache.staged_len() as u64;
        for (id, block) in cache.into_writes() {
            let bytes: Vec<u8> = (&block).try_into()?;
            staged.put(&self.block_key(table, id), bytes)?;
        }

        let mut tally = tally.clone();
        tally.block += count;

        let mut primary = tree.create_head(table, PRIMARY_COLUMN, OrderMode::Ascending)?;
        let mut history = tree.create_head(table, HISTORY_COLUMN, OrderMode::Ascending)?;
        let mut foreign: HashMap<&str, TreeHead> = HashMap::new();
        let mut indexed: HashSet<RowId> = HashSet::new();

        for (index, row) in rows.iter().enumerate() {
            if !indexed.insert(row.id) {
                continue;
            }
            let block = first_block.get(&index).copied().ok_or_else(|| {
                Error::Corrupt(format!("row {} was not placed in any block", row.id))
            })?;
            let row_key = Key::encode(&row.id);
            let block_value = Key::encode(&block);

            match row.op {
                RowOp::Add => {
                    primary = tree.insert(&primary, &row_key, &block_value, InsertMode::Default)?;
                    for fk in &meta.foreign_keys {
                        let value = row.columns.get(fk.column).ok_or_else(|| {
                            Error::InvalidArgument(format!(
                                "row {} has no column {} for foreign key {}",
                                row.id, fk.column, fk.name
                            ))
                        })?;
                        if value.is_empty() {
                            continue;
                        }
                        let head = match foreign.remove(fk.name.as_str()) {
                            Some(head) => head,
                            None => tree.create_head(
                                table,
                                &foreign_column(&fk.name),
                                OrderMode::Default,
                            )?,
                        };
                        let head = tree.insert(&head, value, &row_key, InsertMode::Append)?;
                        foreign.insert(fk.name.as_str(), head);
                    }
                    tally.add_row += 1;
                    tally.increment = tally.increment.max(row.id);
                }
                RowOp::Update => {
                    primary = tree.insert(&primary, &row_key, &block_value, InsertMode::Change)?;
                    tally.update_row += 1;
                }
                RowOp::Delete => {
                    primary = tree.delete(&primary, &row_key)?;
                    tally.del_row += 1;
                }
            }
            history = tree.insert(&history, &row_key, &block_value, InsertMode::Append)?;
        }

        let writes = staged.staged_len();
        staged.commit()?;
        tracing::debug!(
            table,
            first = first_id,
            count,
            rows = rows.len(),
            writes,
            "wrote block batch"
        );
        Ok(tally)
    }

    fn validate_batch(&self, meta: &TableMeta, rows: &[RowFragment]) -> Result<()> {
        let primary = self.tree.search_head(&meta.name, PRIMARY_COLUMN)?;
        let mut seen = HashSet::new();
        for row in rows {
            if !seen.insert(row.id) {
                continue;
            }
            let live = match &primary {
                Some(head) => self.tree.search(head, &Key::encode(&row.id))?.is_some(),
                None => false,
            };
            match row.op {
                RowOp::Add if live => {
                    return Err(Error::UniqueViolation(format!(
                        "row {} already exists in {}",
                        row.id, meta.name
                    )))
                }
                RowOp::Add => {
                    if let Some(fk) = meta.foreign_keys.iter().find(|fk| fk.column >= row.columns.len()) {
                        return Err(Error::InvalidArgument(format!(
                            "row {} has no column {} for foreign key {}",
                            row.id, fk.column, fk.name
                        )));
                    }
                }
                RowOp::Delete if !live => {
                    return Err(Error::NotFound(format!(
                        "row {} in {}",
                        row.id, meta.name
                    )))
                }
                RowOp::Update | RowOp::Delete => {}
            }
        }
        Ok(())
    }

    fn read_block(&self, table: &str, id: BlockId) -> Result<Option<BlockData>> {
        tracing::trace!(table, block = id, "reading block");
        match self.store.get(&self.block_key(table, id))? {
            Some(bytes) => Ok(Some(BlockData::try_from(bytes.as_slice())?)),
            None => Ok(None),
        }
    }

    /// Loads a block an index entry or join chain points at.
    fn load_block(&self, table: &str, id: BlockId) -> Result<BlockData> {
        self.read_block(table, id)?.ok_or_else(|| {
            tracing::warn!(table, block = id, "referenced block missing");
            Error::Corrupt(format!("block {} of {} is missing", id, table))
        })
    }

    /// Reassembles row `row` starting from block `block`, along with the
    /// transaction id and time of that block.
    fn read_row(
        &self,
        table: &str,
        block: BlockId,
        row: RowId,
    ) -> Result<(String, i64, RowFragment)> {
        let first = self.load_block(table, block)?;
        let (tx_id, time) = (first.tx_id.clone(), first.time);
        let pieces = join::follow(first, row, |id| self.load_block(table, id))?;
        Ok((tx_id, time, join::assemble(pieces)?))
    }

    pub fn query_block(&self, table: &str, id: BlockId) -> Result<BlockData> {
        self.read_block(table, id)?
            .ok_or_else(|| Error::NotFound(format!("block {} of {}", id, table)))
    }

    /// Every block of `table` in id order.
    pub fn blocks(&self, table: &str) -> Result<Vec<BlockData>> {
        let mut blocks = Vec::new();
        for entry in self.store.scan_by_prefix(BLOCK, &[table.as_bytes()]) {
            let (_, bytes) = entry?;
            blocks.push(BlockData::try_from(bytes.as_slice())?);
        }
        Ok(blocks)
    }

    /// The current version of a row, or `None` if it was never added or has
    /// been deleted.
    pub fn query_row_data(&self, table: &str, id: RowId) -> Result<Option<RowFragment>> {
        let Some(head) = self.tree.search_head(table, PRIMARY_COLUMN)? else {
            return Ok(None);
        };
        let Some((payload, _)) = self.tree.search(&head, &Key::encode(&id))? else {
            return Ok(None);
        };
        let (_, _, row) = self.read_row(table, decode_id(&payload)?, id)?;
        Ok(Some(row))
    }

    /// Current versions of the live rows with ids in `[start, end]`.
    pub fn query_row_data_by_range(
        &self,
        table: &str,
        start: Option<RowId>,
        end: Option<RowId>,
        direction: Direction,
        limit: usize,
    ) -> Result<Vec<RowFragment>> {
        let Some(head) = self.tree.search_head(table, PRIMARY_COLUMN)? else {
            return Ok(Vec::new());
        };
        let start = start.map(|id| Key::encode(&id));
        let end = end.map(|id| Key::encode(&id));
        let entries = self.tree.search_by_range(
            &head,
            start.as_deref(),
            end.as_deref(),
            direction,
            limit,
        )?;
        let mut rows = Vec::with_capacity(entries.len());
        for entry in entries {
            let id = decode_id(&entry.key)?;
            let (_, _, row) = self.read_row(table, decode_id(&entry.value)?, id)?;
            rows.push(row);
        }
        Ok(rows)
    }

    /// Every stored version of a row, oldest first for `Asc`.
    pub fn query_row_data_history_by_range(
        &self,
        table: &str,
        id: RowId,
        direction: Direction,
        limit: usize,
    ) -> Result<Vec<RowVersion>> {
        let Some(head) = self.tree.search_head(table, HISTORY_COLUMN)? else {
            return Ok(Vec::new());
        };
        let Some((payload, tag)) = self.tree.search(&head, &Key::encode(&id))? else {
            return Ok(Vec::new());
        };
        let (blocks, _) = self.tree.resolve_values(tag, &payload, direction, limit)?;
        let mut versions = Vec::with_capacity(blocks.len());
        for block in blocks {
            let block = decode_id(&block)?;
            let (tx_id, time, row) = self.read_row(table, block, id)?;
            versions.push(RowVersion {
                block,
                tx_id,
                time,
                row,
            });
        }
        Ok(versions)
    }

    /// Ids of the rows added with `value` in the column of foreign key `fk`,
    /// plus the total number of such rows.
    pub fn query_row_id_by_foreign_key(
        &self,
        table: &str,
        fk: &str,
        value: &[u8],
        direction: Direction,
        limit: usize,
    ) -> Result<(Vec<RowId>, u64)> {
        if value.is_empty() {
            return Err(Error::InvalidArgument("foreign key value is empty".to_string()));
        }
        let Some(head) = self.tree.search_head(table, &foreign_column(fk))? else {
            return Ok((Vec::new(), 0));
        };
        let Some((payload, tag)) = self.tree.search(&head, value)? else {
            return Ok((Vec::new(), 0));
        };
        let (ids, total) = self.tree.resolve_values(tag, &payload, direction, limit)?;
        let ids = ids
            .iter()
            .map(|id| decode_id(id))
            .collect::<Result<Vec<_>>>()?;
        Ok((ids, total))
    }
}
