//! Row and block records.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::Error;

pub type RowId = u64;
pub type BlockId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RowOp {
    Add,
    Update,
    Delete,
}

impl RowOp {
    pub fn as_byte(self) -> u8 {
        match self {
            RowOp::Add => 0,
            RowOp::Update => 1,
            RowOp::Delete => 2,
        }
    }
}

impl TryFrom<u8> for RowOp {
    type Error = Error;

    fn try_from(byte: u8) -> Result<Self> {
        match byte {
            0 => Ok(RowOp::Add),
            1 => Ok(RowOp::Update),
            2 => Ok(RowOp::Delete),
            n => Err(Error::Corrupt(format!("unknown row op {}", n))),
        }
    }
}

/// How the last fragment of a block continues into the next block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum JoinType {
    /// The block ends on a row boundary.
    #[default]
    None,
    /// The row continues with its next column.
    JoinRow,
    /// The last column's bytes continue.
    JoinColumn,
}

impl JoinType {
    pub fn as_byte(self) -> u8 {
        match self {
            JoinType::None => 0,
            JoinType::JoinRow => 1,
            JoinType::JoinColumn => 2,
        }
    }
}

impl TryFrom<u8> for JoinType {
    type Error = Error;

    fn try_from(byte: u8) -> Result<Self> {
        match byte {
            0 => Ok(JoinType::None),
            1 => Ok(JoinType::JoinRow),
            2 => Ok(JoinType::JoinColumn),
            n => Err(Error::Corrupt(format!("unknown join type {}", n))),
        }
    }
}

/// A row, or the part of a row stored in one block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowFragment {
    pub id: RowId,
    pub op: RowOp,
    pub columns: Vec<Vec<u8>>,
}

impl RowFragment {
    pub fn new(id: RowId, op: RowOp, columns: Vec<Vec<u8>>) -> Self {
        Self { id, op, columns }
    }

    /// Byte length of each column, the input of block packing.
    pub fn column_lengths(&self) -> Vec<usize> {
        self.columns.iter().map(Vec::len).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockData {
    pub id: BlockId,
    pub tx_id: String,
    /// Transaction time, in seconds.
    pub time: i64,
    pub rows: Vec<RowFragment>,
    pub join: JoinType,
}

/// Running per-table counters. `block` is the last allocated block id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableTally {
    /// Highest row id ever added.
    pub increment: u64,
    pub add_row: u64,
    pub update_row: u64,
    pub del_row: u64,
    pub block: BlockId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKey {
    pub name: String,
    /// Index of the referencing column within the row.
    pub column: usize,
}

/// What the block store needs to know about a table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableMeta {
    pub name: String,
    pub foreign_keys: Vec<ForeignKey>,
}

impl TableMeta {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            foreign_keys: Vec::new(),
        }
    }

    pub fn foreign_key(mut self, name: impl Into<String>, column: usize) -> Self {
        self.foreign_keys.push(ForeignKey {
            name: name.into(),
            column,
        });
        self
    }
}

/// One stored version of a row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowVersion {
    /// Block holding the version's first fragment.
    pub block: BlockId,
    pub tx_id: String,
    pub time: i64,
    pub row: RowFragment,
}
