//! Block packing.
//!
//! Pure arithmetic over column lengths: decides which byte ranges of which
//! columns land in which block, and how each block continues into the next.
//! No bytes are copied here.

use std::ops::Range;

use super::data::{BlockData, BlockId, JoinType, RowFragment};
use crate::config::COLUMN_HEADER_SIZE;
use crate::error::Result;
use crate::Error;

/// A byte range of one column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSlice {
    pub column: usize,
    pub bytes: Range<usize>,
}

/// The part of one input row placed in one block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FragmentPlan {
    /// Index of the row in the batch.
    pub row: usize,
    pub slices: Vec<ColumnSlice>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockPlan {
    pub fragments: Vec<FragmentPlan>,
    pub join: JoinType,
}

/// Packs rows, given as column lengths, into blocks of `capacity` usable
/// bytes. Every fragment costs `row_overhead` and every column slice costs a
/// length prefix on top of its bytes.
///
/// A new block is opened when a row starts and the budget left cannot hold
/// one byte of payload. A column that does not fit is cut at the budget and
/// continues in the next block (`JoinColumn`); when the budget left cannot
/// hold even a length prefix plus one byte, the row continues with that
/// column in the next block (`JoinRow`).
pub fn plan_blocks(
    capacity: usize,
    row_overhead: usize,
    rows: &[Vec<usize>],
) -> Result<Vec<BlockPlan>> {
    let min_budget = row_overhead + COLUMN_HEADER_SIZE + 1;
    if capacity < min_budget {
        return Err(Error::InvalidArgument(format!(
            "block capacity {} is below the {} bytes one fragment needs",
            capacity, min_budget
        )));
    }

    let mut blocks = Vec::new();
    let mut current = BlockPlan::default();
    let mut budget = capacity;

    for (row, columns) in rows.iter().enumerate() {
        if budget < min_budget {
            if !current.fragments.is_empty() {
                blocks.push(std::mem::take(&mut current));
            }
            budget = capacity;
        }
        budget -= row_overhead;
        let mut fragment = FragmentPlan {
            row,
            slices: Vec::new(),
        };

        for (column, &len) in columns.iter().enumerate() {
            let mut offset = 0;
            loop {
                let remaining = len - offset;
                if COLUMN_HEADER_SIZE + remaining <= budget {
                    fragment.slices.push(ColumnSlice {
                        column,
                        bytes: offset..len,
                    });
                    budget -= COLUMN_HEADER_SIZE + remaining;
                    break;
                }

                let take = budget.saturating_sub(COLUMN_HEADER_SIZE);
                let join = if take == 0 {
                    JoinType::JoinRow
                } else {
                    fragment.slices.push(ColumnSlice {
                        column,
                        bytes: offset..offset + take,
                    });
                    offset += take;
                    JoinType::JoinColumn
                };
                current.fragments.push(fragment);
                current.join = join;
                blocks.push(std::mem::take(&mut current));

                budget = capacity - row_overhead;
                fragment = FragmentPlan {
                    row,
                    slices: Vec::new(),
                };
            }
        }
        current.fragments.push(fragment);
    }

    if !current.fragments.is_empty() {
        blocks.push(current);
    }
    Ok(blocks)
}

/// Copies the planned slices out of `rows` into block records numbered
/// from `first_id`.
pub fn build_blocks(
    plans: &[BlockPlan],
    rows: &[RowFragment],
    first_id: BlockId,
    tx_id: &str,
    time: i64,
) -> Result<Vec<BlockData>> {
    let mut blocks = Vec::with_capacity(plans.len());
    for (n, plan) in plans.iter().enumerate() {
        let mut fragments = Vec::with_capacity(plan.fragments.len());
        for fragment in &plan.fragments {
            let row = rows.get(fragment.row).ok_or_else(|| {
                Error::InvalidArgument(format!("plan refers to missing row {}", fragment.row))
            })?;
            let mut columns = Vec::with_capacity(fragment.slices.len());
            for slice in &fragment.slices {
                let bytes = row
                    .columns
                    .get(slice.column)
                    .and_then(|column| column.get(slice.bytes.clone()))
                    .ok_or_else(|| {
                        Error::InvalidArgument(format!(
                            "plan slice {:?} of column {} is out of range",
                            slice.bytes, slice.column
                        ))
                    })?;
                columns.push(bytes.to_vec());
            }
            fragments.push(RowFragment::new(row.id, row.op, columns));
        }
        blocks.push(BlockData {
            id: first_id + n as BlockId,
            tx_id: tx_id.to_string(),
            time,
            rows: fragments,
            join: plan.join,
        });
    }
    Ok(blocks)
}
