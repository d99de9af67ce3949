//! Row reassembly across blocks.

use super::data::{BlockData, BlockId, JoinType, RowFragment, RowId};
use crate::error::Result;
use crate::Error;

fn corrupt(message: String) -> Error {
    tracing::warn!("{}", message);
    Error::Corrupt(message)
}

/// Collects every fragment of `row`, starting in `first` and following the
/// join chain through consecutively numbered blocks fetched with `load`.
///
/// Each piece is paired with how it continues: the block's join when the
/// piece is the last fragment of its block, `None` otherwise.
pub fn follow<F>(first: BlockData, row: RowId, mut load: F) -> Result<Vec<(RowFragment, JoinType)>>
where
    F: FnMut(BlockId) -> Result<BlockData>,
{
    let index = first
        .rows
        .iter()
        .position(|fragment| fragment.id == row)
        .ok_or_else(|| corrupt(format!("row {} is not in block {}", row, first.id)))?;
    let last = first.rows.len() - 1;
    let mut join = if index == last { first.join } else { JoinType::None };
    let mut block_id = first.id;
    let fragment = first
        .rows
        .into_iter()
        .nth(index)
        .ok_or_else(|| corrupt(format!("row {} vanished from block {}", row, block_id)))?;
    let mut pieces = vec![(fragment, join)];

    while join != JoinType::None {
        block_id = block_id
            .checked_add(1)
            .ok_or_else(|| corrupt(format!("row {} continues past the last block id", row)))?;
        let next = load(block_id)?;
        let single = next.rows.len() == 1;
        let next_join = next.join;
        let fragment = next
            .rows
            .into_iter()
            .next()
            .filter(|fragment| fragment.id == row)
            .ok_or_else(|| {
                corrupt(format!(
                    "block {} does not continue row {}",
                    block_id, row
                ))
            })?;
        join = if single { next_join } else { JoinType::None };
        pieces.push((fragment, join));
    }
    Ok(pieces)
}

/// Stitches fragments back into one row. A `JoinColumn` piece's last column
/// continues in the next piece's first column; any other boundary falls
/// between columns.
pub fn assemble(pieces: Vec<(RowFragment, JoinType)>) -> Result<RowFragment> {
    let (id, op) = match pieces.first() {
        Some((fragment, _)) => (fragment.id, fragment.op),
        None => return Err(corrupt("row has no fragments".to_string())),
    };

    // Size every column first so each buffer is allocated once.
    let mut lengths: Vec<usize> = Vec::new();
    let mut continues = false;
    for (fragment, join) in &pieces {
        if fragment.id != id {
            return Err(corrupt(format!(
                "fragment of row {} found in the chain of row {}",
                fragment.id, id
            )));
        }
        if continues && fragment.columns.is_empty() {
            return Err(corrupt(format!("row {} split column has no continuation", id)));
        }
        for (i, column) in fragment.columns.iter().enumerate() {
            if i == 0 && continues {
                if let Some(length) = lengths.last_mut() {
                    *length += column.len();
                    continue;
                }
            }
            lengths.push(column.len());
        }
        continues = *join == JoinType::JoinColumn;
    }
    if continues {
        return Err(corrupt(format!("row {} ends inside a split column", id)));
    }

    let mut columns: Vec<Vec<u8>> = lengths.iter().map(|n| Vec::with_capacity(*n)).collect();
    let mut slot = 0;
    let mut continues = false;
    for (fragment, join) in pieces {
        for (i, column) in fragment.columns.into_iter().enumerate() {
            if !(i == 0 && continues) {
                slot += 1;
            }
            columns[slot - 1].extend_from_slice(&column);
        }
        continues = join == JoinType::JoinColumn;
    }
    Ok(RowFragment::new(id, op, columns))
}
