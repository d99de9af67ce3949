//! Insert modes.
//!
//! Each mode is a pure function from the live value at a key (if any) and
//! the incoming value to what the leaf should hold afterwards. Side effects
//! (overflow list writes, node staging) stay with the caller.

use crate::encoding::format::{Formatter, Raw};
use crate::encoding::tagged::{decode_collection, encode_collection, ValueTag};
use crate::error::Result;
use crate::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InsertMode {
    /// Unique insert; an existing live key is an error.
    #[default]
    Default,
    /// Overwrite, keeping the existing tag.
    Replace,
    /// Upsert; an inline collection stays a collection.
    Change,
    /// Merge the value into the key's value set.
    Append,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Formatted {
    /// Write this value into the leaf.
    Store { tag: ValueTag, payload: Vec<u8> },
    /// The key already spills into an overflow list; append there.
    ListAppend { list_key: Vec<u8> },
    /// The collection reached the threshold; move these values to a new list.
    Promote { values: Vec<Vec<u8>> },
}

/// Decides what the leaf holds after applying `mode`.
///
/// `existing` is the live value at the key: `None` when the key is absent or
/// carries a delete marker.
pub fn format_value(
    mode: InsertMode,
    key: &[u8],
    existing: Option<(ValueTag, &[u8])>,
    value: &[u8],
    threshold: usize,
) -> Result<Formatted> {
    match mode {
        InsertMode::Default => match existing {
            Some(_) => Err(Error::UniqueViolation(format!(
                "key {} already exists",
                Raw::key(key)
            ))),
            None => Ok(store(ValueTag::Data, value)),
        },
        InsertMode::Replace => match existing {
            None | Some((ValueTag::Data, _)) => Ok(store(ValueTag::Data, value)),
            Some((ValueTag::Collection, _)) => {
                decode_collection(value).map_err(|_| {
                    Error::InvalidArgument("replacement for a collection must be a collection".into())
                })?;
                Ok(store(ValueTag::Collection, value))
            }
            Some((tag, _)) => Err(Error::InvalidArgument(format!(
                "cannot replace a {:?} value at {}",
                tag,
                Raw::key(key)
            ))),
        },
        InsertMode::Change => match existing {
            Some((ValueTag::Collection, _)) => {
                decode_collection(value).map_err(|_| {
                    Error::InvalidArgument("change of a collection must be a collection".into())
                })?;
                Ok(store(ValueTag::Collection, value))
            }
            _ => Ok(store(ValueTag::Data, value)),
        },
        InsertMode::Append => {
            let values = match existing {
                None => vec![value.to_vec()],
                Some((ValueTag::Data, payload)) => vec![payload.to_vec(), value.to_vec()],
                Some((ValueTag::Collection, payload)) => {
                    let mut values = decode_collection(payload)?;
                    values.push(value.to_vec());
                    values
                }
                Some((ValueTag::LinkedList, list_key)) => {
                    return Ok(Formatted::ListAppend {
                        list_key: list_key.to_vec(),
                    })
                }
                Some((ValueTag::Pointer, _)) => {
                    return Err(Error::Corrupt(format!(
                        "leaf value at {} is a child pointer",
                        Raw::key(key)
                    )))
                }
            };
            if values.len() >= threshold {
                Ok(Formatted::Promote { values })
            } else {
                Ok(Formatted::Store {
                    tag: ValueTag::Collection,
                    payload: encode_collection(&values)?,
                })
            }
        }
    }
}

fn store(tag: ValueTag, payload: &[u8]) -> Formatted {
    Formatted::Store {
        tag,
        payload: payload.to_vec(),
    }
}
