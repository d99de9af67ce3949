//! Tagged index values.
//!
//! Every value stored in a tree node carries one trailing byte naming what
//! the payload is. Internal nodes only ever hold `Pointer` values.

use super::{bincode, EncodingError};
use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueTag {
    /// A single caller value
    Data,
    /// A child node pointer
    Pointer,
    /// An inline array of values
    Collection,
    /// The key of an overflow list holding the values
    LinkedList,
}

impl ValueTag {
    pub fn as_byte(self) -> u8 {
        match self {
            ValueTag::Data => 0,
            ValueTag::Pointer => 1,
            ValueTag::Collection => 2,
            ValueTag::LinkedList => 3,
        }
    }
}

impl TryFrom<u8> for ValueTag {
    type Error = crate::Error;

    fn try_from(byte: u8) -> Result<Self> {
        match byte {
            0 => Ok(ValueTag::Data),
            1 => Ok(ValueTag::Pointer),
            2 => Ok(ValueTag::Collection),
            3 => Ok(ValueTag::LinkedList),
            n => Err(EncodingError::InvalidFormat(format!("unknown value tag {}", n)).into()),
        }
    }
}

pub fn encode_value(tag: ValueTag, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + 1);
    out.extend_from_slice(payload);
    out.push(tag.as_byte());
    out
}

pub fn decode_value(bytes: &[u8]) -> Result<(ValueTag, &[u8])> {
    let (&tag, payload) = bytes.split_last().ok_or(EncodingError::TruncatedData)?;
    Ok((ValueTag::try_from(tag)?, payload))
}

pub fn encode_collection(values: &[Vec<u8>]) -> Result<Vec<u8>> {
    bincode::serialize(&values)
}

pub fn decode_collection(payload: &[u8]) -> Result<Vec<Vec<u8>>> {
    bincode::deserialize(payload)
}
