//! Bincode for stored records: tree heads and nodes, list heads and nodes,
//! inline collections and table tallies.

use super::{EncodingError, Value};
use crate::error::Result;
use serde::{Deserialize, Serialize};

fn encoding_error(context: &str, err: bincode::Error) -> crate::Error {
    match *err {
        bincode::ErrorKind::Io(ref io) if io.kind() == std::io::ErrorKind::UnexpectedEof => {
            EncodingError::TruncatedData.into()
        }
        other => EncodingError::InvalidFormat(format!("{}: {}", context, other)).into(),
    }
}

pub fn serialize<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    bincode::serialize(value).map_err(|e| encoding_error("serialize record", e))
}

pub fn deserialize<T: for<'a> Deserialize<'a>>(bytes: &[u8]) -> Result<T> {
    bincode::deserialize(bytes).map_err(|e| encoding_error("deserialize record", e))
}

/// Number of bytes `serialize` produces for the value. Used to keep list
/// nodes within the node size.
pub fn serialized_size<T: Serialize>(value: &T) -> Result<usize> {
    bincode::serialized_size(value)
        .map(|n| n as usize)
        .map_err(|e| encoding_error("size record", e))
}

impl<T> Value for T
where
    T: Serialize + for<'a> Deserialize<'a>,
{
    fn encode(&self) -> Result<Vec<u8>> {
        serialize(self)
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        deserialize(bytes)
    }
}
