//! Byte encodings.
//!
//! Index keys and store keys go through [`Key`], which preserves order.
//! Stored records go through [`Value`] (bincode). Leaf values additionally
//! carry a trailing tag, see [`tagged`].

pub mod bincode;
pub mod format;
pub mod keycode;
pub mod tagged;

use crate::error::Result;

/// Order-preserving encoding: `a < b` iff `a.encode() < b.encode()`.
pub trait Key {
    fn encode(&self) -> Vec<u8>;

    fn decode(bytes: &[u8]) -> Result<Self>
    where
        Self: Sized;
}

/// Record encoding for heads, nodes, collections and tallies. No ordering.
pub trait Value {
    fn encode(&self) -> Result<Vec<u8>>;

    fn decode(bytes: &[u8]) -> Result<Self>
    where
        Self: Sized;
}

/// A stored key or record that cannot be decoded.
#[derive(Debug)]
pub enum EncodingError {
    InvalidFormat(String),
    TruncatedData,
    InvalidUtf8,
}

impl std::fmt::Display for EncodingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EncodingError::InvalidFormat(msg) => write!(f, "malformed encoding: {}", msg),
            EncodingError::TruncatedData => write!(f, "encoding ends early"),
            EncodingError::InvalidUtf8 => write!(f, "encoded string is not utf-8"),
        }
    }
}

impl std::error::Error for EncodingError {}

impl From<EncodingError> for crate::Error {
    fn from(err: EncodingError) -> Self {
        crate::Error::Corrupt(err.to_string())
    }
}
