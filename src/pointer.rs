use std::fmt;

use serde::{Deserialize, Serialize};

use crate::encoding::EncodingError;
use crate::error::Result;
use crate::Error;

/// Identifier of a tree or list node within one structure.
///
/// Pointers are handed out from a per-structure counter starting at 1 and are
/// never reused. `Pointer::NULL` marks an absent link.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Pointer(u32);

impl Pointer {
    pub const NULL: Pointer = Pointer(0);

    pub fn new(id: u32) -> Self {
        Pointer(id)
    }

    pub fn get(self) -> u32 {
        self.0
    }

    pub fn is_null(self) -> bool {
        self.0 == 0
    }

    /// The pointer after this one in allocation order.
    pub fn next(self) -> Result<Self> {
        self.0
            .checked_add(1)
            .map(Pointer)
            .ok_or_else(|| Error::CapacityExceeded("pointer space exhausted".to_string()))
    }

    /// Fixed 4-byte big-endian form.
    pub fn to_bytes(self) -> [u8; 4] {
        self.0.to_be_bytes()
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let buf: [u8; 4] = bytes.try_into().map_err(|_| {
            EncodingError::InvalidFormat(format!("pointer must be 4 bytes, got {}", bytes.len()))
        })?;
        Ok(Pointer(u32::from_be_bytes(buf)))
    }
}

impl fmt::Display for Pointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}
