//! CRC-64 checksums for stored block records.

use std::fmt;

use crc::{Algorithm, Crc, Digest};

use crate::error::Result;
use crate::Error;

pub const CRC_64_ECMA: Algorithm<u64> = crc::CRC_64_ECMA_182;

static CRC64: Crc<u64> = Crc::<u64>::new(&CRC_64_ECMA);

/// Streaming CRC-64 over record bytes.
pub struct Hasher {
    digest: Digest<'static, u64>,
}

impl fmt::Debug for Hasher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hasher")
    }
}

impl Hasher {
    pub fn new() -> Self {
        Self {
            digest: CRC64.digest(),
        }
    }

    pub fn write(&mut self, data: &[u8]) {
        self.digest.update(data);
    }

    pub fn checksum(self) -> u64 {
        self.digest.finalize()
    }
}

impl Default for Hasher {
    fn default() -> Self {
        Self::new()
    }
}

/// One-shot checksum of a byte slice.
pub fn checksum(data: &[u8]) -> u64 {
    CRC64.checksum(data)
}

/// Checks `data` against the checksum stored alongside it.
pub fn verify(data: &[u8], expected: u64) -> Result<()> {
    if checksum(data) == expected {
        Ok(())
    } else {
        Err(Error::ChecksumMismatch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_streaming_matches_one_shot() {
        let mut hasher = Hasher::new();
        hasher.write(b"block ");
        hasher.write(b"body");
        assert_eq!(hasher.checksum(), checksum(b"block body"));
    }

    #[test]
    fn test_verify() {
        let sum = checksum(b"block-1");
        assert!(verify(b"block-1", sum).is_ok());
        assert!(matches!(
            verify(b"block-2", sum),
            Err(Error::ChecksumMismatch)
        ));
    }
}
