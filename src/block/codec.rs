//! Binary block codec.
//!
//! ```text
//! id u64 | txid len u16 | txid | time i64 | join u8 | fragments u32 | fragment* | crc64 u64
//! fragment = row id u64 | op u8 | columns u32 | (len u32 | bytes)*
//! ```
//!
//! All integers are big-endian. The trailing CRC-64 covers every byte
//! before it.

use std::io::{Read, Write};

use byteorder::{BigEndian, ByteOrder, ReadBytesExt, WriteBytesExt};

use super::data::{BlockData, JoinType, RowFragment, RowOp};
use crate::error::Result;
use crate::hasher::{verify, Hasher};
use crate::Error;

/// Encoded size of a block without its transaction id and fragments.
pub const BLOCK_HEADER_SIZE: usize = 8 + 2 + 8 + 1 + 4 + 8;

impl TryFrom<&BlockData> for Vec<u8> {
    type Error = Error;

    fn try_from(block: &BlockData) -> Result<Self> {
        let tx_len = u16::try_from(block.tx_id.len()).map_err(|_| {
            Error::InvalidArgument(format!(
                "transaction id of {} bytes is too long",
                block.tx_id.len()
            ))
        })?;
        let mut buf = Vec::new();
        let enc = |e| Error::Encode("block", e);

        buf.write_u64::<BigEndian>(block.id).map_err(enc)?;
        buf.write_u16::<BigEndian>(tx_len).map_err(enc)?;
        buf.write_all(block.tx_id.as_bytes()).map_err(enc)?;
        buf.write_i64::<BigEndian>(block.time).map_err(enc)?;
        buf.write_u8(block.join.as_byte()).map_err(enc)?;
        buf.write_u32::<BigEndian>(block.rows.len() as u32)
            .map_err(enc)?;

        for row in &block.rows {
            buf.write_u64::<BigEndian>(row.id).map_err(enc)?;
            buf.write_u8(row.op.as_byte()).map_err(enc)?;
            buf.write_u32::<BigEndian>(row.columns.len() as u32)
                .map_err(enc)?;
            for column in &row.columns {
                buf.write_u32::<BigEndian>(column.len() as u32)
                    .map_err(enc)?;
                buf.write_all(column).map_err(enc)?;
            }
        }

        let mut hasher = Hasher::new();
        hasher.write(&buf);
        buf.write_u64::<BigEndian>(hasher.checksum()).map_err(enc)?;
        Ok(buf)
    }
}

impl TryFrom<&[u8]> for BlockData {
    type Error = Error;

    fn try_from(buf: &[u8]) -> Result<Self> {
        if buf.len() < BLOCK_HEADER_SIZE {
            return Err(Error::Corrupt(format!(
                "block of {} bytes is shorter than its header",
                buf.len()
            )));
        }
        let (body, trailer) = buf.split_at(buf.len() - 8);
        verify(body, BigEndian::read_u64(trailer))?;

        let mut reader = std::io::Cursor::new(body);
        let dec = |e| Error::Decode("block", e);

        let id = reader.read_u64::<BigEndian>().map_err(dec)?;
        let tx_len = reader.read_u16::<BigEndian>().map_err(dec)? as usize;
        let mut tx_id = vec![0; tx_len];
        reader.read_exact(&mut tx_id).map_err(dec)?;
        let tx_id = String::from_utf8(tx_id)
            .map_err(|_| Error::Corrupt(format!("block {} transaction id is not utf-8", id)))?;
        let time = reader.read_i64::<BigEndian>().map_err(dec)?;
        let join = JoinType::try_from(reader.read_u8().map_err(dec)?)?;
        let count = reader.read_u32::<BigEndian>().map_err(dec)?;

        let mut rows = Vec::new();
        for _ in 0..count {
            let row_id = reader.read_u64::<BigEndian>().map_err(dec)?;
            let op = RowOp::try_from(reader.read_u8().map_err(dec)?)?;
            let columns = reader.read_u32::<BigEndian>().map_err(dec)?;
            let mut row = RowFragment::new(row_id, op, Vec::new());
            for _ in 0..columns {
                let len = reader.read_u32::<BigEndian>().map_err(dec)? as usize;
                let remaining = body.len() - reader.position() as usize;
                if len > remaining {
                    return Err(Error::Corrupt(format!(
                        "block {} column of {} bytes overruns the record",
                        id, len
                    )));
                }
                let mut column = vec![0; len];
                reader.read_exact(&mut column).map_err(dec)?;
                row.columns.push(column);
            }
            rows.push(row);
        }
        if reader.position() as usize != body.len() {
            return Err(Error::Corrupt(format!(
                "block {} has trailing bytes",
                id
            )));
        }

        Ok(BlockData {
            id,
            tx_id,
            time,
            rows,
            join,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hasher::checksum;

    fn sample() -> BlockData {
        BlockData {
            id: 7,
            tx_id: "tx-42".to_string(),
            time: 1_700_000_000,
            rows: vec![
                RowFragment::new(1, RowOp::Add, vec![b"alice".to_vec(), vec![], vec![0, 1, 2]]),
                RowFragment::new(2, RowOp::Delete, vec![]),
            ],
            join: JoinType::JoinColumn,
        }
    }

    #[test]
    fn test_block_encoding() {
        let block = sample();
        let bytes: Vec<u8> = (&block).try_into().unwrap();
        // header + txid + row 1 (13 + 3 * 4 + 8) + row 2 (13)
        assert_eq!(bytes.len(), BLOCK_HEADER_SIZE + 5 + 33 + 13);
        assert_eq!(&bytes[..8], &7u64.to_be_bytes());
        assert_eq!(BlockData::try_from(bytes.as_slice()).unwrap(), block);
    }

    #[test]
    fn test_checksum_mismatch() {
        let mut bytes: Vec<u8> = (&sample()).try_into().unwrap();
        bytes[20] ^= 0xff;
        assert!(matches!(
            BlockData::try_from(bytes.as_slice()),
            Err(Error::ChecksumMismatch)
        ));
    }

    #[test]
    fn test_truncated_block() {
        let bytes: Vec<u8> = (&sample()).try_into().unwrap();
        assert!(matches!(
            BlockData::try_from(&bytes[..10]),
            Err(Error::Corrupt(_))
        ));

        // a short body with a valid checksum still fails to decode
        let body = &bytes[..BLOCK_HEADER_SIZE];
        let mut forged = body.to_vec();
        forged.extend_from_slice(&checksum(body).to_be_bytes());
        let err = BlockData::try_from(forged.as_slice()).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Corrupt);
    }
}
