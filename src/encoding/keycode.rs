//! Order-preserving key encoding.
//!
//! Composite keys are an object type followed by any number of byte parts.
//! Every segment is self-terminating, so the encoding of a leading subset of
//! parts is a strict prefix of every key that extends it. That is what makes
//! prefix scans over `(table)` or `(table, column)` work.
//!
//! ```text
//! 0x04 object-type 0x00 | 0x05 part-0 0x00 0x00 | 0x05 part-1 0x00 0x00 | ...
//! ```
//!
//! Inside a part, `0x00` is escaped as `0x00 0xFF`, which keeps byte order:
//! the terminator `0x00 0x00` sorts before any escaped or regular byte.

use super::{EncodingError, Key};
use crate::error::Result;

// Type prefixes for order-preserving encoding
const TYPE_STRING: u8 = 0x04;
const TYPE_BYTES: u8 = 0x05;

/// Encode a string with order preservation. The string must not contain NUL.
pub fn encode_string(s: &str) -> Vec<u8> {
    let mut result = Vec::with_capacity(s.len() + 2);
    result.push(TYPE_STRING);
    result.extend_from_slice(s.as_bytes());
    result.push(0x00);
    result
}

/// Decode a string, returning it and the number of bytes consumed.
fn take_string(bytes: &[u8]) -> Result<(String, usize)> {
    match bytes.first() {
        None => return Err(EncodingError::TruncatedData.into()),
        Some(&TYPE_STRING) => {}
        Some(_) => {
            return Err(EncodingError::InvalidFormat("Not a string type".to_string()).into())
        }
    }
    let end = bytes[1..]
        .iter()
        .position(|b| *b == 0x00)
        .ok_or(EncodingError::TruncatedData)?;
    let s = std::str::from_utf8(&bytes[1..1 + end]).map_err(|_| EncodingError::InvalidUtf8)?;
    Ok((s.to_string(), end + 2))
}

/// Decode a string from bytes
pub fn decode_string(bytes: &[u8]) -> Result<String> {
    let (s, consumed) = take_string(bytes)?;
    if consumed != bytes.len() {
        return Err(EncodingError::InvalidFormat("Trailing bytes after string".to_string()).into());
    }
    Ok(s)
}

/// Encode raw bytes with order preservation
pub fn encode_bytes(bytes: &[u8]) -> Vec<u8> {
    let mut result = Vec::with_capacity(bytes.len() + 3);
    write_bytes(&mut result, bytes);
    result
}

fn write_bytes(out: &mut Vec<u8>, bytes: &[u8]) {
    out.push(TYPE_BYTES);
    for &byte in bytes {
        if byte == 0x00 {
            out.extend_from_slice(&[0x00, 0xFF]);
        } else {
            out.push(byte);
        }
    }
    out.extend_from_slice(&[0x00, 0x00]);
}

/// Decode escaped bytes, returning them and the number of bytes consumed.
fn take_bytes(bytes: &[u8]) -> Result<(Vec<u8>, usize)> {
    match bytes.first() {
        None => return Err(EncodingError::TruncatedData.into()),
        Some(&TYPE_BYTES) => {}
        Some(_) => {
            return Err(EncodingError::InvalidFormat("Not a bytes type".to_string()).into())
        }
    }

    let mut result = Vec::new();
    let mut i = 1;
    loop {
        match bytes.get(i) {
            None => return Err(EncodingError::TruncatedData.into()),
            Some(0x00) => match bytes.get(i + 1) {
                Some(0xFF) => {
                    result.push(0x00);
                    i += 2;
                }
                Some(0x00) => return Ok((result, i + 2)),
                Some(_) => {
                    return Err(EncodingError::InvalidFormat(
                        "Invalid null byte escape".to_string(),
                    )
                    .into())
                }
                None => return Err(EncodingError::TruncatedData.into()),
            },
            Some(&b) => {
                result.push(b);
                i += 1;
            }
        }
    }
}

/// Decode raw bytes from encoded form
pub fn decode_bytes(bytes: &[u8]) -> Result<Vec<u8>> {
    let (result, consumed) = take_bytes(bytes)?;
    if consumed != bytes.len() {
        return Err(EncodingError::InvalidFormat("Trailing bytes after part".to_string()).into());
    }
    Ok(result)
}

/// Builds a composite key from an object type and its attribute parts.
pub fn encode_composite(object_type: &str, parts: &[&[u8]]) -> Vec<u8> {
    let capacity = object_type.len() + 2 + parts.iter().map(|p| p.len() + 3).sum::<usize>();
    let mut key = Vec::with_capacity(capacity);
    key.extend_from_slice(&encode_string(object_type));
    for part in parts {
        write_bytes(&mut key, part);
    }
    key
}

/// Splits a composite key back into its object type and parts.
pub fn decode_composite(key: &[u8]) -> Result<(String, Vec<Vec<u8>>)> {
    let (object_type, mut offset) = take_string(key)?;
    let mut parts = Vec::new();
    while offset < key.len() {
        let (part, consumed) = take_bytes(&key[offset..])?;
        parts.push(part);
        offset += consumed;
    }
    Ok((object_type, parts))
}

impl Key for String {
    fn encode(&self) -> Vec<u8> {
        encode_string(self)
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        decode_string(bytes)
    }
}

impl Key for Vec<u8> {
    fn encode(&self) -> Vec<u8> {
        encode_bytes(self)
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        decode_bytes(bytes)
    }
}

// Fixed-width big-endian, so byte order equals numeric order.
impl Key for u64 {
    fn encode(&self) -> Vec<u8> {
        self.to_be_bytes().to_vec()
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        let buf: [u8; 8] = bytes.try_into().map_err(|_| {
            EncodingError::InvalidFormat(format!("u64 key must be 8 bytes, got {}", bytes.len()))
        })?;
        Ok(u64::from_be_bytes(buf))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bytes_encoding() {
        let test_cases = vec![
            vec![],
            vec![0x01, 0x02, 0x03],
            vec![0x00],
            vec![0x00, 0xFF],
            vec![0xFF, 0x00],
        ];

        for original in test_cases {
            let encoded = original.encode();
            let decoded = Vec::<u8>::decode(&encoded).unwrap();
            assert_eq!(original, decoded);
        }
    }

    #[test]
    fn test_bytes_ordering() {
        let values: Vec<Vec<u8>> = vec![
            vec![],
            vec![0x00],
            vec![0x00, 0x00],
            vec![0x00, 0x01],
            vec![0x01],
            vec![0xFF],
        ];
        let encoded: Vec<_> = values.iter().map(|v| v.encode()).collect();
        for i in 1..encoded.len() {
            assert!(encoded[i - 1] < encoded[i], "{:?} !< {:?}", values[i - 1], values[i]);
        }
    }

    #[test]
    fn test_composite_round_trip() {
        let key = encode_composite("node", &[b"users", b"email", &7u32.to_be_bytes()]);
        let (object_type, parts) = decode_composite(&key).unwrap();
        assert_eq!(object_type, "node");
        assert_eq!(
            parts,
            vec![b"users".to_vec(), b"email".to_vec(), vec![0, 0, 0, 7]]
        );
    }

    #[test]
    fn test_composite_prefix() {
        let prefix = encode_composite("block", &[b"users"]);
        let full = encode_composite("block", &[b"users", &1u64.to_be_bytes()]);
        let other = encode_composite("block", &[b"users2", &1u64.to_be_bytes()]);
        assert!(full.starts_with(&prefix));
        assert!(!other.starts_with(&prefix));
    }

    #[test]
    fn test_composite_ordering_follows_parts() {
        let a = encode_composite("block", &[b"t", &1u64.to_be_bytes()]);
        let b = encode_composite("block", &[b"t", &2u64.to_be_bytes()]);
        let c = encode_composite("block", &[b"t", &256u64.to_be_bytes()]);
        assert!(a < b && b < c);
    }

    #[test]
    fn test_truncated_composite() {
        let key = encode_composite("head", &[b"users"]);
        assert!(decode_composite(&key[..key.len() - 1]).is_err());
        assert!(decode_composite(&[]).is_err());
    }

    #[test]
    fn test_u64_key() {
        assert!(1u64.encode() < 2u64.encode());
        assert!(255u64.encode() < 256u64.encode());
        assert_eq!(u64::decode(&42u64.encode()).unwrap(), 42);
        assert!(u64::decode(&[1, 2]).is_err());
    }
}
