//! Formats raw keys and values for diagnostics and log fields.

use itertools::Itertools as _;

use super::keycode;

/// Formats encoded keys and values.
pub trait Formatter {
    /// Formats a key.
    fn key(key: &[u8]) -> String;

    /// Formats a value. Also takes the key to determine the kind of value.
    fn value(key: &[u8], value: &[u8]) -> String;

    /// Formats a key/value pair.
    fn key_value(key: &[u8], value: &[u8]) -> String {
        Self::key_maybe_value(key, Some(value))
    }

    /// Formats a key/value pair, where the value may not exist.
    fn key_maybe_value(key: &[u8], value: Option<&[u8]>) -> String {
        let fmtkey = Self::key(key);
        let fmtvalue = value.map_or("None".to_string(), |v| Self::value(key, v));
        format!("{fmtkey} → {fmtvalue}")
    }
}

/// Formats raw byte slices without any decoding.
pub struct Raw;

impl Raw {
    /// Formats raw bytes as escaped ASCII strings.
    pub fn bytes(bytes: &[u8]) -> String {
        let escaped = bytes
            .iter()
            .copied()
            .flat_map(std::ascii::escape_default)
            .collect_vec();
        format!("\"{}\"", String::from_utf8_lossy(&escaped))
    }
}

impl Formatter for Raw {
    fn key(key: &[u8]) -> String {
        Self::bytes(key)
    }

    fn value(_key: &[u8], value: &[u8]) -> String {
        Self::bytes(value)
    }
}

/// Formats composite store keys as `type(part, part, ...)`.
pub struct Composite;

impl Formatter for Composite {
    fn key(key: &[u8]) -> String {
        let Ok((object_type, parts)) = keycode::decode_composite(key) else {
            return Raw::key(key); // not a composite key
        };
        format!(
            "{}({})",
            object_type,
            parts.iter().map(|p| Raw::bytes(p)).join(", ")
        )
    }

    fn value(_key: &[u8], value: &[u8]) -> String {
        Raw::bytes(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_escapes() {
        assert_eq!(Raw::bytes(b"ab\x00"), "\"ab\\x00\"");
    }

    #[test]
    fn test_composite_key() {
        let key = keycode::encode_composite("node", &[b"users", b"id"]);
        assert_eq!(Composite::key(&key), "node(\"users\", \"id\")");
        assert_eq!(
            Composite::key_value(&key, b"v"),
            "node(\"users\", \"id\") → \"v\""
        );
    }

    #[test]
    fn test_non_composite_falls_back() {
        assert_eq!(Composite::key(b"plain"), "\"plain\"");
    }
}
