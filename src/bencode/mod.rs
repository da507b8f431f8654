//! Bencode codec: the wire primitive shared by `.torrent` metainfo and
//! tracker responses.
//!
//! Bencode has four value kinds: signed integers, byte strings, lists, and
//! dictionaries keyed by byte strings. The encoder always emits canonical
//! form (sorted keys, shortest integer representation) regardless of how
//! the value was built, which is what makes `info_hash` computation
//! reproducible across a decode/re-encode round trip.
use std::collections::HashMap;
use thiserror::Error;

pub mod decoder;
pub mod encoder;

/// A decoded Bencode value.
///
/// - `String(Vec<u8>)`: a byte string, e.g. `4:spam` -> `String(b"spam")`
/// - `Integer(i64)`: e.g. `i42e` -> `Integer(42)`
/// - `List(Vec<BencodeValue>)`: e.g. `l4:spami42ee` -> `List([String(b"spam"), Integer(42)])`
/// - `Dict(HashMap<Vec<u8>, BencodeValue>)`: e.g. `d3:foo3:bare` -> `Dict({b"foo" => String(b"bar")})`
#[derive(Debug, PartialEq, Clone)]
pub enum BencodeValue {
    String(Vec<u8>),
    Integer(i64),
    List(Vec<BencodeValue>),
    Dict(HashMap<Vec<u8>, BencodeValue>),
}

impl BencodeValue {
    /// Pretty-prints a value the way the `decode` CLI subcommand does:
    /// dictionary keys sorted, strings quoted.
    pub fn to_display_string(&self) -> String {
        match self {
            BencodeValue::String(s) => format!("\"{}\"", String::from_utf8_lossy(s)),
            BencodeValue::Integer(i) => i.to_string(),
            BencodeValue::List(items) => {
                let parts: Vec<String> =
                    items.iter().map(BencodeValue::to_display_string).collect();
                format!("[{}]", parts.join(","))
            }
            BencodeValue::Dict(dict) => {
                let mut keys: Vec<&Vec<u8>> = dict.keys().collect();
                keys.sort_unstable();
                let parts: Vec<String> = keys
                    .into_iter()
                    .map(|k| {
                        format!(
                            "\"{}\":{}",
                            String::from_utf8_lossy(k),
                            dict[k].to_display_string()
                        )
                    })
                    .collect();
                format!("{{{}}}", parts.join(","))
            }
        }
    }
}

/// Errors raised by the bencode codec.
#[derive(Debug, Error)]
pub enum BencodeError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid bencode format: {0}")]
    InvalidFormat(String),

    #[error("invalid integer format")]
    InvalidInteger,

    #[error("invalid string length")]
    InvalidStringLength,

    #[error("need more bytes to complete this value")]
    NeedMoreBytes,

    #[error("unexpected end of input")]
    UnexpectedEoi,

    #[error("duplicate dictionary key: {0:?}")]
    DuplicateKey(Vec<u8>),

    #[error("dictionary keys must be strings")]
    DictKeyNotString,

    #[error("trailing bytes after a complete value ({0} byte(s) left)")]
    TrailingBytes(usize),
}

pub type BencodeResult<T> = std::result::Result<T, BencodeError>;

/// Decodes exactly one value from `bytes`, requiring the entire input be
/// consumed. Used by callers (the `decode` CLI command, metainfo parsing)
/// that hold a fully-buffered byte slice rather than a stream.
pub fn decode_all(bytes: &[u8]) -> BencodeResult<BencodeValue> {
    let (remainder, value) = decoder::decode(bytes)?;
    if !remainder.is_empty() {
        return Err(BencodeError::TrailingBytes(remainder.len()));
    }
    Ok(value)
}

/// Encodes a value into its canonical bencode byte representation.
pub fn encode(value: &BencodeValue) -> Vec<u8> {
    let mut buf = Vec::new();
    encoder::encode_into(&mut buf, value);
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_containers_and_zero() {
        assert_eq!(decode_all(b"le").unwrap(), BencodeValue::List(vec![]));
        assert_eq!(
            decode_all(b"de").unwrap(),
            BencodeValue::Dict(HashMap::new())
        );
        assert_eq!(decode_all(b"0:").unwrap(), BencodeValue::String(vec![]));
        assert_eq!(decode_all(b"i0e").unwrap(), BencodeValue::Integer(0));
        assert_eq!(decode_all(b"i-42e").unwrap(), BencodeValue::Integer(-42));
    }

    #[test]
    fn decode_example_dict() {
        let value = decode_all(b"d3:foo3:bar5:helloi52ee").unwrap();
        let mut expected = HashMap::new();
        expected.insert(b"foo".to_vec(), BencodeValue::String(b"bar".to_vec()));
        expected.insert(b"hello".to_vec(), BencodeValue::Integer(52));
        assert_eq!(value, BencodeValue::Dict(expected));
        assert_eq!(value.to_display_string(), "{\"foo\":\"bar\",\"hello\":52}");
    }

    #[test]
    fn trailing_bytes_rejected() {
        assert!(matches!(
            decode_all(b"i1eextra"),
            Err(BencodeError::TrailingBytes(_))
        ));
    }
}
