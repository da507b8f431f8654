use super::BencodeValue;
use std::collections::HashMap;

/// Encodes `value` into `buf`, appending canonical bencode bytes.
///
/// Dictionary keys are always emitted in ascending lexicographic order,
/// regardless of the order they were inserted in — this is what makes
/// `info_hash` reproducible across a decode/re-encode round trip.
pub fn encode_into(buf: &mut Vec<u8>, value: &BencodeValue) {
    match value {
        BencodeValue::String(s) => encode_string(buf, s),
        BencodeValue::Integer(i) => encode_integer(buf, *i),
        BencodeValue::List(list) => encode_list(buf, list),
        BencodeValue::Dict(dict) => encode_dict(buf, dict),
    }
}

fn encode_string(buf: &mut Vec<u8>, s: &[u8]) {
    buf.extend_from_slice(s.len().to_string().as_bytes());
    buf.push(b':');
    buf.extend_from_slice(s);
}

fn encode_integer(buf: &mut Vec<u8>, i: i64) {
    buf.push(b'i');
    buf.extend_from_slice(i.to_string().as_bytes());
    buf.push(b'e');
}

fn encode_list(buf: &mut Vec<u8>, list: &[BencodeValue]) {
    buf.push(b'l');
    for item in list {
        encode_into(buf, item);
    }
    buf.push(b'e');
}

fn encode_dict(buf: &mut Vec<u8>, dict: &HashMap<Vec<u8>, BencodeValue>) {
    buf.push(b'd');
    let mut keys: Vec<&Vec<u8>> = dict.keys().collect();
    keys.sort_unstable();
    for key in keys {
        encode_string(buf, key);
        encode_into(buf, &dict[key]);
    }
    buf.push(b'e');
}
