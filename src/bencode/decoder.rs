use super::BencodeError;
use super::BencodeResult;
use super::BencodeValue;

use std::collections::HashMap;

/// Decodes the first complete bencode value from `bytes`.
///
/// Returns the unconsumed remainder alongside the decoded value — the
/// decoder never reads past the end of the first value, so callers can
/// feed back the remainder (e.g. to parse a stream of concatenated
/// values, or to assert nothing but whitespace is left over).
///
/// # Errors
/// `NeedMoreBytes` on truncated input, `InvalidFormat`/`InvalidInteger`/
/// `DuplicateKey` on a syntax violation.
pub fn decode(bytes: &[u8]) -> BencodeResult<(&[u8], BencodeValue)> {
    let &first_byte = bytes.first().ok_or(BencodeError::NeedMoreBytes)?;
    match first_byte {
        b'0'..=b'9' => {
            let (rest, s) = decode_string(bytes)?;
            Ok((rest, BencodeValue::String(s)))
        }
        b'i' => {
            let (rest, i) = decode_integer(bytes)?;
            Ok((rest, BencodeValue::Integer(i)))
        }
        b'l' => {
            let (rest, list) = decode_list(bytes)?;
            Ok((rest, BencodeValue::List(list)))
        }
        b'd' => {
            let (rest, dict) = decode_dict(bytes)?;
            Ok((rest, BencodeValue::Dict(dict)))
        }
        other => Err(BencodeError::InvalidFormat(format!(
            "unexpected leading byte: {other:?}"
        ))),
    }
}

/// Decodes a bencode string `<len>:<bytes>`.
pub fn decode_string(bytes: &[u8]) -> BencodeResult<(&[u8], Vec<u8>)> {
    let colon = bytes
        .iter()
        .position(|&b| b == b':')
        .ok_or(BencodeError::NeedMoreBytes)?;

    let length_str =
        std::str::from_utf8(&bytes[..colon]).map_err(|_| BencodeError::InvalidStringLength)?;
    if length_str.is_empty() || (length_str.starts_with('0') && length_str != "0") {
        return Err(BencodeError::InvalidStringLength);
    }
    let length: usize = length_str
        .parse()
        .map_err(|_| BencodeError::InvalidStringLength)?;

    let start = colon + 1;
    let end = start + length;
    if end > bytes.len() {
        return Err(BencodeError::NeedMoreBytes);
    }
    Ok((&bytes[end..], bytes[start..end].to_vec()))
}

/// Decodes a bencode integer `i<signed-decimal>e`.
///
/// Rejects leading zeros (other than a bare `0`), `-0`, and an empty digit
/// run — the source this codec is modeled on is lax here; this decoder is
/// strict, per spec.
pub fn decode_integer(bytes: &[u8]) -> BencodeResult<(&[u8], i64)> {
    if bytes.first() != Some(&b'i') {
        return Err(BencodeError::InvalidFormat(
            "integer must start with 'i'".to_string(),
        ));
    }
    let end = bytes[1..]
        .iter()
        .position(|&b| b == b'e')
        .map(|p| p + 1)
        .ok_or(BencodeError::NeedMoreBytes)?;
    let digits = &bytes[1..end];
    let num_str = std::str::from_utf8(digits).map_err(|_| BencodeError::InvalidInteger)?;

    if num_str.is_empty() {
        return Err(BencodeError::InvalidInteger);
    }
    if num_str == "-0" {
        return Err(BencodeError::InvalidInteger);
    }
    let unsigned = num_str.strip_prefix('-').unwrap_or(num_str);
    if unsigned.len() > 1 && unsigned.starts_with('0') {
        return Err(BencodeError::InvalidInteger);
    }

    let value = num_str
        .parse::<i64>()
        .map_err(|_| BencodeError::InvalidInteger)?;
    Ok((&bytes[end + 1..], value))
}

/// Decodes a bencode list `l<value>*e`.
fn decode_list(bytes: &[u8]) -> BencodeResult<(&[u8], Vec<BencodeValue>)> {
    let mut rest = bytes
        .strip_prefix(b"l".as_slice())
        .ok_or_else(|| BencodeError::InvalidFormat("list must start with 'l'".to_string()))?;

    let mut items = Vec::new();
    loop {
        match rest.first() {
            None => return Err(BencodeError::NeedMoreBytes),
            Some(b'e') => {
                rest = &rest[1..];
                break;
            }
            Some(_) => {
                let (next_rest, value) = decode(rest)?;
                items.push(value);
                rest = next_rest;
            }
        }
    }
    Ok((rest, items))
}

/// Decodes a bencode dictionary `d(<string><value>)*e`.
///
/// Keys need not appear in sorted order on input (the encoder is what
/// enforces canonical ordering), but a key appearing twice is rejected.
fn decode_dict(bytes: &[u8]) -> BencodeResult<(&[u8], HashMap<Vec<u8>, BencodeValue>)> {
    let mut rest = bytes
        .strip_prefix(b"d".as_slice())
        .ok_or_else(|| BencodeError::InvalidFormat("dict must start with 'd'".to_string()))?;

    let mut dict = HashMap::new();
    loop {
        match rest.first() {
            None => return Err(BencodeError::NeedMoreBytes),
            Some(b'e') => {
                rest = &rest[1..];
                break;
            }
            Some(_) => {
                let (after_key, key) = decode_string(rest)?;
                let (after_value, value) = decode(after_key)?;
                if dict.insert(key.clone(), value).is_some() {
                    return Err(BencodeError::DuplicateKey(key));
                }
                rest = after_value;
            }
        }
    }
    Ok((rest, dict))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_string_basic() {
        let (rest, s) = decode_string(b"5:helloXYZ").unwrap();
        assert_eq!(s, b"hello");
        assert_eq!(rest, b"XYZ");
    }

    #[test]
    fn decode_integer_basic() {
        assert_eq!(decode_integer(b"i42e").unwrap().1, 42);
        assert_eq!(decode_integer(b"i-42e").unwrap().1, -42);
        assert_eq!(decode_integer(b"i0e").unwrap().1, 0);
    }

    #[test]
    fn decode_integer_rejects_leading_zero_and_negative_zero() {
        assert!(decode_integer(b"i03e").is_err());
        assert!(decode_integer(b"i-0e").is_err());
        assert!(decode_integer(b"ie").is_err());
    }

    #[test]
    fn decode_list_and_dict() {
        let (_, list) = decode_list(b"li42ei-1ee").unwrap();
        assert_eq!(
            list,
            vec![BencodeValue::Integer(42), BencodeValue::Integer(-1)]
        );

        let (_, dict) = decode_dict(b"d3:keyi42ee").unwrap();
        assert_eq!(
            dict.get(&b"key".to_vec()),
            Some(&BencodeValue::Integer(42))
        );
    }

    #[test]
    fn duplicate_dict_key_rejected() {
        let result = decode(b"d1:ai1e1:ai2ee");
        assert!(matches!(result, Err(BencodeError::DuplicateKey(_))));
    }

    #[test]
    fn truncated_input_needs_more_bytes() {
        assert!(matches!(decode(b"5:hel"), Err(BencodeError::NeedMoreBytes)));
        assert!(matches!(decode(b"i42"), Err(BencodeError::NeedMoreBytes)));
    }
}
