use std::collections::BTreeMap;
use std::ops::Range;

use bytes::Bytes;

use super::error::BencodeError;
use super::value::Value;

const MAX_DEPTH: usize = 64;

/// Decodes a single bencode value from a byte slice.
///
/// The input must contain exactly one complete value with no trailing data.
/// Use [`decode_prefix`] when reading from a stream that continues past the
/// value.
///
/// # Errors
///
/// Returns an error if the input is empty or truncated, contains invalid
/// syntax (including non-canonical integers and unordered dictionary keys),
/// nests deeper than 64 levels, or has bytes after the value.
///
/// # Examples
///
/// ```
/// use btmeta::bencode::decode;
///
/// let int = decode(b"i42e").unwrap();
/// assert_eq!(int.as_integer(), Some(42));
///
/// let dict = decode(b"d3:agei30e4:name5:Alicee").unwrap();
/// assert_eq!(dict.get(b"name").and_then(|v| v.as_str()), Some("Alice"));
/// ```
pub fn decode(data: &[u8]) -> Result<Value, BencodeError> {
    let (value, consumed) = decode_prefix(data)?;
    if consumed != data.len() {
        return Err(BencodeError::TrailingData(consumed));
    }
    Ok(value)
}

/// Decodes one bencode value from the front of a byte slice.
///
/// Returns the value and the number of bytes it occupied. Trailing data is
/// left for the caller, which makes this usable for streaming.
pub fn decode_prefix(data: &[u8]) -> Result<(Value, usize), BencodeError> {
    let mut pos = 0;
    let value = decode_value(data, &mut pos, 0)?;
    Ok((value, pos))
}

/// A decoded metainfo document.
///
/// Besides the root value, this records the byte span the top-level `info`
/// entry occupied in the input. Infohashes are defined over exactly those
/// bytes, so the parser must be able to hash the span it actually saw rather
/// than a re-encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    /// The decoded top-level value.
    pub root: Value,
    /// `[start, end)` of the `info` dictionary in the input, when the root
    /// is a dictionary containing that key.
    pub info_span: Option<Range<usize>>,
}

/// Decodes a top-level value while tracking the span of the `info` entry.
///
/// Behaves exactly like [`decode`] otherwise; inputs whose root is not a
/// dictionary simply yield `info_span: None`.
pub fn decode_document(data: &[u8]) -> Result<Document, BencodeError> {
    if data.first() != Some(&b'd') {
        let root = decode(data)?;
        return Ok(Document {
            root,
            info_span: None,
        });
    }

    let mut pos = 1;
    let mut dict = BTreeMap::new();
    let mut last_key: Option<Bytes> = None;
    let mut info_span = None;

    loop {
        if pos >= data.len() {
            return Err(BencodeError::UnexpectedEof(pos));
        }
        if data[pos] == b'e' {
            pos += 1;
            break;
        }

        let key = decode_key(data, &mut pos, &mut last_key)?;
        let start = pos;
        let value = decode_value(data, &mut pos, 1)?;
        if key.as_ref() == b"info" {
            info_span = Some(start..pos);
        }
        dict.insert(key, value);
    }

    if pos != data.len() {
        return Err(BencodeError::TrailingData(pos));
    }

    Ok(Document {
        root: Value::Dict(dict),
        info_span,
    })
}

fn decode_value(data: &[u8], pos: &mut usize, depth: usize) -> Result<Value, BencodeError> {
    if depth > MAX_DEPTH {
        return Err(BencodeError::NestingTooDeep);
    }

    match data.get(*pos) {
        None => Err(BencodeError::UnexpectedEof(*pos)),
        Some(b'i') => decode_integer(data, pos),
        Some(b'l') => decode_list(data, pos, depth),
        Some(b'd') => decode_dict(data, pos, depth),
        Some(b'0'..=b'9') => Ok(Value::Bytes(decode_bytes(data, pos)?)),
        Some(&byte) => Err(BencodeError::UnexpectedByte { offset: *pos, byte }),
    }
}

fn decode_integer(data: &[u8], pos: &mut usize) -> Result<Value, BencodeError> {
    let offset = *pos;
    *pos += 1;

    let start = *pos;
    while *pos < data.len() && data[*pos] != b'e' {
        *pos += 1;
    }
    if *pos >= data.len() {
        return Err(BencodeError::UnexpectedEof(*pos));
    }

    let digits = &data[start..*pos];
    let invalid = |reason| BencodeError::InvalidInteger { offset, reason };

    if digits.is_empty() {
        return Err(invalid("empty"));
    }
    if (digits.len() > 1 && digits[0] == b'0') || digits.starts_with(b"-0") {
        return Err(invalid("leading zero"));
    }

    let text = std::str::from_utf8(digits).map_err(|_| invalid("not a number"))?;
    let value: i64 = text
        .parse()
        .map_err(|_| invalid("not a number or out of range"))?;

    *pos += 1;
    Ok(Value::Integer(value))
}

fn decode_bytes(data: &[u8], pos: &mut usize) -> Result<Bytes, BencodeError> {
    let offset = *pos;

    let start = *pos;
    while *pos < data.len() && data[*pos].is_ascii_digit() {
        *pos += 1;
    }
    if *pos >= data.len() {
        return Err(BencodeError::UnexpectedEof(*pos));
    }
    if data[*pos] != b':' {
        return Err(BencodeError::UnexpectedByte {
            offset: *pos,
            byte: data[*pos],
        });
    }

    let digits = &data[start..*pos];
    if digits.is_empty() || (digits.len() > 1 && digits[0] == b'0') {
        return Err(BencodeError::InvalidLength(offset));
    }

    let text = std::str::from_utf8(digits).map_err(|_| BencodeError::InvalidLength(offset))?;
    let len: usize = text
        .parse()
        .map_err(|_| BencodeError::InvalidLength(offset))?;

    *pos += 1;
    if len > data.len() - *pos {
        return Err(BencodeError::UnexpectedEof(data.len()));
    }

    let bytes = Bytes::copy_from_slice(&data[*pos..*pos + len]);
    *pos += len;
    Ok(bytes)
}

fn decode_list(data: &[u8], pos: &mut usize, depth: usize) -> Result<Value, BencodeError> {
    *pos += 1;
    let mut list = Vec::new();

    while *pos < data.len() && data[*pos] != b'e' {
        list.push(decode_value(data, pos, depth + 1)?);
    }
    if *pos >= data.len() {
        return Err(BencodeError::UnexpectedEof(*pos));
    }

    *pos += 1;
    Ok(Value::List(list))
}

fn decode_dict(data: &[u8], pos: &mut usize, depth: usize) -> Result<Value, BencodeError> {
    *pos += 1;
    let mut dict = BTreeMap::new();
    let mut last_key: Option<Bytes> = None;

    while *pos < data.len() && data[*pos] != b'e' {
        let key = decode_key(data, pos, &mut last_key)?;
        let value = decode_value(data, pos, depth + 1)?;
        dict.insert(key, value);
    }
    if *pos >= data.len() {
        return Err(BencodeError::UnexpectedEof(*pos));
    }

    *pos += 1;
    Ok(Value::Dict(dict))
}

fn decode_key(
    data: &[u8],
    pos: &mut usize,
    last_key: &mut Option<Bytes>,
) -> Result<Bytes, BencodeError> {
    let offset = *pos;
    if !data.get(*pos).is_some_and(u8::is_ascii_digit) {
        return Err(BencodeError::NonStringKey(offset));
    }

    let key = decode_bytes(data, pos)?;
    if let Some(prev) = last_key {
        match prev.as_ref().cmp(key.as_ref()) {
            std::cmp::Ordering::Less => {}
            std::cmp::Ordering::Equal => return Err(BencodeError::DuplicateKey(offset)),
            std::cmp::Ordering::Greater => return Err(BencodeError::NonAscendingKey(offset)),
        }
    }
    *last_key = Some(key.clone());
    Ok(key)
}
