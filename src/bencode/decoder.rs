//! Bencode decoding.
//!
//! Grammar: integers `i<decimal>e`, byte strings `<len>:<bytes>`, lists
//! `l...e`, dictionaries `d<string-key><value>...e`. Dictionary keys are
//! not required to already be sorted on the wire (real-world metainfo
//! files aren't always), but `encoder::encode` always re-sorts them so
//! that re-encoding a decoded dictionary is deterministic.
use super::{BencodeError, BencodeResult, BencodeValue};
use std::collections::HashMap;
use std::io::{self, Read};
use tracing::instrument;

/// Decodes a single bencode value from the start of `reader`.
#[instrument(skip(reader), level = "trace")]
pub fn decode<R: Read>(reader: &mut std::iter::Peekable<io::Bytes<R>>) -> BencodeResult<BencodeValue> {
    let &first_byte = reader
        .peek()
        .ok_or(BencodeError::UnexpectedEof)?
        .as_ref()
        .map_err(|e| BencodeError::Io(clone_io_error(e)))?;

    match first_byte {
        b'0'..=b'9' => decode_string(reader).map(BencodeValue::String),
        b'i' => decode_integer(reader).map(BencodeValue::Integer),
        b'l' => decode_list(reader).map(BencodeValue::List),
        b'd' => decode_dict(reader).map(BencodeValue::Dict),
        other => Err(BencodeError::InvalidFormat(format!(
            "unexpected character: {}",
            other as char
        ))),
    }
}

/// Decodes a full bencode value from a byte slice, requiring the whole
/// slice to be consumed (metainfo files and tracker responses are a
/// single top-level value, not a stream of them).
pub fn decode_bytes(bytes: &[u8]) -> BencodeResult<BencodeValue> {
    let mut reader = bytes.bytes().peekable();
    decode(&mut reader)
}

fn clone_io_error(e: &io::Error) -> io::Error {
    io::Error::from(e.kind())
}

fn next_byte<R: Read>(reader: &mut std::iter::Peekable<io::Bytes<R>>) -> BencodeResult<u8> {
    reader
        .next()
        .ok_or(BencodeError::UnexpectedEof)?
        .map_err(BencodeError::Io)
}

fn peek_byte<R: Read>(reader: &mut std::iter::Peekable<io::Bytes<R>>) -> BencodeResult<u8> {
    reader
        .peek()
        .ok_or(BencodeError::UnexpectedEof)?
        .as_ref()
        .map(|b| *b)
        .map_err(|e| BencodeError::Io(clone_io_error(e)))
}

/// Reads raw bytes up to (and consuming) `delimiter`, interpreting them as
/// ASCII. Used for the `<len>:` and `i<num>e` prefixes.
fn read_until<R: Read>(
    reader: &mut std::iter::Peekable<io::Bytes<R>>,
    delimiter: u8,
) -> BencodeResult<String> {
    let mut buffer = Vec::new();
    loop {
        let current = peek_byte(reader)?;
        if current == delimiter {
            next_byte(reader)?;
            break;
        }
        buffer.push(next_byte(reader)?);
    }
    String::from_utf8(buffer)
        .map_err(|e| BencodeError::InvalidFormat(format!("non-UTF8 prefix: {e}")))
}

#[instrument(skip(reader), level = "trace")]
pub fn decode_string<R: Read>(
    reader: &mut std::iter::Peekable<io::Bytes<R>>,
) -> BencodeResult<Vec<u8>> {
    let length_str = read_until(reader, b':')?;
    let length = length_str
        .parse::<usize>()
        .map_err(|_| BencodeError::InvalidStringLength)?;

    let mut bytes = vec![0u8; length];
    for slot in bytes.iter_mut() {
        *slot = next_byte(reader)?;
    }
    Ok(bytes)
}

#[instrument(skip(reader), level = "trace")]
pub fn decode_integer<R: Read>(
    reader: &mut std::iter::Peekable<io::Bytes<R>>,
) -> BencodeResult<i64> {
    let marker = next_byte(reader)?;
    if marker != b'i' {
        return Err(BencodeError::InvalidFormat(
            "integer must start with 'i'".into(),
        ));
    }

    let num_str = read_until(reader, b'e')?;
    if num_str.is_empty() {
        return Err(BencodeError::InvalidInteger);
    }
    if num_str == "-0" {
        return Err(BencodeError::InvalidInteger);
    }
    if num_str.len() > 1 && num_str.starts_with('0') {
        return Err(BencodeError::InvalidInteger);
    }
    if num_str.len() > 2 && num_str.starts_with("-0") {
        return Err(BencodeError::InvalidInteger);
    }

    num_str.parse::<i64>().map_err(|_| BencodeError::InvalidInteger)
}

fn decode_list<R: Read>(
    reader: &mut std::iter::Peekable<io::Bytes<R>>,
) -> BencodeResult<Vec<BencodeValue>> {
    let marker = next_byte(reader)?;
    if marker != b'l' {
        return Err(BencodeError::InvalidFormat("list must start with 'l'".into()));
    }

    let mut list = Vec::new();
    loop {
        if peek_byte(reader)? == b'e' {
            next_byte(reader)?;
            break;
        }
        list.push(decode(reader)?);
    }
    Ok(list)
}

fn decode_dict<R: Read>(
    reader: &mut std::iter::Peekable<io::Bytes<R>>,
) -> BencodeResult<HashMap<Vec<u8>, BencodeValue>> {
    let marker = next_byte(reader)?;
    if marker != b'd' {
        return Err(BencodeError::InvalidFormat(
            "dictionary must start with 'd'".into(),
        ));
    }

    let mut dict = HashMap::new();
    loop {
        if peek_byte(reader)? == b'e' {
            next_byte(reader)?;
            break;
        }
        let key = decode_string(reader)?;
        let value = decode(reader)?;
        dict.insert(key, value);
    }
    Ok(dict)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(input: &[u8]) -> BencodeValue {
        decode_bytes(input).expect("decode should succeed")
    }

    #[test]
    fn decodes_string() {
        assert_eq!(decode_all(b"5:hello"), BencodeValue::String(b"hello".to_vec()));
    }

    #[test]
    fn decodes_integer() {
        assert_eq!(decode_all(b"i42e"), BencodeValue::Integer(42));
        assert_eq!(decode_all(b"i-42e"), BencodeValue::Integer(-42));
        assert_eq!(decode_all(b"i0e"), BencodeValue::Integer(0));
    }

    #[test]
    fn rejects_leading_zero_integer() {
        assert!(decode_bytes(b"i042e").is_err());
        assert!(decode_bytes(b"i-0e").is_err());
    }

    #[test]
    fn decodes_list() {
        assert_eq!(
            decode_all(b"li42e5:helloe"),
            BencodeValue::List(vec![
                BencodeValue::Integer(42),
                BencodeValue::String(b"hello".to_vec()),
            ])
        );
    }

    #[test]
    fn decodes_dict() {
        let value = decode_all(b"d3:fooi1e3:bar4:spame");
        let dict = value.as_dict().unwrap();
        assert_eq!(dict.get(&b"foo".to_vec()), Some(&BencodeValue::Integer(1)));
        assert_eq!(
            dict.get(&b"bar".to_vec()),
            Some(&BencodeValue::String(b"spam".to_vec()))
        );
    }

    #[test]
    fn truncated_input_is_an_error() {
        assert!(decode_bytes(b"5:hel").is_err());
        assert!(decode_bytes(b"i42").is_err());
    }
}
