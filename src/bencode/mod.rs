//! Bencode value model and error type.
//!
//! Bencode is the encoding BitTorrent metainfo files and tracker responses
//! use. This is a hand-rolled decoder/encoder (rather than `serde_bencode`)
//! because computing the info-hash requires re-encoding the info
//! dictionary byte-exactly as parsed, which a fixed-shape `serde` struct
//! cannot guarantee for dictionaries with unknown or reordered keys.
use std::collections::HashMap;
use thiserror::Error;

pub mod decoder;
pub mod encoder;

/// A decoded bencode value.
///
/// - `String(Vec<u8>)`: a byte string, e.g. `4:spam` -> `String(b"spam")`
/// - `Integer(i64)`: e.g. `i42e` -> `Integer(42)`
/// - `List(Vec<BencodeValue>)`: e.g. `li42e4:spame` -> `List([Integer(42), String(b"spam")])`
/// - `Dict(HashMap<Vec<u8>, BencodeValue>)`: e.g. `d3:foo3:bare` -> `Dict({b"foo": String(b"bar")})`
#[derive(Debug, PartialEq, Clone)]
pub enum BencodeValue {
    String(Vec<u8>),
    Integer(i64),
    List(Vec<BencodeValue>),
    Dict(HashMap<Vec<u8>, BencodeValue>),
}

impl BencodeValue {
    pub fn as_dict(&self) -> Option<&HashMap<Vec<u8>, BencodeValue>> {
        match self {
            BencodeValue::Dict(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            BencodeValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            BencodeValue::String(s) => Some(s),
            _ => None,
        }
    }
}

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

    #[error("unexpected end of input")]
    UnexpectedEof,

    #[error("dictionary keys must be strings")]
    DictKeyNotString,
}

pub type BencodeResult<T> = std::result::Result<T, BencodeError>;
