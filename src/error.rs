//! Crate-wide error types.
//!
//! Mirrors the error-kind taxonomy of the BitTorrent core: malformed data
//! (`FormatError`), transport failures (`NetworkError`), wire-protocol
//! violations (`ProtocolError`), and the two outcomes that are handled
//! specially by their callers rather than being fatal to the whole run
//! (`HandshakeMismatch`, `IntegrityError`).
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TorrentError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("bencode decoding error: {0}")]
    Bencode(#[from] crate::bencode::BencodeError),

    #[error("malformed metainfo: {0}")]
    FormatError(String),

    #[error("missing or invalid field: {0}")]
    MissingField(String),

    #[error("network error: {0}")]
    NetworkError(String),

    #[error("protocol error: {0}")]
    ProtocolError(String),

    #[error("handshake info-hash mismatch")]
    HandshakeMismatch,

    #[error("piece integrity check failed")]
    IntegrityError,

    #[error("HTTP request error: {0}")]
    HttpRequest(#[from] reqwest::Error),

    #[error("tracker response decoding error: {0}")]
    TrackerDecode(#[from] serde_bencode::Error),

    #[error("URL parsing error: {0}")]
    UrlParse(#[from] url::ParseError),
}

pub type TorrentResult<T> = std::result::Result<T, TorrentError>;
