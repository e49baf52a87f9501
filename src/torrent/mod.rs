//! Metainfo parsing: bencode decode, info-hash computation, piece-hash
//! split. Single-file torrents only (multi-file `files` layout is out of
//! scope, see spec.md §1).
use crate::bencode::{decoder, encoder, BencodeValue};
use crate::error::TorrentError;
use sha1::{Digest, Sha1};

/// Parsed metainfo file, plus the values derived from it that the rest of
/// the crate depends on bit-exactly: `info_hash` and `pieces_hash`.
#[derive(Debug, Clone, PartialEq)]
pub struct TorrentFile {
    pub announce: String,
    pub name: String,
    pub piece_length: i64,
    pub length: i64,
    pub info_hash: [u8; 20],
    pub pieces_hash: Vec<[u8; 20]>,
}

impl TorrentFile {
    pub fn num_pieces(&self) -> usize {
        self.pieces_hash.len()
    }

    /// `min(piece_length, length - index*piece_length)`: every piece
    /// except possibly the last is exactly `piece_length`, the last is
    /// whatever remains. (A naive `length / num_pieces` division, seen in
    /// some historical clients, is wrong whenever `length` doesn't divide
    /// evenly — see spec.md §9.)
    pub fn piece_size(&self, index: usize) -> i64 {
        if index >= self.num_pieces() {
            return 0;
        }
        let offset = index as i64 * self.piece_length;
        std::cmp::min(self.piece_length, self.length - offset)
    }

    pub fn piece_offset(&self, index: usize) -> i64 {
        index as i64 * self.piece_length
    }

    /// Parses a metainfo byte stream into a `TorrentFile`.
    #[tracing::instrument(skip(data), level = "debug")]
    pub fn parse(data: &[u8]) -> Result<Self, TorrentError> {
        let root = decoder::decode_bytes(data)?;
        let root = root
            .as_dict()
            .ok_or_else(|| TorrentError::FormatError("metainfo root is not a dictionary".into()))?;

        let announce = root
            .get(&b"announce".to_vec())
            .and_then(BencodeValue::as_bytes)
            .ok_or_else(|| TorrentError::MissingField("announce".into()))?;
        let announce = String::from_utf8(announce.to_vec())
            .map_err(|e| TorrentError::FormatError(format!("announce is not UTF-8: {e}")))?;

        let info_value = root
            .get(&b"info".to_vec())
            .ok_or_else(|| TorrentError::MissingField("info".into()))?;
        let info = info_value
            .as_dict()
            .ok_or_else(|| TorrentError::FormatError("info is not a dictionary".into()))?;

        let piece_length = info
            .get(&b"piece length".to_vec())
            .and_then(BencodeValue::as_integer)
            .ok_or_else(|| TorrentError::MissingField("piece length".into()))?;
        if piece_length <= 0 {
            return Err(TorrentError::FormatError(
                "piece length must be positive".into(),
            ));
        }

        let pieces = info
            .get(&b"pieces".to_vec())
            .and_then(BencodeValue::as_bytes)
            .ok_or_else(|| TorrentError::MissingField("pieces".into()))?;
        let pieces_hash = split_piece_hashes(pieces)?;

        let name = info
            .get(&b"name".to_vec())
            .and_then(BencodeValue::as_bytes)
            .ok_or_else(|| TorrentError::MissingField("name".into()))?;
        let name = String::from_utf8(name.to_vec())
            .map_err(|e| TorrentError::FormatError(format!("name is not UTF-8: {e}")))?;

        let length = info
            .get(&b"length".to_vec())
            .and_then(BencodeValue::as_integer)
            .ok_or_else(|| TorrentError::MissingField("length".into()))?;
        if length <= 0 {
            return Err(TorrentError::FormatError("length must be positive".into()));
        }

        let expected_pieces = ((length + piece_length - 1) / piece_length) as usize;
        if expected_pieces != pieces_hash.len() {
            return Err(TorrentError::FormatError(format!(
                "expected {expected_pieces} pieces for length {length} at piece length \
                 {piece_length}, got {}",
                pieces_hash.len()
            )));
        }

        let info_hash = compute_info_hash(info_value)?;

        Ok(TorrentFile {
            announce,
            name,
            piece_length,
            length,
            info_hash,
            pieces_hash,
        })
    }
}

/// SHA-1 of the bencoded re-encoding of the info dictionary exactly as
/// parsed. `encoder::encode` always canonicalizes key order, so this is
/// stable regardless of the order the source file wrote its keys in.
fn compute_info_hash(info: &BencodeValue) -> Result<[u8; 20], TorrentError> {
    let encoded = encoder::encode_to_vec(info)?;
    let mut hasher = Sha1::new();
    hasher.update(&encoded);
    Ok(hasher.finalize().into())
}

fn split_piece_hashes(pieces: &[u8]) -> Result<Vec<[u8; 20]>, TorrentError> {
    if pieces.len() % 20 != 0 {
        return Err(TorrentError::FormatError(
            "pieces length is not a multiple of 20".into(),
        ));
    }
    Ok(pieces
        .chunks_exact(20)
        .map(|chunk| {
            let mut hash = [0u8; 20];
            hash.copy_from_slice(chunk);
            hash
        })
        .collect())
}
