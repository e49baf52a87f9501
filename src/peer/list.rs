//! Compact peer list codec: 6-byte records, 4-byte IPv4 + 2-byte
//! big-endian port, as returned by trackers when `compact=1`.
use crate::error::TorrentError;
use std::net::{Ipv4Addr, SocketAddrV4};

pub fn parse_compact_peers(bytes: &[u8]) -> Result<Vec<SocketAddrV4>, TorrentError> {
    if bytes.len() % 6 != 0 {
        return Err(TorrentError::FormatError(format!(
            "compact peers length {} is not a multiple of 6",
            bytes.len()
        )));
    }
    Ok(bytes
        .chunks_exact(6)
        .map(|chunk| {
            let ip = Ipv4Addr::new(chunk[0], chunk[1], chunk[2], chunk[3]);
            let port = u16::from_be_bytes([chunk[4], chunk[5]]);
            SocketAddrV4::new(ip, port)
        })
        .collect())
}
