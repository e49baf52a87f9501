//! The BitTorrent peer handshake: a fixed 68-byte frame exchanged before
//! any length-prefixed messages, proving both peers are talking about the
//! same torrent.
use crate::error::TorrentError;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

const PROTOCOL: &[u8; 19] = b"BitTorrent protocol";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    pub info_hash: [u8; 20],
    pub peer_id: [u8; 20],
}

impl Handshake {
    pub fn new(info_hash: [u8; 20], peer_id: [u8; 20]) -> Self {
        Self { info_hash, peer_id }
    }

    /// Serializes to the 68-byte wire form:
    /// `19 | "BitTorrent protocol" | 8 zero bytes | info_hash | peer_id`.
    pub fn serialize(&self) -> [u8; 68] {
        let mut buf = [0u8; 68];
        buf[0] = 19;
        buf[1..20].copy_from_slice(PROTOCOL);
        // buf[20..28] stays zero (reserved)
        buf[28..48].copy_from_slice(&self.info_hash);
        buf[48..68].copy_from_slice(&self.peer_id);
        buf
    }

    pub async fn write<W: AsyncWrite + Unpin>(&self, stream: &mut W) -> Result<(), TorrentError> {
        stream
            .write_all(&self.serialize())
            .await
            .map_err(TorrentError::Io)
    }

    /// Reads and validates a handshake from the wire. Does not check the
    /// info-hash against an expected value; callers do that explicitly so
    /// the mismatch can be reported as `HandshakeMismatch` rather than a
    /// generic protocol error.
    pub async fn read<R: AsyncRead + Unpin>(stream: &mut R) -> Result<Self, TorrentError> {
        let mut pstrlen_buf = [0u8; 1];
        stream
            .read_exact(&mut pstrlen_buf)
            .await
            .map_err(TorrentError::Io)?;
        let pstrlen = pstrlen_buf[0] as usize;
        if pstrlen == 0 {
            return Err(TorrentError::ProtocolError(
                "handshake pstrlen cannot be 0".into(),
            ));
        }

        let mut rest = vec![0u8; 48 + pstrlen];
        stream.read_exact(&mut rest).await.map_err(TorrentError::Io)?;

        let mut info_hash = [0u8; 20];
        info_hash.copy_from_slice(&rest[pstrlen + 8..pstrlen + 8 + 20]);
        let mut peer_id = [0u8; 20];
        peer_id.copy_from_slice(&rest[pstrlen + 8 + 20..pstrlen + 8 + 40]);

        Ok(Self { info_hash, peer_id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn serialize_matches_fixed_layout() {
        let hs = Handshake::new([1u8; 20], [2u8; 20]);
        let buf = hs.serialize();
        assert_eq!(buf.len(), 68);
        assert_eq!(buf[0], 19);
        assert_eq!(&buf[1..20], PROTOCOL);
        assert_eq!(&buf[20..28], &[0u8; 8]);
        assert_eq!(&buf[28..48], &[1u8; 20]);
        assert_eq!(&buf[48..68], &[2u8; 20]);
    }

    #[tokio::test]
    async fn round_trips_through_write_read() {
        let hs = Handshake::new([7u8; 20], [9u8; 20]);
        let mut cursor = Cursor::new(hs.serialize().to_vec());
        let parsed = Handshake::read(&mut cursor).await.unwrap();
        assert_eq!(parsed, hs);
    }

    #[tokio::test]
    async fn rejects_zero_pstrlen() {
        let mut cursor = Cursor::new(vec![0u8; 68]);
        assert!(Handshake::read(&mut cursor).await.is_err());
    }
}
