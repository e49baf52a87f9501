//! Peer-wire message framing: `<4-byte length prefix><1-byte id><payload>`.
//!
//! A length prefix of zero is a keep-alive and carries no id/payload; it
//! decodes to the explicit `Frame::KeepAlive` variant here rather than a
//! bare sentinel, so callers can still observe and log it.
use crate::error::TorrentError;
use byteorder::{BigEndian, ByteOrder};
use std::fmt;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

pub const MAX_BLOCK: usize = 1 << 14;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageId {
    Choke = 0,
    Unchoke = 1,
    Interested = 2,
    NotInterested = 3,
    Have = 4,
    Bitfield = 5,
    Request = 6,
    Piece = 7,
    Cancel = 8,
    Port = 9,
    /// Any id outside 0-9. Tolerated on read, ignored by dispatch.
    Unknown(u8),
}

impl MessageId {
    fn from_u8(id: u8) -> Self {
        use MessageId::*;
        match id {
            0 => Choke,
            1 => Unchoke,
            2 => Interested,
            3 => NotInterested,
            4 => Have,
            5 => Bitfield,
            6 => Request,
            7 => Piece,
            8 => Cancel,
            9 => Port,
            other => Unknown(other),
        }
    }

    fn to_u8(self) -> u8 {
        use MessageId::*;
        match self {
            Choke => 0,
            Unchoke => 1,
            Interested => 2,
            NotInterested => 3,
            Have => 4,
            Bitfield => 5,
            Request => 6,
            Piece => 7,
            Cancel => 8,
            Port => 9,
            Unknown(id) => id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: MessageId,
    pub payload: Vec<u8>,
}

/// A framed peer-wire value: either a real message or a keep-alive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    KeepAlive,
    Message(Message),
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Frame::KeepAlive => write!(f, "KeepAlive"),
            Frame::Message(m) => {
                let name = match m.id {
                    MessageId::Choke => "Choke",
                    MessageId::Unchoke => "Unchoke",
                    MessageId::Interested => "Interested",
                    MessageId::NotInterested => "NotInterested",
                    MessageId::Have => "Have",
                    MessageId::Bitfield => "Bitfield",
                    MessageId::Request => "Request",
                    MessageId::Piece => "Piece",
                    MessageId::Cancel => "Cancel",
                    MessageId::Port => "Port",
                    MessageId::Unknown(id) => return write!(f, "Unknown#{id}\t[{:02x?}]", m.payload),
                };
                write!(f, "{name}\t[")?;
                for (i, b) in m.payload.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{b:02x}")?;
                }
                write!(f, "]")
            }
        }
    }
}

/// Serializes a message (or keep-alive) into its on-wire form.
pub fn encode(frame: &Frame) -> Vec<u8> {
    match frame {
        Frame::KeepAlive => vec![0, 0, 0, 0],
        Frame::Message(m) => {
            let length = (m.payload.len() + 1) as u32;
            let mut buf = Vec::with_capacity(4 + length as usize);
            buf.extend_from_slice(&length.to_be_bytes());
            buf.push(m.id.to_u8());
            buf.extend_from_slice(&m.payload);
            buf
        }
    }
}

/// Reads exactly one framed value from an async byte stream.
///
/// A length prefix of 0 decodes to `Frame::KeepAlive`. Unknown message
/// ids are tolerated: they decode to `MessageId::Unknown(id)` rather than
/// erroring, so a caller's dispatch can log and ignore them per the wire
/// protocol's forward-compatibility rule.
pub async fn read<R: AsyncRead + Unpin>(stream: &mut R) -> Result<Frame, TorrentError> {
    let mut length_buf = [0u8; 4];
    stream
        .read_exact(&mut length_buf)
        .await
        .map_err(TorrentError::Io)?;
    let length = BigEndian::read_u32(&length_buf);

    if length == 0 {
        return Ok(Frame::KeepAlive);
    }

    let mut body = vec![0u8; length as usize];
    stream.read_exact(&mut body).await.map_err(TorrentError::Io)?;

    let id = MessageId::from_u8(body[0]);
    if let MessageId::Unknown(raw) = id {
        tracing::debug!(id = raw, "ignoring message with unknown id");
    }
    let payload = body[1..].to_vec();
    Ok(Frame::Message(Message { id, payload }))
}

pub async fn write<W: AsyncWrite + Unpin>(stream: &mut W, frame: &Frame) -> Result<(), TorrentError> {
    stream
        .write_all(&encode(frame))
        .await
        .map_err(TorrentError::Io)
}

pub fn format_request(index: u32, begin: u32, length: u32) -> Message {
    let mut payload = Vec::with_capacity(12);
    payload.extend_from_slice(&index.to_be_bytes());
    payload.extend_from_slice(&begin.to_be_bytes());
    payload.extend_from_slice(&length.to_be_bytes());
    Message {
        id: MessageId::Request,
        payload,
    }
}

pub fn format_have(index: u32) -> Message {
    Message {
        id: MessageId::Have,
        payload: index.to_be_bytes().to_vec(),
    }
}

pub fn parse_have(msg: &Message) -> Result<u32, TorrentError> {
    if msg.id != MessageId::Have {
        return Err(TorrentError::ProtocolError("expected Have message".into()));
    }
    if msg.payload.len() != 4 {
        return Err(TorrentError::ProtocolError(format!(
            "expected Have payload of 4 bytes, got {}",
            msg.payload.len()
        )));
    }
    Ok(BigEndian::read_u32(&msg.payload))
}

/// Parses a `Piece` message's payload into `dst_buf`, returning the
/// number of bytes written. Validates the piece index, the `begin`
/// offset, and that the block fits entirely within `dst_buf`.
pub fn parse_piece(
    expected_index: u32,
    dst_buf: &mut [u8],
    msg: &Message,
) -> Result<usize, TorrentError> {
    if msg.id != MessageId::Piece {
        return Err(TorrentError::ProtocolError("expected Piece message".into()));
    }
    if msg.payload.len() < 8 {
        return Err(TorrentError::ProtocolError(
            "Piece payload shorter than 8 bytes".into(),
        ));
    }

    let index = BigEndian::read_u32(&msg.payload[0..4]);
    if index != expected_index {
        return Err(TorrentError::ProtocolError(format!(
            "expected piece index {expected_index}, got {index}"
        )));
    }

    let begin = BigEndian::read_u32(&msg.payload[4..8]) as usize;
    let data = &msg.payload[8..];

    if begin >= dst_buf.len() {
        return Err(TorrentError::ProtocolError(format!(
            "begin {begin} is out of bounds for buffer of length {}",
            dst_buf.len()
        )));
    }
    if begin + data.len() > dst_buf.len() {
        return Err(TorrentError::ProtocolError(format!(
            "begin {begin} + data {} exceeds buffer of length {}",
            data.len(),
            dst_buf.len()
        )));
    }

    dst_buf[begin..begin + data.len()].copy_from_slice(data);
    Ok(data.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn encode_keep_alive() {
        assert_eq!(encode(&Frame::KeepAlive), vec![0, 0, 0, 0]);
    }

    #[test]
    fn encode_message() {
        let frame = Frame::Message(Message {
            id: MessageId::Have,
            payload: vec![1, 2, 3, 4],
        });
        assert_eq!(encode(&frame), vec![0, 0, 0, 5, 4, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn decode_keep_alive() {
        let mut cursor = Cursor::new(vec![0u8, 0, 0, 0]);
        assert_eq!(read(&mut cursor).await.unwrap(), Frame::KeepAlive);
    }

    #[tokio::test]
    async fn round_trips_through_encode_decode() {
        let frame = Frame::Message(Message {
            id: MessageId::Bitfield,
            payload: vec![0xff, 0x00, 0x0f],
        });
        let bytes = encode(&frame);
        let mut cursor = Cursor::new(bytes);
        assert_eq!(read(&mut cursor).await.unwrap(), frame);
    }

    #[tokio::test]
    async fn short_stream_is_protocol_error() {
        let mut cursor = Cursor::new(vec![0u8, 0, 0, 5, 4]); // declares 5 bytes, has 1
        assert!(read(&mut cursor).await.is_err());
    }

    #[test]
    fn format_request_builds_expected_payload() {
        let msg = format_request(4, 567, 4321);
        assert_eq!(msg.id, MessageId::Request);
        assert_eq!(
            msg.payload,
            vec![0x00, 0x00, 0x00, 0x04, 0x00, 0x00, 0x02, 0x37, 0x00, 0x00, 0x10, 0xe1]
        );
    }

    #[test]
    fn parse_have_reads_big_endian_index() {
        let msg = Message {
            id: MessageId::Have,
            payload: vec![0x00, 0x00, 0x05, 0x3c],
        };
        assert_eq!(parse_have(&msg).unwrap(), 0x53c);
    }

    #[test]
    fn parse_have_rejects_wrong_length_or_id() {
        let short = Message {
            id: MessageId::Have,
            payload: vec![0, 0, 1],
        };
        assert!(parse_have(&short).is_err());

        let wrong_id = Message {
            id: MessageId::Choke,
            payload: vec![0, 0, 0, 1],
        };
        assert!(parse_have(&wrong_id).is_err());
    }

    #[test]
    fn parse_piece_happy_path() {
        let mut buf = vec![0u8; 10];
        let msg = Message {
            id: MessageId::Piece,
            payload: vec![
                0x00, 0x00, 0x00, 0x04, // index
                0x00, 0x00, 0x00, 0x02, // begin
                0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff,
            ],
        };
        let n = parse_piece(4, &mut buf, &msg).unwrap();
        assert_eq!(n, 6);
        assert_eq!(
            buf,
            vec![0x00, 0x00, 0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff, 0x00, 0x00]
        );
    }

    #[test]
    fn parse_piece_rejects_wrong_index() {
        let mut buf = vec![0u8; 10];
        let msg = Message {
            id: MessageId::Piece,
            payload: vec![0x00, 0x00, 0x00, 0x06, 0x00, 0x00, 0x00, 0x02, 0xaa],
        };
        assert!(parse_piece(4, &mut buf, &msg).is_err());
        assert_eq!(buf, vec![0u8; 10]);
    }

    #[test]
    fn parse_piece_rejects_begin_out_of_bounds() {
        let mut buf = vec![0u8; 10];
        let msg = Message {
            id: MessageId::Piece,
            payload: vec![0x00, 0x00, 0x00, 0x04, 0x00, 0x00, 0x00, 0x0c, 0xaa],
        };
        assert!(parse_piece(4, &mut buf, &msg).is_err());
    }

    #[test]
    fn parse_piece_rejects_data_exceeding_buffer() {
        let mut buf = vec![0u8; 10];
        let msg = Message {
            id: MessageId::Piece,
            payload: vec![
                0x00, 0x00, 0x00, 0x04, 0x00, 0x00, 0x00, 0x02, 0xaa, 0xbb, 0xcc, 0xdd, 0xee,
                0xff, 0x0a, 0x0b, 0x0c, 0x0d,
            ],
        };
        assert!(parse_piece(4, &mut buf, &msg).is_err());
        assert_eq!(buf, vec![0u8; 10]);
    }

    #[test]
    fn parse_piece_rejects_short_payload() {
        let mut buf = vec![0u8; 10];
        let msg = Message {
            id: MessageId::Piece,
            payload: vec![0x00, 0x00, 0x00, 0x04, 0x00, 0x00, 0x00],
        };
        assert!(parse_piece(4, &mut buf, &msg).is_err());
    }

    #[test]
    fn parse_piece_rejects_non_piece_id() {
        let mut buf = vec![0u8; 10];
        let msg = Message {
            id: MessageId::Choke,
            payload: vec![],
        };
        assert!(parse_piece(4, &mut buf, &msg).is_err());
    }
}
