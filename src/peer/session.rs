//! A single peer-wire connection: handshake, framed reads/writes, and the
//! small bit of state (choked flag, remote bitfield) a worker needs to
//! drive one piece download at a time.
use crate::bitfield::Bitfield;
use crate::error::TorrentError;
use crate::handshake::Handshake;
use crate::message::{self, Frame, Message, MessageId};
use std::net::SocketAddrV4;
use std::time::Duration;
use tokio::io::BufReader;
use tokio::net::TcpStream;
use tokio::time::timeout;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(3);
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(3);
const BITFIELD_TIMEOUT: Duration = Duration::from_secs(5);
const READ_TIMEOUT: Duration = Duration::from_secs(30);

/// A connected, handshaken peer. Owns the TCP stream; nothing else may
/// touch it once a worker has one.
pub struct PeerSession {
    reader: BufReader<TcpStream>,
    pub am_choked: bool,
    pub bitfield: Bitfield,
    pub addr: SocketAddrV4,
}

impl PeerSession {
    /// Connects to `addr`, performs the handshake, and waits for the
    /// peer's initial Bitfield. All three steps are individually
    /// deadlined; on success the deadlines no longer apply.
    #[tracing::instrument(skip(info_hash, peer_id), fields(%addr), level = "debug")]
    pub async fn connect(
        addr: SocketAddrV4,
        info_hash: [u8; 20],
        peer_id: [u8; 20],
    ) -> Result<Self, TorrentError> {
        let stream = timeout(CONNECT_TIMEOUT, TcpStream::connect(addr))
            .await
            .map_err(|_| TorrentError::NetworkError(format!("connect to {addr} timed out")))?
            .map_err(TorrentError::Io)?;
        let mut stream = stream;

        let hs = Handshake::new(info_hash, peer_id);
        hs.write(&mut stream).await?;

        let reply = timeout(HANDSHAKE_TIMEOUT, Handshake::read(&mut stream))
            .await
            .map_err(|_| TorrentError::NetworkError(format!("handshake with {addr} timed out")))??;
        if reply.info_hash != info_hash {
            return Err(TorrentError::HandshakeMismatch);
        }

        let mut reader = BufReader::new(stream);
        let frame = timeout(BITFIELD_TIMEOUT, message::read(&mut reader))
            .await
            .map_err(|_| {
                TorrentError::NetworkError(format!("bitfield from {addr} timed out"))
            })??;
        let bitfield = match frame {
            Frame::Message(Message {
                id: MessageId::Bitfield,
                payload,
            }) => Bitfield::from_bytes(payload),
            other => {
                return Err(TorrentError::ProtocolError(format!(
                    "expected initial Bitfield from {addr}, got {other}"
                )))
            }
        };

        Ok(Self {
            reader,
            am_choked: true,
            bitfield,
            addr,
        })
    }

    pub fn has_piece(&self, index: usize) -> bool {
        self.bitfield.has(index)
    }

    pub async fn send_unchoke(&mut self) -> Result<(), TorrentError> {
        self.send(Message {
            id: MessageId::Unchoke,
            payload: Vec::new(),
        })
        .await
    }

    pub async fn send_interested(&mut self) -> Result<(), TorrentError> {
        self.send(Message {
            id: MessageId::Interested,
            payload: Vec::new(),
        })
        .await
    }

    pub async fn send_not_interested(&mut self) -> Result<(), TorrentError> {
        self.send(Message {
            id: MessageId::NotInterested,
            payload: Vec::new(),
        })
        .await
    }

    pub async fn send_request(
        &mut self,
        index: u32,
        begin: u32,
        length: u32,
    ) -> Result<(), TorrentError> {
        self.send(message::format_request(index, begin, length)).await
    }

    pub async fn send_have(&mut self, index: u32) -> Result<(), TorrentError> {
        self.send(message::format_have(index)).await
    }

    async fn send(&mut self, msg: Message) -> Result<(), TorrentError> {
        message::write(&mut self.reader, &Frame::Message(msg)).await
    }

    /// Blocking framed read with the 30-second in-progress-piece deadline.
    pub async fn read(&mut self) -> Result<Frame, TorrentError> {
        timeout(READ_TIMEOUT, message::read(&mut self.reader))
            .await
            .map_err(|_| TorrentError::NetworkError(format!("read from {} timed out", self.addr)))?
    }
}
