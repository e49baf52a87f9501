//! The piece scheduler: fans a torrent's pieces out across one worker
//! task per peer, each driving its own TCP connection through a
//! straight-line request/response loop, and assembles the verified
//! results into the final output buffer.
use crate::error::TorrentError;
use crate::message::{Frame, Message, MessageId, MAX_BLOCK};
use crate::peer::session::PeerSession;
use crate::torrent::TorrentFile;
use sha1::{Digest, Sha1};
use std::net::SocketAddrV4;
use tokio::sync::mpsc;

const MAX_BACKLOG: usize = 5;

#[derive(Debug, Clone, Copy)]
struct PieceWork {
    index: usize,
    length: i64,
    hash: [u8; 20],
}

struct PieceResult {
    index: usize,
    buf: Vec<u8>,
}

/// Downloads every piece of `torrent` from `peers`, returning the
/// assembled file contents. Peers that fail to connect or handshake are
/// dropped silently; their pieces are picked up by other workers.
#[tracing::instrument(skip(torrent, peers), fields(num_peers = peers.len()))]
pub async fn download(
    torrent: &TorrentFile,
    peers: Vec<SocketAddrV4>,
    info_hash: [u8; 20],
    peer_id: [u8; 20],
) -> Result<Vec<u8>, TorrentError> {
    let num_pieces = torrent.num_pieces();
    let (work_tx, work_rx) = mpsc::channel::<PieceWork>(num_pieces.max(1));
    let (results_tx, mut results_rx) = mpsc::channel::<PieceResult>(num_pieces.max(1));

    for index in 0..num_pieces {
        let work = PieceWork {
            index,
            length: torrent.piece_size(index),
            hash: torrent.pieces_hash[index],
        };
        work_tx.send(work).await.map_err(|_| {
            TorrentError::ProtocolError("work queue closed before seeding".into())
        })?;
    }

    let work_rx = std::sync::Arc::new(tokio::sync::Mutex::new(work_rx));
    let mut workers = Vec::with_capacity(peers.len());
    for addr in peers {
        let work_rx = work_rx.clone();
        let work_tx = work_tx.clone();
        let results_tx = results_tx.clone();
        workers.push(tokio::spawn(async move {
            run_worker(addr, info_hash, peer_id, work_rx, work_tx, results_tx).await;
        }));
    }
    // Drop the scheduler's own senders so the channels close once every
    // worker has dropped theirs.
    drop(work_tx);
    drop(results_tx);

    let mut output = vec![0u8; torrent.length as usize];
    let mut received = 0usize;
    while received < num_pieces {
        let Some(result) = results_rx.recv().await else {
            return Err(TorrentError::ProtocolError(
                "results channel closed before all pieces were received".into(),
            ));
        };
        let begin = torrent.piece_offset(result.index) as usize;
        let end = begin + result.buf.len();
        output[begin..end].copy_from_slice(&result.buf);
        received += 1;
        tracing::debug!(index = result.index, received, num_pieces, "piece assembled");
    }

    // Every piece is verified and assembled; close the work queue so
    // workers blocked on an empty `rx.recv()` wake with `None` and exit
    // instead of parking forever (spec.md §4.8: "close work_queue, which
    // causes all workers to exit after their current op").
    work_rx.lock().await.close();

    for handle in workers {
        let _ = handle.await;
    }

    Ok(output)
}

type WorkReceiver = std::sync::Arc<tokio::sync::Mutex<mpsc::Receiver<PieceWork>>>;

#[tracing::instrument(skip(info_hash, peer_id, work_rx, work_tx, results_tx), fields(%addr))]
async fn run_worker(
    addr: SocketAddrV4,
    info_hash: [u8; 20],
    peer_id: [u8; 20],
    work_rx: WorkReceiver,
    work_tx: mpsc::Sender<PieceWork>,
    results_tx: mpsc::Sender<PieceResult>,
) {
    let mut session = match PeerSession::connect(addr, info_hash, peer_id).await {
        Ok(s) => s,
        Err(e) => {
            tracing::info!(error = %e, "peer connect failed, dropping worker");
            return;
        }
    };

    if session.send_unchoke().await.is_err() || session.send_interested().await.is_err() {
        tracing::info!("failed to send initial unchoke/interested, dropping worker");
        return;
    }

    loop {
        let work = {
            let mut rx = work_rx.lock().await;
            rx.recv().await
        };
        let Some(work) = work else { break };

        if !session.has_piece(work.index) {
            if work_tx.send(work).await.is_err() {
                break;
            }
            continue;
        }

        match download_piece(&mut session, &work).await {
            Ok(buf) => {
                if verify_piece(&buf, &work.hash) {
                    let _ = session.send_have(work.index as u32).await;
                    if results_tx
                        .send(PieceResult {
                            index: work.index,
                            buf,
                        })
                        .await
                        .is_err()
                    {
                        break;
                    }
                } else {
                    tracing::warn!(index = work.index, "piece failed SHA-1 check, re-enqueuing");
                    if work_tx.send(work).await.is_err() {
                        break;
                    }
                }
            }
            Err(e) => {
                tracing::warn!(index = work.index, error = %e, "piece download failed, re-enqueuing and dropping peer");
                let _ = work_tx.send(work).await;
                break;
            }
        }
    }
}

fn verify_piece(buf: &[u8], expected: &[u8; 20]) -> bool {
    let mut hasher = Sha1::new();
    hasher.update(buf);
    let actual: [u8; 20] = hasher.finalize().into();
    &actual == expected
}

/// Drives the block-pipelining state machine for a single piece against
/// a single peer. Returns the fully assembled, but not yet
/// hash-verified, piece buffer.
async fn download_piece(
    session: &mut PeerSession,
    work: &PieceWork,
) -> Result<Vec<u8>, TorrentError> {
    let piece_length = work.length as usize;
    let mut buf = vec![0u8; piece_length];
    let mut downloaded = 0usize;
    let mut requested = 0usize;
    let mut backlog = 0usize;

    while downloaded < piece_length {
        if session.am_choked {
            dispatch_one(session, &mut buf, work.index as u32, &mut downloaded, &mut backlog)
                .await?;
            continue;
        }

        while backlog < MAX_BACKLOG && requested < piece_length {
            let block = MAX_BLOCK.min(piece_length - requested);
            session
                .send_request(work.index as u32, requested as u32, block as u32)
                .await?;
            requested += block;
            backlog += 1;
        }

        dispatch_one(session, &mut buf, work.index as u32, &mut downloaded, &mut backlog).await?;
    }

    Ok(buf)
}

async fn dispatch_one(
    session: &mut PeerSession,
    buf: &mut [u8],
    index: u32,
    downloaded: &mut usize,
    backlog: &mut usize,
) -> Result<(), TorrentError> {
    let frame = session.read().await?;
    let msg = match frame {
        Frame::KeepAlive => return Ok(()),
        Frame::Message(m) => m,
    };
    match msg.id {
        MessageId::Unchoke => session.am_choked = false,
        MessageId::Choke => session.am_choked = true,
        MessageId::Have => {
            let have_index = crate::message::parse_have(&msg)?;
            session.bitfield.set(have_index as usize);
        }
        MessageId::Piece => {
            let n = crate::message::parse_piece(index, buf, &Message { id: MessageId::Piece, payload: msg.payload })?;
            *downloaded += n;
            *backlog = backlog.saturating_sub(1);
        }
        _ => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handshake::Handshake;
    use crate::message::MessageId;
    use tokio::io::BufReader;
    use tokio::net::{TcpListener, TcpStream};

    #[test]
    fn verify_piece_matches_sha1() {
        let data = b"hello world".to_vec();
        let mut hasher = Sha1::new();
        hasher.update(&data);
        let hash: [u8; 20] = hasher.finalize().into();
        assert!(verify_piece(&data, &hash));
        assert!(!verify_piece(b"goodbye", &hash));
    }

    fn piece_hashes(content: &[u8], piece_length: i64) -> Vec<[u8; 20]> {
        content
            .chunks(piece_length as usize)
            .map(|chunk| {
                let mut hasher = Sha1::new();
                hasher.update(chunk);
                hasher.finalize().into()
            })
            .collect()
    }

    #[tokio::test]
    async fn end_to_end_loopback_download_matches_expected_hashes() {
        let piece_length: i64 = 16384 + 4096; // spans two blocks per piece
        let num_pieces = 3usize;
        let last_piece_len = 5000usize;
        let full_len = piece_length as usize * (num_pieces - 1) + last_piece_len;

        let mut content = vec![0u8; full_len];
        for (i, b) in content.iter_mut().enumerate() {
            *b = (i % 251) as u8;
        }
        let hashes = piece_hashes(&content, piece_length);

        let info_hash = [7u8; 20];
        let peer_id = [1u8; 20];

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = match listener.local_addr().unwrap() {
            std::net::SocketAddr::V4(v4) => v4,
            _ => unreachable!(),
        };
        let seed_content = content.clone();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            serve_fake_peer(stream, info_hash, seed_content, piece_length as usize).await;
        });

        let torrent = TorrentFile {
            announce: "http://unused.example/announce".into(),
            name: "loopback-fixture".into(),
            piece_length,
            length: full_len as i64,
            info_hash,
            pieces_hash: hashes.clone(),
        };

        let output = download(&torrent, vec![addr], info_hash, peer_id).await.unwrap();
        assert_eq!(output.len(), full_len);
        assert_eq!(output, content);
        for (index, expected) in hashes.iter().enumerate() {
            let start = index * piece_length as usize;
            let end = start + torrent.piece_size(index) as usize;
            assert!(verify_piece(&output[start..end], expected));
        }
    }

    /// One fake-peer connection handler used by the end-to-end test: sends
    /// a full Bitfield + Unchoke, then answers every Request with the
    /// matching slice of `content` as a Piece message.
    async fn serve_fake_peer(
        mut stream: TcpStream,
        info_hash: [u8; 20],
        content: Vec<u8>,
        piece_length: usize,
    ) {
        let their_hs = Handshake::read(&mut stream).await.unwrap();
        assert_eq!(their_hs.info_hash, info_hash);
        Handshake::new(info_hash, [9u8; 20])
            .write(&mut stream)
            .await
            .unwrap();

        let num_pieces = content.len().div_ceil(piece_length);
        let mut bits = vec![0u8; num_pieces.div_ceil(8)];
        for i in 0..num_pieces {
            bits[i / 8] |= 1 << (7 - i % 8);
        }
        message::write(
            &mut stream,
            &Frame::Message(Message {
                id: MessageId::Bitfield,
                payload: bits,
            }),
        )
        .await
        .unwrap();
        message::write(
            &mut stream,
            &Frame::Message(Message {
                id: MessageId::Unchoke,
                payload: Vec::new(),
            }),
        )
        .await
        .unwrap();

        let mut reader = BufReader::new(stream);
        loop {
            let frame = match message::read(&mut reader).await {
                Ok(f) => f,
                Err(_) => break,
            };
            let Frame::Message(msg) = frame else { continue };
            if msg.id != MessageId::Request {
                continue;
            }
            let index = u32::from_be_bytes(msg.payload[0..4].try_into().unwrap()) as usize;
            let begin = u32::from_be_bytes(msg.payload[4..8].try_into().unwrap()) as usize;
            let length = u32::from_be_bytes(msg.payload[8..12].try_into().unwrap()) as usize;
            let piece_start = index * piece_length;
            let start = piece_start + begin;
            let data = content[start..start + length].to_vec();

            let mut payload = Vec::with_capacity(8 + data.len());
            payload.extend_from_slice(&(index as u32).to_be_bytes());
            payload.extend_from_slice(&(begin as u32).to_be_bytes());
            payload.extend_from_slice(&data);
            message::write(
                reader.get_mut(),
                &Frame::Message(Message {
                    id: MessageId::Piece,
                    payload,
                }),
            )
            .await
            .unwrap();
        }
    }
}
