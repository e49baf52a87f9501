//! Tracker client logic for the BitTorrent protocol.
//!
//! This module implements communication with BitTorrent trackers, including:
//! - Announce requests and responses
//! - Peer parsing (compact and non-compact)
//! - Peer ID generation and URL encoding helpers
//!
//! Used by the client to discover peers for a torrent.
use crate::peer::list::parse_compact_peers;
use crate::torrent::TorrentFile;
use anyhow::{Ok, Result};
use rand::Rng;
use serde::Deserialize;
use std::net::SocketAddrV4;
use std::time::Duration;

const ANNOUNCE_TIMEOUT: Duration = Duration::from_secs(15);

// Represents a client communicating with a bittorent tracker
#[derive(Debug)]
pub struct Client {
    peer_id: [u8; 20],
    port: u16,
}

// Contains the parameters for a tracker announce request
#[derive(Debug)]
pub struct AnnounceRequest {
    pub info_hash: [u8; 20],
    pub peer_id: [u8; 20],
    pub port: u16,
    pub uploaded: i64,
    pub downloaded: i64,
    pub compact: bool,
    pub left: i64,
}

/// Contains the parsed response from a tracker. Only the compact peer
/// format is supported; non-compact dictionary-of-peers responses are out
/// of scope.
#[derive(Debug)]
pub struct AnnounceResponse {
    pub interval: i64,
    pub peers: Vec<SocketAddrV4>,
}

#[derive(Debug, Deserialize)]
struct TrackerResponse {
    #[serde(default)]
    interval: i64,
    #[serde(default, with = "serde_bytes")]
    peers: Vec<u8>,
}

impl Client {
    pub fn new(port: u16) -> Result<Self> {
        Ok(Self {
            peer_id: generate_peer_id()?,
            port,
        })
    }

    pub fn peer_id(&self) -> [u8; 20] {
        self.peer_id
    }

    /// Sends an announce request to the tracker to get a list of peers.
    #[tracing::instrument(skip(self, torrent), fields(announce = %torrent.announce), level = "debug")]
    pub async fn announce(&self, torrent: &TorrentFile) -> Result<AnnounceResponse> {
        let request = AnnounceRequest {
            info_hash: torrent.info_hash,
            peer_id: self.peer_id,
            port: self.port,
            uploaded: 0,
            downloaded: 0,
            compact: true,
            left: torrent.length,
        };
        let url = build_announce_url(&torrent.announce, &request);
        tracing::debug!(url, "making announce request to tracker");

        let client = reqwest::Client::builder().timeout(ANNOUNCE_TIMEOUT).build()?;
        let response = client.get(url).send().await?;
        let response_bytes = response.bytes().await?;
        Self::parse_announce_response(&response_bytes)
    }

    /// Parses the bencoded body of a tracker announce response into
    /// `interval` and a compact peer list.
    fn parse_announce_response(bytes: &[u8]) -> Result<AnnounceResponse> {
        let tracker_response: TrackerResponse = serde_bencode::from_bytes(bytes)?;
        let peers = parse_compact_peers(&tracker_response.peers)?;
        Ok(AnnounceResponse {
            interval: tracker_response.interval,
            peers,
        })
    }
}

/// Builds the full announce URL. Query parameters are sorted
/// lexicographically by key so the resulting string is deterministic.
fn build_announce_url(announce: &str, request: &AnnounceRequest) -> String {
    let params: Vec<(&str, String)> = vec![
        ("compact", (request.compact as i32).to_string()),
        ("downloaded", request.downloaded.to_string()),
        ("info_hash", url_encode(&request.info_hash)),
        ("left", request.left.to_string()),
        ("peer_id", url_encode(&request.peer_id)),
        ("port", request.port.to_string()),
        ("uploaded", request.uploaded.to_string()),
    ];
    let query = params
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&");
    format!("{announce}?{query}")
}
/// Generates a unique peer ID for this client.
///
/// This function creates a 20-byte peer ID that follows the BitTorrent protocol specification.
/// The peer ID consists of:
/// - A 9-byte prefix identifying the client ("-RT0001-") RT = Rust torrent
/// - 11 random bytes to ensure uniqueness
///
/// # Returns
/// * `Result<[u8; 20]>` - A 20-byte peer ID, or an error if generation fails
///
/// # Example
/// ```ignore
/// let peer_id = generate_peer_id()?;
/// assert_eq!(peer_id.len(), 20);
/// assert_eq!(&peer_id[..9], b"-RT0001-");
/// ```
fn generate_peer_id() -> Result<[u8; 20]> {
    let mut peer_id = [0u8; 20];
    let prefix = b"-RT0001-";
    peer_id[..prefix.len()].copy_from_slice(prefix);
    let mut rng = rand::rng();
    rng.fill(&mut peer_id[prefix.len()..]);
    Ok(peer_id)
}

/// URL-encodes a byte slice according to RFC 3986.
///
/// This function performs percent-encoding of bytes that are not in the unreserved
/// character set. Unreserved characters (a-z, A-Z, 0-9, -, ., _, ~) are left as-is,
/// while all other characters are encoded as %XX where XX is the hexadecimal
/// representation of the byte value.
///
/// # Arguments
/// * `bytes` - The byte slice to URL-encode
///
/// # Returns
/// * `String` - The URL-encoded string
///
/// # Example
/// ```ignore
/// let bytes = b"Hello World!";
/// let encoded = url_encode(bytes);
/// assert_eq!(encoded, "Hello%20World%21");
/// ```
fn url_encode(bytes: &[u8]) -> String {
    let mut encoded = String::with_capacity(bytes.len() * 3);
    for &byte in bytes {
        match byte {
            b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                encoded.push(byte as char);
            }
            _ => {
                encoded.push_str(&format!("%{:02X}", byte));
            }
        }
    }
    encoded
}
