//! Library root for rs-torrent-client.
//!
//! Re-exports core modules: bencode, bitfield, message, handshake, torrent,
//! tracker, peer, scheduler, cli, and error for use in binaries and other
//! libraries.
pub mod bencode;
pub mod bitfield;
pub mod cli;
pub mod error;
pub mod handshake;
pub mod message;
pub mod peer;
pub mod scheduler;
pub mod torrent;
pub mod tracker;
