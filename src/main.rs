//! Driver: parse a metainfo file, announce to its tracker, download every
//! piece over the peer-wire protocol, and write the result atomically.
use anyhow::{Context, Result};
use clap::Parser;
use rs_torrent_client::cli::Cli;
use rs_torrent_client::torrent::TorrentFile;
use rs_torrent_client::{scheduler, tracker};
use std::io::Write as _;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(err) = run(cli).await {
        eprintln!("rstc: {err:#}");
        std::process::exit(1);
    }
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "rs_torrent_client=info",
        1 => "rs_torrent_client=debug",
        _ => "rs_torrent_client=trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn run(cli: Cli) -> Result<()> {
    let data = std::fs::read(&cli.input)
        .with_context(|| format!("reading metainfo file {}", cli.input.display()))?;
    let torrent = TorrentFile::parse(&data).context("parsing metainfo")?;
    tracing::info!(
        name = %torrent.name,
        pieces = torrent.num_pieces(),
        info_hash = %hex::encode(torrent.info_hash),
        "parsed torrent"
    );

    let client = tracker::Client::new(cli.port).context("generating peer id")?;
    let announce = client.announce(&torrent).await.context("announcing to tracker")?;
    tracing::info!(peers = announce.peers.len(), interval = announce.interval, "tracker responded");
    if announce.peers.is_empty() {
        anyhow::bail!("tracker returned no peers");
    }

    let peer_id = client.peer_id();
    let buf = scheduler::download(&torrent, announce.peers, torrent.info_hash, peer_id)
        .await
        .context("downloading pieces")?;

    write_atomically(&cli.output, &buf)
        .with_context(|| format!("writing output to {}", cli.output.display()))?;
    tracing::info!(bytes = buf.len(), path = %cli.output.display(), "download complete");
    Ok(())
}

/// Writes `data` to a sibling temp file, then renames it into place, so a
/// crash mid-write never leaves a partial file at `path`.
fn write_atomically(path: &std::path::Path, data: &[u8]) -> std::io::Result<()> {
    let tmp_path = path.with_extension("part");
    {
        let mut tmp = std::fs::File::create(&tmp_path)?;
        tmp.write_all(data)?;
        tmp.sync_all()?;
    }
    std::fs::rename(&tmp_path, path)
}
