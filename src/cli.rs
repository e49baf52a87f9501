//! Command-line surface: a metainfo path in, a destination file out.
use clap::Parser;
use std::path::PathBuf;

/// Downloads the content described by a `.torrent` file to a destination
/// path, using the BitTorrent peer-wire protocol as a pure leecher.
#[derive(Parser, Debug)]
#[command(name = "rstc", version, about)]
pub struct Cli {
    /// Path to the `.torrent` metainfo file.
    pub input: PathBuf,

    /// Path to write the downloaded file to.
    pub output: PathBuf,

    /// Port advertised to the tracker. No listening socket is opened.
    #[arg(long, default_value_t = 6881)]
    pub port: u16,

    /// Increase log verbosity. Repeatable (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_required_positional_arguments() {
        let cli = Cli::parse_from(["rstc", "archlinux.torrent", "archlinux.iso"]);
        assert_eq!(cli.input, PathBuf::from("archlinux.torrent"));
        assert_eq!(cli.output, PathBuf::from("archlinux.iso"));
        assert_eq!(cli.port, 6881);
        assert_eq!(cli.verbose, 0);
    }

    #[test]
    fn parses_optional_flags() {
        let cli = Cli::parse_from([
            "rstc", "a.torrent", "a.iso", "--port", "6900", "-vv",
        ]);
        assert_eq!(cli.port, 6900);
        assert_eq!(cli.verbose, 2);
    }
}
