use clap::Parser;

/// Multi-stream live HLS ingestion and player-dispatch engine.
#[derive(Debug, Parser)]
#[command(name = "tardsplaya", version, about)]
pub struct Args {
    /// Master playlist URL to ingest (the CLI's resolver treats the channel
    /// argument as this URL directly).
    #[arg(long)]
    pub playlist_url: String,

    /// Quality label to select from the master playlist's variants, or
    /// `source` for a single-variant (already-media) playlist.
    #[arg(long, default_value = "source")]
    pub quality: String,

    /// Player command to spawn, with live segment bytes piped to its stdin.
    #[arg(long, default_value = "mpv")]
    pub player: String,

    /// Extra arguments passed to the player command. Defaults to `-`, the
    /// stdin selector most players (mpv, ffplay, vlc) accept.
    #[arg(long, value_delimiter = ' ', default_value = "-")]
    pub player_args: Vec<String>,

    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}
