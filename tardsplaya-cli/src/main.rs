mod cli;

use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use tardsplaya_engine::channel::ChannelName;
use tardsplaya_engine::config::EngineConfig;
use tardsplaya_engine::hls::Coordinator;
use tardsplaya_engine::StaticResolver;

use cli::Args;

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_logging(args.verbose);

    if let Err(err) = run(args).await {
        error!("{err:#}");
        std::process::exit(1);
    }
}

fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "tardsplaya=info",
        1 => "tardsplaya=debug",
        _ => "tardsplaya=trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();
}

async fn run(args: Args) -> anyhow::Result<()> {
    let channel = ChannelName::new(args.playlist_url.clone())
        .map_err(|_| anyhow::anyhow!("playlist URL must not be empty"))?;

    let coordinator = Arc::new(Coordinator::new(
        Arc::new(StaticResolver),
        EngineConfig::default(),
    )?);

    coordinator
        .start(channel, &args.quality, args.player, args.player_args)
        .await?;

    info!("stream started, press ctrl-c to stop");
    tokio::signal::ctrl_c().await?;
    coordinator.stop_all().await;

    // Give the supervisor tasks a moment to observe cancellation and drain
    // before the process exits.
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    Ok(())
}
