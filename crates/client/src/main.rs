mod bot;
mod config;
mod input;
mod stats;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;

use bot::Bot;
use config::BotConfig;
use tether::SyncConfig;

#[derive(Parser)]
#[command(name = "tether-bot")]
#[command(about = "Headless client that exercises prediction and reconciliation")]
struct Args {
    #[arg(short, long, default_value = "127.0.0.1:27015")]
    server: String,

    #[arg(short, long, default_value_t = 30)]
    duration_secs: u64,

    #[arg(short, long, help = "TOML file with sync settings")]
    config: Option<PathBuf>,

    #[arg(short, long, default_value_t = 5.0, help = "Radius of the walked circle")]
    radius: f32,

    #[arg(long, help = "Sprint around the circle")]
    sprint: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let server: SocketAddr = args
        .server
        .parse()
        .with_context(|| format!("invalid server address: {}", args.server))?;

    let sync = match &args.config {
        Some(path) => SyncConfig::load(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => SyncConfig::default(),
    };

    let mut config = BotConfig::new(server, sync);
    config.duration = Duration::from_secs(args.duration_secs);
    config.radius = args.radius;
    config.sprint = args.sprint;

    let stats = Bot::connect(config).await?.run().await?;
    if stats.frames == 0 {
        log::warn!("No frames received from {}", server);
    }

    Ok(())
}
