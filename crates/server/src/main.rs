mod config;
mod connections;
mod events;
mod server;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;

use config::ServerConfig;
use server::GameServer;
use tether::{LinkConditions, SyncConfig};

#[derive(Parser)]
#[command(name = "tether-server")]
#[command(about = "Authoritative state synchronization server")]
struct Args {
    #[arg(short, long, default_value = "0.0.0.0")]
    bind: String,

    #[arg(short, long, default_value_t = tether::DEFAULT_PORT)]
    port: u16,

    #[arg(short, long, help = "Overrides the tick rate from the config file")]
    tick_rate: Option<u32>,

    #[arg(short, long, default_value_t = 32)]
    max_clients: usize,

    #[arg(long, default_value_t = 10)]
    client_timeout_secs: u64,

    #[arg(short, long, help = "TOML file with sync settings")]
    config: Option<PathBuf>,

    #[arg(long, help = "Enable outbound packet loss simulation")]
    simulate_packet_loss: bool,

    #[arg(long, default_value_t = 0.0, help = "Packet loss percentage (0-100)")]
    loss_percent: f32,

    #[arg(long, default_value_t = 0, help = "Minimum latency in ms")]
    min_latency: u32,

    #[arg(long, default_value_t = 0, help = "Maximum latency in ms")]
    max_latency: u32,

    #[arg(long, default_value_t = 0, help = "Jitter in ms")]
    jitter: u32,

    #[arg(long, default_value_t = 1, help = "Seed for the link simulation")]
    link_seed: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut sync = match &args.config {
        Some(path) => SyncConfig::load(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => SyncConfig::default(),
    };
    if let Some(tick_rate) = args.tick_rate {
        sync.tick_rate = tick_rate;
    }

    let outbound_link = args.simulate_packet_loss.then(|| LinkConditions {
        loss_percent: args.loss_percent.clamp(0.0, 100.0),
        min_latency_ms: args.min_latency,
        max_latency_ms: args.max_latency.max(args.min_latency),
        jitter_ms: args.jitter,
    });

    let config = ServerConfig {
        sync,
        max_clients: args.max_clients,
        client_timeout: Duration::from_secs(args.client_timeout_secs),
        outbound_link,
        link_seed: args.link_seed,
        ..Default::default()
    };

    let bind_addr = format!("{}:{}", args.bind, args.port);
    let server = GameServer::bind(&bind_addr, config)
        .await
        .with_context(|| format!("failed to bind {}", bind_addr))?;

    log::info!(
        "Server started on {} at {} Hz",
        server.local_addr()?,
        server.tick_rate()
    );
    server.run().await?;
    log::info!("Server shutting down");

    Ok(())
}
