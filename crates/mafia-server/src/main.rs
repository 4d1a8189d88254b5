mod broadcast;
mod connection;
mod handler;
mod limiter;
mod registry;
mod server;
mod service;

use std::net::SocketAddr;

use clap::Parser;

use crate::server::ServerLimits;

/// Mafia party-game server: rooms, role dealing and per-room event channels
#[derive(Parser, Debug)]
#[command(name = "mafia-server", version, about)]
struct Args {
    /// Address to bind the server to
    #[arg(short, long, default_value = "0.0.0.0:9037")]
    bind: String,

    /// Maximum simultaneous connections allowed
    #[arg(short, long, default_value_t = 100)]
    max_connections: usize,

    /// Commands per second allowed on one connection
    #[arg(short, long, default_value_t = 10)]
    rate_limit: u32,

    /// Seats required before a game can start
    #[arg(long, default_value_t = 6)]
    min_players: u8,

    /// Seats a room can hold
    #[arg(long, default_value_t = 15)]
    max_players: u8,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mafia_server=debug,mafia_common=debug".into()),
        )
        .init();

    let args = Args::parse();

    let addr: SocketAddr = args.bind.parse()?;

    tracing::info!(
        "Starting mafia server on {} (max {} connections)",
        addr,
        args.max_connections
    );
    server::run(
        addr,
        ServerLimits {
            max_connections: args.max_connections,
            commands_per_sec: args.rate_limit,
        },
        args.min_players,
        args.max_players,
    )
    .await
}
