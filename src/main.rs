//! Sperax RM01 walking pad daemon CLI
//!
//! `walkd daemon` owns the BLE link and serves the heartbeat API;
//! the other subcommands are thin HTTP clients against it.

use clap::Parser;
use serde_json::json;

mod cli;
mod client;
mod daemon;

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("walkd=info".parse().unwrap()),
        )
        .init();

    match cli.command {
        Commands::Daemon { device, port } => {
            daemon::run(device, port).await?;
        }
        Commands::Hook => {
            client::run_hook(&cli.addr).await;
        }
        Commands::Start { speed } => {
            client::post(&cli.addr, "/start", json!({ "speed": speed })).await?;
        }
        Commands::Stop => {
            client::post(&cli.addr, "/stop", json!({})).await?;
        }
        Commands::Speed { speed } => {
            client::post(&cli.addr, "/speed", json!({ "speed": speed })).await?;
        }
        Commands::Status => {
            client::status(&cli.addr).await?;
        }
    }

    Ok(())
}
