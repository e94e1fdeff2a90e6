mod api;
mod auth;
mod config;
mod logging;
mod node;

use anyhow::Result;
use clap::Parser;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::config::NodeConfig;
use crate::node::TaskpayNode;

#[derive(Parser)]
#[command(name = "taskpay-node", about = "Task marketplace escrow service")]
struct Cli {
    /// Path to a TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the API port
    #[arg(short, long)]
    port: Option<u16>,

    /// Increase log verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init_logging(cli.verbose);

    let mut config = if let Some(path) = cli.config.as_deref() {
        NodeConfig::from_file(path)?
    } else if Path::new("./taskpay.toml").exists() {
        NodeConfig::from_file(Path::new("./taskpay.toml"))?
    } else {
        NodeConfig::from_env()
    };

    if let Some(port) = cli.port {
        config.api.port = port;
    }

    if config.gateway.webhook_secret.is_none() {
        warn!("⚠️ No webhook secret configured; incoming webhooks will be rejected (fail closed)");
    }
    if config.auth.jwt_secret.is_empty() {
        warn!("⚠️ No JWT secret configured; authenticated endpoints will reject all callers");
    }

    info!(name = %config.node.name, "⚙️ Configuration loaded");

    let node = TaskpayNode::new(config)?;
    node.run().await
}
