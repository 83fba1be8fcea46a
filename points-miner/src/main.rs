use anyhow::Context;
use tracing::info;

use points_miner::{config::Config, logging, miner};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _guard = logging::init_logging("logs")?;

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.json".to_string());
    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {config_path}"))?;

    info!(config = %config_path, username = %config.username, "starting points miner");
    miner::run(config).await?;

    Ok(())
}
