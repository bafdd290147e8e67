use anyhow::Result;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use stopsearch_common::Config;
use stopsearch_refresh::refresh_cache;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("stopsearch=info".parse()?)
                .add_directive("police_client=info".parse()?),
        )
        .init();

    info!("Stop and search cache refresh starting...");

    let config = Config::from_env()?;
    config.log_redacted();

    match refresh_cache(&config).await {
        Ok(outcome) => {
            info!("Refresh complete. {outcome}");
            Ok(())
        }
        Err(e) => {
            error!("Refresh failed: {e:#}");
            std::process::exit(1);
        }
    }
}
