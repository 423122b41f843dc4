use anyhow::Result;
use colored::Colorize;
use fanout_gateway::{config, init_tracing, server};
use std::path::Path;
use tracing::info;

/// Execute the start command
///
/// Loads configuration, initializes logging from it, then serves until a
/// shutdown signal arrives.
pub async fn execute(config_path: &Path) -> Result<()> {
    println!("{}", "Starting fan-out gateway...".green());

    let cfg = config::load_config(config_path)?;
    init_tracing(&cfg.server);

    info!(
        config = %config_path.display(),
        log_format = %cfg.server.log_format,
        "Configuration loaded"
    );

    server::start_server(cfg, config_path.to_path_buf()).await?;

    Ok(())
}
