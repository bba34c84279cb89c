//! Intent Analysis Server Main
//!
//! Usage: `intent_server [CONFIG_PATH]` (defaults to `config.toml`)

use intent_server::{AnalysisServer, ServerConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let config_path = std::env::args().nth(1).unwrap_or_else(|| "config.toml".to_string());
    let (config, found) = ServerConfig::load_or_default(&config_path)?;

    // RUST_LOG wins over the configured level
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_filter().into()),
        )
        .with_target(false)
        .with_thread_ids(false)
        .with_line_number(false)
        .with_file(false)
        .init();

    if found {
        tracing::info!("Loaded configuration from {}", config_path);
    } else {
        tracing::warn!("{} not found, using built-in defaults", config_path);
    }
    tracing::info!("Log level: {}", config.monitoring.log_level);

    let server = AnalysisServer::new(config).await?;

    tracing::info!("Ready to accept analysis requests, press Ctrl+C to stop");
    server.start().await?;

    Ok(())
}
