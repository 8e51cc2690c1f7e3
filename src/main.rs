use alertsync::config::Config;
use alertsync::sync::Orchestrator;
use anyhow::{Context, Result};
use std::path::PathBuf;
use std::time::Duration;

/// Environment variable naming an alternate config file.
const CONFIG_ENV: &str = "ALERTSYNC_CONFIG";

/// Config file path: `ALERTSYNC_CONFIG` if set, else ~/.config/alertsync/config.toml
fn config_path() -> Result<PathBuf> {
    if let Some(path) = std::env::var_os(CONFIG_ENV).filter(|p| !p.is_empty()) {
        return Ok(PathBuf::from(path));
    }
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home)
        .join(".config")
        .join("alertsync")
        .join("config.toml"))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let path = config_path()?;
    let config = Config::load(&path)
        .with_context(|| format!("Failed to load config from '{}'", path.display()))?;
    tracing::debug!(config = ?config, "Loaded configuration");

    let client = reqwest::Client::builder()
        .user_agent(concat!("alertsync/", env!("CARGO_PKG_VERSION")))
        .pool_idle_timeout(Duration::from_secs(30))
        .timeout(config.request_timeout())
        .build()
        .context("Failed to build HTTP client")?;

    let orchestrator =
        Orchestrator::from_config(client, &config).context("Invalid configuration")?;

    orchestrator.run().await.context("Feed sync failed")?;
    Ok(())
}
