mod background_service;
mod config;
mod supervisor;
mod telemetry;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use service::drive::{GoogleDriveClient, StoredCredentials};

use self::background_service::BackgroundService;
use self::config::AppConfig;
use self::supervisor::UploadsSupervisor;

#[derive(Debug, Parser)]
struct Cli {
    /// Path to the layered TOML config file.
    #[arg(long, default_value = "config/default.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load(&cli.config).with_context(|| "failed to load configuration")?;

    telemetry::initialize(&config.telemetry).with_context(|| "failed to initialize logging")?;

    let credentials_json = tokio::fs::read(&config.oauth.token_cache_path)
        .await
        .with_context(|| format!("reading token cache {}", config.oauth.token_cache_path.display()))?;
    let stored: StoredCredentials =
        serde_json::from_slice(&credentials_json).with_context(|| "parsing token cache")?;
    let credentials = StoredCredentials {
        client_id: config.oauth.client_id.clone(),
        client_secret: config.oauth.client_secret.clone(),
        refresh_token: stored.refresh_token,
    };
    let drive = Arc::new(GoogleDriveClient::new(credentials));

    let supervisor = Arc::new(UploadsSupervisor::new(Arc::new(config), drive));
    let worker = {
        let supervisor = supervisor.clone();
        tokio::spawn(async move { supervisor.run().await })
    };
    supervisor.scan_jobs();

    tracing::info!("agent started");
    tokio::signal::ctrl_c().await.context("failed to listen for ctrl-c")?;
    tracing::info!("shutting down");

    supervisor.stop_all().await;
    worker.abort();

    Ok(())
}
