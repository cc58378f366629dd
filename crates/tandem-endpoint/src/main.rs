//! Tandem daemon
//!
//! Serves the built-in methods over newline-delimited JSON-RPC on a Unix socket.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tandem_core::models::Config;
use tandem_core::storage::ConfigStorage;
use tandem_endpoint::methods::builtin_dispatcher;
use tandem_endpoint::IpcServer;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "tandemd")]
#[command(about = "Tandem daemon - JSON-RPC endpoint over a Unix socket", long_about = None)]
struct Args {
    /// Socket path for IPC
    #[arg(short, long)]
    socket: Option<String>,

    /// Log level
    #[arg(short, long)]
    log_level: Option<String>,

    /// Number of workers for deferred handlers
    #[arg(short = 'w', long)]
    max_workers: Option<usize>,

    /// Directory holding config.json; defaults are used when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,
}

impl Args {
    fn merge_into(self, mut config: Config) -> Result<Config> {
        if let Some(socket) = self.socket {
            config.daemon.socket_path = socket;
        }
        if let Some(log_level) = self.log_level {
            config.daemon.log_level = log_level;
        }
        if let Some(max_workers) = self.max_workers {
            config.endpoint.max_workers = max_workers;
        }

        config.validate().context("Invalid configuration")?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(dir) => ConfigStorage::new(dir.clone())
            .load()
            .with_context(|| format!("Failed to load config from {}", dir.display()))?,
        None => Config::default(),
    };
    let config = args.merge_into(config)?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.daemon.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    tracing::info!("Tandem daemon starting...");
    tracing::info!("Socket path: {}", config.daemon.socket_path);
    tracing::info!("Worker pool size: {}", config.endpoint.max_workers);

    let dispatcher = builtin_dispatcher();
    tracing::info!("Registered methods: {:?}", dispatcher.methods());

    let server = Arc::new(IpcServer::new(
        config.daemon.socket_path.clone(),
        dispatcher,
        config.endpoint.clone(),
    ));
    let listener = server.bind()?;

    let server_handle = tokio::spawn(async move {
        if let Err(e) = server.serve(listener).await {
            tracing::error!("IPC server error: {}", e);
        }
    });

    tracing::info!("Daemon ready and listening");

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down...");

    server_handle.abort();
    if let Err(e) = std::fs::remove_file(&config.daemon.socket_path) {
        tracing::debug!("Failed to remove socket file: {}", e);
    }

    Ok(())
}
