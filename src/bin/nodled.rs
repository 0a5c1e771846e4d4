//! nodle daemon - multi-client chat server
//!
//! Accepts TCP connections, walks each client through login or account
//! creation, then relays every line an authenticated client sends to all
//! authenticated clients.
//!
//! # Usage
//!
//! ```bash
//! # Listen on the default port (9001), accounts under ./Files
//! nodled
//!
//! # Explicit settings
//! nodled --port 4000 --accounts-dir /var/lib/nodle
//!
//! # Settings from a TOML file
//! nodled --config /etc/nodle/nodled.toml
//! ```

use std::net::IpAddr;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use nodle_core::FileAccountStore;
use nodled::config::ServerConfig;
use nodled::diagnostics::TracingSink;
use nodled::server::ChatServer;

/// nodle chat daemon
#[derive(Parser, Debug)]
#[command(name = "nodled", version, about)]
struct Args {
    /// TOML configuration file (default: <config dir>/nodle/nodled.toml if present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port to listen on
    #[arg(short, long)]
    port: Option<u16>,

    /// Address to listen on
    #[arg(short, long)]
    bind: Option<IpAddr>,

    /// Directory holding account records
    #[arg(short, long)]
    accounts_dir: Option<PathBuf>,
}

impl Args {
    /// Loads configuration and applies environment and flag overrides.
    fn resolve(&self) -> Result<ServerConfig> {
        let mut config = ServerConfig::load_or_default(self.config.as_deref())?.apply_env()?;

        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(bind) = self.bind {
            config.bind = bind;
        }
        if let Some(dir) = &self.accounts_dir {
            config.accounts_dir = dir.clone();
        }

        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("nodled=info".parse()?)
                .add_directive("nodle_core=info".parse()?),
        )
        .init();

    let config = args.resolve().context("Failed to load configuration")?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        pid = process::id(),
        "nodle daemon starting"
    );

    let cancel_token = CancellationToken::new();

    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        if let Err(e) = wait_for_shutdown_signal().await {
            error!(error = %e, "Error waiting for shutdown signal");
        }
        info!("Shutdown signal received");
        shutdown_token.cancel();
    });

    let accounts = Arc::new(FileAccountStore::new(&config.accounts_dir));
    info!(accounts_dir = %config.accounts_dir.display(), "Account store ready");

    let server = ChatServer::bind(&config, accounts, Arc::new(TracingSink), cancel_token)
        .await
        .context("Failed to start server")?;

    if let Err(e) = server.run().await {
        error!(error = %e, "Server error");
        return Err(e.into());
    }

    info!("nodle daemon stopped");
    Ok(())
}

async fn wait_for_shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("Received Ctrl+C");
    }

    Ok(())
}
