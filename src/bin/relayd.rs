//! Relay Daemon - Named-mailbox message relay
//!
//! Accepts TCP clients, binds each to the name sent in its first line and
//! forwards `target:body` lines into the target's mailbox.
//!
//! # Usage
//!
//! ```bash
//! # Listen on the default address (127.0.0.1:1025, or $RELAY_ADDR)
//! relayd
//!
//! # Listen elsewhere and drop silent clients after five minutes
//! relayd --listen 0.0.0.0:4000 --idle-timeout 300
//!
//! # Refuse a second connection using a name that is already online
//! relayd --duplicate-names reject
//! ```

use std::env;
use std::net::SocketAddr;
use std::process;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use relayd::config::{DuplicateNamePolicy, RelayConfig, BIND_ADDR_ENV, DEFAULT_BIND_ADDR};

/// Log filter used when `RUST_LOG` is not set.
const DEFAULT_LOG_FILTER: &str = "relayd=info,relay_protocol=info";

/// Relay daemon - forwards text messages between named clients
#[derive(Parser, Debug)]
#[command(name = "relayd", version, about)]
struct Args {
    /// Address to listen on [default: $RELAY_ADDR or 127.0.0.1:1025]
    #[arg(short, long)]
    listen: Option<SocketAddr>,

    /// Close connections that send nothing for this many seconds
    #[arg(long, value_name = "SECS")]
    idle_timeout: Option<u64>,

    /// Give up delivering a frame to a client after this many seconds
    #[arg(long, value_name = "SECS")]
    write_timeout: Option<u64>,

    /// Longest accepted line in bytes; longer lines close the connection
    #[arg(long, value_name = "BYTES")]
    max_frame_length: Option<usize>,

    /// What to do when a name connects twice: evict or reject
    #[arg(long, value_name = "POLICY", default_value_t = DuplicateNamePolicy::Evict)]
    duplicate_names: DuplicateNamePolicy,
}

impl Args {
    fn into_config(self) -> Result<RelayConfig> {
        let bind_addr = match self.listen {
            Some(addr) => addr,
            None => {
                let raw = env::var(BIND_ADDR_ENV).unwrap_or_else(|_| DEFAULT_BIND_ADDR.to_string());
                raw.parse()
                    .with_context(|| format!("Invalid listen address '{raw}'"))?
            }
        };

        let mut config = RelayConfig::with_bind_addr(bind_addr);
        config.idle_timeout = self.idle_timeout.map(Duration::from_secs);
        if let Some(secs) = self.write_timeout {
            config.write_timeout = Duration::from_secs(secs);
        }
        if let Some(max) = self.max_frame_length {
            config.max_frame_length = max;
        }
        config.duplicate_names = self.duplicate_names;
        Ok(config)
    }
}

fn main() -> Result<()> {
    let config = Args::parse().into_config()?;
    run_daemon(config)
}

#[tokio::main]
async fn run_daemon(config: RelayConfig) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(log_filter(env::var("RUST_LOG").ok().as_deref()))
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        pid = process::id(),
        duplicate_names = %config.duplicate_names,
        idle_timeout = ?config.idle_timeout,
        "Relay daemon starting"
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

    if let Err(e) = relayd::server::listen(config, cancel_token).await {
        error!(error = %e, "Server error");
        return Err(e.into());
    }

    info!("Relay daemon stopped");
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

/// `RUST_LOG` when it parses, [`DEFAULT_LOG_FILTER`] otherwise.
fn log_filter(rust_log: Option<&str>) -> EnvFilter {
    rust_log
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_LOG_FILTER))
}
