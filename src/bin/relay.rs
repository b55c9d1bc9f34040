//! Relay client - chat with another client or send a single message
//!
//! # Usage
//!
//! ```text
//! relay chat --name alice --peer bob      # interactive; type "goodbye" to leave
//! relay send --from cron --to bob "backup finished"
//! relay --server 10.0.0.5:1025 chat --name alice --peer bob
//! ```

use std::env;
use std::process;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use relay_client::{send_once, Conversation, RelayClient};

/// Default relay address when neither --server nor $RELAY_ADDR is given.
const DEFAULT_SERVER: &str = "127.0.0.1:1025";

/// Environment variable naming the relay address.
const SERVER_ENV: &str = "RELAY_ADDR";

/// Log filter used when `RUST_LOG` is not set.
const DEFAULT_LOG_FILTER: &str = "relay_client=warn";

// ============================================================================
// CLI Arguments
// ============================================================================

/// Relay client - talk to other clients through a relay daemon
#[derive(Parser, Debug)]
#[command(name = "relay", version, about)]
struct Args {
    /// Relay address [default: $RELAY_ADDR or 127.0.0.1:1025]
    #[arg(short, long, global = true)]
    server: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Chat interactively with one peer
    Chat {
        /// Name to connect as
        #[arg(short, long)]
        name: String,

        /// Name every typed line is sent to
        #[arg(short, long)]
        peer: String,
    },
    /// Send one message and exit
    Send {
        /// Name to connect as
        #[arg(short, long)]
        from: String,

        /// Recipient name
        #[arg(short, long)]
        to: String,

        /// Message body
        message: String,
    },
}

fn main() {
    let args = Args::parse();

    if let Err(e) = run(args) {
        eprintln!("relay: {e:#}");
        process::exit(1);
    }
}

#[tokio::main]
async fn run(args: Args) -> Result<()> {
    // Logs go to stderr so they never interleave with the chat on stdout.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(log_filter(env::var("RUST_LOG").ok().as_deref()))
        .init();

    let server = args
        .server
        .or_else(|| env::var(SERVER_ENV).ok())
        .unwrap_or_else(|| DEFAULT_SERVER.to_string());
    debug!(server = %server, "Using relay");

    match args.command {
        Command::Chat { name, peer } => {
            let client = RelayClient::connect(server.as_str(), name.as_str())
                .await
                .context("Is relayd running?")?;
            Conversation::new(client, peer.as_str())
                .run_stdio()
                .await
                .context("Conversation ended with an error")?;
        }
        Command::Send { from, to, message } => {
            send_once(server.as_str(), &from, &to, &message)
                .await
                .with_context(|| format!("Failed to send message to {to}"))?;
        }
    }

    Ok(())
}

/// `RUST_LOG` when it parses, [`DEFAULT_LOG_FILTER`] otherwise.
fn log_filter(rust_log: Option<&str>) -> EnvFilter {
    rust_log
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_LOG_FILTER))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing::level_filters::LevelFilter;

    #[test]
    fn test_rust_log_overrides_default_filter() {
        assert_eq!(log_filter(None).max_level_hint(), Some(LevelFilter::WARN));
        assert_eq!(
            log_filter(Some("relay_client=trace")).max_level_hint(),
            Some(LevelFilter::TRACE)
        );
    }
}
