//! # relay
//!
//! Chat relay binary. `relay serve` runs the WebSocket server; `relay chat`
//! is a line-oriented terminal client.

#![deny(unsafe_code)]

mod chat;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use relay_server::config::ServerConfig;
use relay_server::server::RelayServer;
use relay_settings::{RejectedOverride, RelaySettings};
use relay_store::{
    ConnectionConfig, MemoryMessageRepository, MessageRepository, SqliteMessageRepository,
};

/// How long live sessions get to flush queued frames and detach on Ctrl-C.
const SHUTDOWN_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// WebSocket chat relay.
#[derive(Parser, Debug)]
#[command(name = "relay", about = "WebSocket chat relay")]
struct Cli {
    /// Settings file (defaults to `~/.relay/settings.json`).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the relay server.
    Serve(ServeArgs),
    /// Connect to a relay as a terminal chat client.
    Chat(chat::ChatArgs),
}

#[derive(Args, Debug)]
struct ServeArgs {
    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// Path to the `SQLite` database (overrides settings).
    #[arg(long, conflicts_with = "in_memory")]
    db_path: Option<PathBuf>,

    /// Keep history in memory only.
    #[arg(long)]
    in_memory: bool,
}

fn load_settings(path: Option<&PathBuf>) -> Result<(RelaySettings, Vec<RejectedOverride>)> {
    let path = path.cloned().unwrap_or_else(relay_settings::settings_path);
    relay_settings::load_settings_reporting(&path)
        .with_context(|| format!("Failed to load settings from {}", path.display()))
}

fn init_logging(settings: &RelaySettings) {
    if settings.logging.json {
        relay_core::logging::init_subscriber_json(&settings.logging.level);
    } else {
        relay_core::logging::init_subscriber(&settings.logging.level);
    }
}

fn open_repository(
    settings: &RelaySettings,
    args: &ServeArgs,
) -> Result<Arc<dyn MessageRepository>> {
    if args.in_memory {
        tracing::warn!("history is in memory only and will be lost on exit");
        return Ok(Arc::new(MemoryMessageRepository::new()));
    }

    let path = args
        .db_path
        .clone()
        .unwrap_or_else(|| settings.store.resolved_db_path());
    let config = ConnectionConfig {
        pool_size: settings.store.pool_size,
        busy_timeout_ms: settings.store.busy_timeout_ms,
    };
    let repository = SqliteMessageRepository::open(&path, &config)
        .with_context(|| format!("Failed to open database: {}", path.display()))?;
    tracing::info!(path = %path.display(), "message store opened");
    Ok(Arc::new(repository))
}

async fn serve(settings: &RelaySettings, args: ServeArgs) -> Result<()> {
    let mut config = ServerConfig::from(settings);
    if let Some(host) = args.host.clone() {
        config.host = host;
    }
    if let Some(port) = args.port {
        config.port = port;
    }

    let repository = open_repository(settings, &args)?;
    let metrics = relay_server::metrics::install_recorder()
        .context("Failed to install metrics recorder")?;

    let server = RelayServer::new(config, repository, metrics);
    let (addr, handle) = server.listen().await.context("Failed to bind listener")?;
    tracing::info!(%addr, "relay ready on ws://{addr}/ws");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutting down...");
    let _ = server.shutdown().drain(SHUTDOWN_DRAIN_TIMEOUT).await;
    let _ = handle.await;

    tracing::info!("Shutdown complete");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let (settings, rejected) = load_settings(cli.config.as_ref())?;
    init_logging(&settings);
    // Settings load before the subscriber exists, so replay these now.
    for r in &rejected {
        tracing::warn!(key = %r.key, value = %r.value, kind = r.kind, "invalid env var, ignoring");
    }

    match cli.command {
        Command::Serve(args) => serve(&settings, args).await,
        Command::Chat(args) => chat::run(&settings, args).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_serve_overrides() {
        let cli = Cli::try_parse_from(["relay", "serve", "--port", "0", "--in-memory"]).unwrap();
        match cli.command {
            Command::Serve(args) => {
                assert_eq!(args.port, Some(0));
                assert!(args.in_memory);
                assert!(args.db_path.is_none());
            }
            Command::Chat(_) => panic!("expected serve"),
        }
    }

    #[test]
    fn in_memory_conflicts_with_db_path() {
        let res = Cli::try_parse_from(["relay", "serve", "--in-memory", "--db-path", "/tmp/x.db"]);
        assert!(res.is_err());
    }

    #[test]
    fn global_config_flag_after_subcommand() {
        let cli = Cli::try_parse_from([
            "relay", "chat", "--username", "alice", "--config", "/tmp/s.json",
        ])
        .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/s.json")));
    }

    #[test]
    fn in_memory_repository_skips_sqlite() {
        let settings = RelaySettings::default();
        let args = ServeArgs {
            host: None,
            port: None,
            db_path: None,
            in_memory: true,
        };
        assert!(open_repository(&settings, &args).is_ok());
    }
}
