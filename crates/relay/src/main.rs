//! ChatRelay Server
//!
//! Relays chat lines between every connected client.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use relay::config::Config;
use relay::reactor::{Reactor, ReactorEvent};
use tokio::sync::broadcast::error::RecvError;

/// ChatRelay Server - rebroadcasts each client's messages to every other client.
#[derive(Parser, Debug)]
#[command(name = "chatrelay-server")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands for the server.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Start relaying on the configured endpoint
    Serve {
        /// Interface to bind (overrides the config file)
        #[arg(long)]
        host: Option<String>,

        /// Port to bind (overrides the config file)
        #[arg(long, short)]
        port: Option<u16>,
    },

    /// Print the effective configuration as TOML
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let mut config = if let Some(config_path) = &cli.config {
        Config::load(config_path)?
    } else {
        Config::load_default()?
    };

    // Initialize tracing before overrides so their messages are visible
    tracing_subscriber::fmt()
        .with_env_filter(config.log_filter(cli.verbose))
        .init();
    if let Some(config_path) = &cli.config {
        tracing::debug!("Using config file: {:?}", config_path);
    }

    // Apply environment variable overrides
    config.apply_env_overrides();

    if let Commands::Serve { host, port } = &cli.command {
        if let Some(host) = host {
            config.server.host = host.clone();
        }
        if let Some(port) = port {
            config.server.port = *port;
        }
    }

    // Validate configuration
    config.validate()?;

    match cli.command {
        Commands::Serve { .. } => serve(config).await,
        Commands::Config => {
            print!("{}", config.to_toml()?);
            Ok(())
        }
    }
}

/// Run the reactor until SIGINT/SIGTERM or a fatal multiplexer failure.
async fn serve(config: Config) -> anyhow::Result<()> {
    tracing::info!("ChatRelay server starting...");

    let addr = config.server.socket_addr()?;
    let mut reactor = Reactor::bind(addr, config.reactor.clone())
        .with_context(|| format!("Failed to start relay on {}", addr))?;
    let handle = reactor.handle();
    let mut events = reactor.subscribe();

    // Spawn event logging task
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(ReactorEvent::ClientConnected { id }) => {
                    tracing::info!("Client connected: {}", id);
                }
                Ok(ReactorEvent::ClientDisconnected { id, reason }) => {
                    tracing::info!("Client disconnected: {} ({})", id, reason);
                }
                Ok(ReactorEvent::MessageRelayed {
                    from,
                    delivered,
                    failed,
                }) => {
                    tracing::debug!(
                        "Relayed message from {} to {} peers ({} failed)",
                        from,
                        delivered,
                        failed.len()
                    );
                }
                Ok(ReactorEvent::Stopped) => {
                    tracing::debug!("Reactor reported stop");
                    break;
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!("Event logger lagged, skipped {} events", skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    let mut reactor_task = tokio::task::spawn_blocking(move || reactor.run());

    tokio::select! {
        signal = wait_for_shutdown_signal() => {
            signal.context("Failed to listen for shutdown signals")?;
            tracing::info!("Received shutdown signal");
            handle.shutdown().context("Failed to wake reactor")?;
        }
        result = &mut reactor_task => {
            // The loop only ends on its own after a fatal multiplexer error.
            result.context("Reactor thread panicked")??;
            return Ok(());
        }
    }

    reactor_task.await.context("Reactor thread panicked")??;
    tracing::info!("ChatRelay server stopped");
    Ok(())
}

/// Wait for a shutdown signal (SIGTERM or SIGINT).
#[cfg(unix)]
async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    tokio::select! {
        _ = sigterm.recv() => {
            tracing::info!("Received SIGTERM");
        }
        _ = sigint.recv() => {
            tracing::info!("Received SIGINT");
        }
    }
    Ok(())
}

/// Wait for Ctrl-C.
#[cfg(not(unix))]
async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}
