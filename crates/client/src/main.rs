//! ChatRelay Console Client
//!
//! Reads lines from stdin and prints messages relayed by the server.

use std::io::BufReader;
use std::path::PathBuf;

use anyhow::Context;
use chat_client::{ChatClient, ClientExit, ClientOptions};
use clap::Parser;
use relay::config::Config;

/// ChatRelay Client - chat with everyone connected to a relay server.
#[derive(Parser, Debug)]
#[command(name = "chatrelay")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Server host (overrides the config file)
    #[arg(long)]
    pub host: Option<String>,

    /// Server port (overrides the config file)
    #[arg(long, short)]
    pub port: Option<u16>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let mut config = if let Some(config_path) = &cli.config {
        Config::load(config_path)?
    } else {
        Config::load_default()?
    };

    // Logs go to stderr so they never mix with relayed messages. Tracing
    // comes up before overrides so their messages are visible.
    tracing_subscriber::fmt()
        .with_env_filter(config.log_filter(cli.verbose))
        .with_writer(std::io::stderr)
        .init();

    // Apply environment variable overrides
    config.apply_env_overrides();

    if let Some(host) = cli.host {
        config.client.host = host;
    }
    if let Some(port) = cli.port {
        config.client.port = port;
    }

    config.validate()?;

    let addr = config.client.socket_addr()?;
    let client = ChatClient::connect(addr, ClientOptions::from(&config.reactor))
        .with_context(|| format!("Failed to connect to {}", addr))?;

    let stdin = BufReader::new(std::io::stdin());
    let mut stdout = std::io::stdout();
    match client.run(stdin, &mut stdout)? {
        ClientExit::Quit => tracing::debug!("Quit"),
        ClientExit::ServerClosed => eprintln!("Server closed the connection"),
    }
    Ok(())
}
