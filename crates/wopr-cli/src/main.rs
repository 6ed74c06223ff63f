//! `wopr`: command-line frontend for the WOPR daemon.
//!
//! The CLI is a thin client: it auto-starts `woprd` if needed, round-trips
//! one request per command, and renders the response.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

use clap::{Parser, Subcommand};

mod commands;
mod daemon_client;
mod theme;

use daemon_client::DaemonClient;
use theme::Theme;

/// WOPR - local daemon for multiplexed AI-agent sessions.
#[derive(Parser)]
#[command(name = "wopr")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check daemon health.
    Health,
    /// Manage sessions.
    Session {
        #[command(subcommand)]
        command: SessionCommands,
    },
    /// Send one message to a session and print its reply.
    Inject {
        /// The target session name.
        session: String,
        /// The message to send.
        message: String,
    },
}

#[derive(Subcommand)]
enum SessionCommands {
    /// Create a session (idempotent by name).
    Create {
        /// Session name.
        name: String,
        /// Optional system-prompt-like context.
        #[arg(long)]
        context: Option<String>,
    },
    /// List sessions.
    List,
    /// Delete a session.
    Delete {
        /// Session name.
        name: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"))).init();

    let cli = Cli::parse();

    if let Err(err) = run(cli).await {
        eprintln!("{}", Theme::error(&err.to_string()));
        std::process::exit(1);
    }
    Ok(())
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let client = DaemonClient::connect().await?;
    match cli.command {
        Commands::Health => commands::health(&client).await,
        Commands::Session { command } => match command {
            SessionCommands::Create { name, context } => commands::create_session(&client, &name, context).await,
            SessionCommands::List => commands::list_sessions(&client).await,
            SessionCommands::Delete { name } => commands::delete_session(&client, &name).await,
        },
        Commands::Inject { session, message } => commands::inject(&client, &session, &message).await,
    }
}
