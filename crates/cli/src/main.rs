//! Cartwright CLI - Database migrations and payment outbox tools.
//!
//! # Usage
//!
//! ```bash
//! # Run database migrations
//! cw-cli migrate
//!
//! # Send payment provider calls left pending in the outbox
//! cw-cli outbox dispatch --limit 50
//! ```
//!
//! # Commands
//!
//! - `migrate` - Run database migrations
//! - `outbox dispatch` - Dispatch pending payment outbox messages

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "cw-cli")]
#[command(author, version, about = "Cartwright CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate,
    /// Manage the payment outbox
    Outbox {
        #[command(subcommand)]
        action: OutboxAction,
    },
}

#[derive(Subcommand)]
enum OutboxAction {
    /// Dispatch pending messages, oldest first
    Dispatch {
        /// Maximum number of messages to send
        #[arg(short, long, default_value_t = 100)]
        limit: i64,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    let result: Result<(), Box<dyn std::error::Error>> = run(cli).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Migrate => commands::migrate::run().await?,
        Commands::Outbox { action } => match action {
            OutboxAction::Dispatch { limit } => commands::outbox::dispatch(limit).await?,
        },
    }
    Ok(())
}
