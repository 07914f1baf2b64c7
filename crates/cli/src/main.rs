//! Simonia CLI - Database migrations, catalog seeding and maintenance tools.
//!
//! # Usage
//!
//! ```bash
//! # Run shop and session store migrations
//! simonia migrate
//!
//! # Seed the default catalog (idempotent)
//! simonia seed
//!
//! # Seed from a YAML catalog
//! simonia seed --file catalog.yaml
//!
//! # Hash a password for ADMIN_PASSWORD_HASH (reads stdin without --password)
//! simonia hash-password
//!
//! # Inspect and retry the email outbox
//! simonia outbox stats
//! simonia outbox retry-failed
//! ```
//!
//! # Environment Variables
//!
//! - `SIMONIA_DATABASE_URL` (or `DATABASE_URL`) - `PostgreSQL` connection string

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "simonia")]
#[command(author, version, about = "Simonia shop CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate,
    /// Seed categories and products
    Seed {
        /// YAML catalog to load instead of the built-in one
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
    /// Print an Argon2 hash for `ADMIN_PASSWORD_HASH`
    HashPassword {
        /// Password to hash (read from stdin when omitted)
        #[arg(short, long)]
        password: Option<String>,
    },
    /// Email outbox maintenance
    Outbox {
        #[command(subcommand)]
        action: OutboxAction,
    },
}

#[derive(Subcommand)]
enum OutboxAction {
    /// Show pending, sent and failed counts
    Stats,
    /// Give failed messages a fresh set of attempts
    RetryFailed,
}

#[tokio::main]
async fn main() {
    // Initialize tracing
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
        Commands::Seed { file } => commands::seed::run(file.as_deref()).await?,
        Commands::HashPassword { password } => commands::password::run(password)?,
        Commands::Outbox { action } => match action {
            OutboxAction::Stats => commands::outbox::stats().await?,
            OutboxAction::RetryFailed => commands::outbox::retry_failed().await?,
        },
    }
    Ok(())
}
