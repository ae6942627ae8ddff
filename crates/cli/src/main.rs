//! Marketplace CLI - database migrations and catalog seeding.
//!
//! # Usage
//!
//! ```bash
//! # Run database migrations
//! mkt migrate
//!
//! # Load users and products from a JSON file
//! mkt seed demos/seed.json
//! ```
//!
//! Both commands read `MARKETPLACE_DATABASE_URL` (or `DATABASE_URL`).

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "mkt")]
#[command(author, version, about = "Affiliate marketplace CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate,
    /// Seed users and products from a JSON file
    Seed {
        /// Path to the seed file
        file: String,
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
        Commands::Seed { file } => {
            let summary = commands::seed::run(&file).await?;
            tracing::info!(
                users_created = summary.users_created,
                users_skipped = summary.users_skipped,
                products_created = summary.products_created,
                "Seeding complete"
            );
        }
    }
    Ok(())
}
