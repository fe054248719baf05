//! keysync CLI
//!
//! Command-line access to a file-backed keysync store.
//!
//! # Commands
//!
//! - `get` - Print the raw value stored under a key
//! - `set` - Store a JSON value under a key
//! - `rm` - Remove a key

mod commands;

use clap::{Parser, Subcommand};
use commands::StoreOptions;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// keysync command-line store tools.
#[derive(Parser)]
#[command(name = "keysync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the store directory
    #[arg(global = true, short, long)]
    dir: Option<PathBuf>,

    /// Use the encrypted store
    #[arg(global = true, short, long)]
    secure: bool,

    /// Passphrase for the encrypted store
    #[arg(global = true, long, env = "KEYSYNC_PASSPHRASE", hide_env_values = true)]
    passphrase: Option<String>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the raw value stored under a key
    Get {
        /// Key to read
        key: String,
    },

    /// Store a JSON value under a key
    Set {
        /// Key to write
        key: String,

        /// JSON text to store
        value: String,
    },

    /// Remove a key
    Rm {
        /// Key to remove
        key: String,
    },

    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let options = |command: &str| -> Result<StoreOptions, String> {
        let dir = cli
            .dir
            .clone()
            .ok_or_else(|| format!("Store directory required for {command}"))?;
        Ok(StoreOptions {
            dir,
            secure: cli.secure,
            passphrase: cli.passphrase.clone(),
        })
    };

    match &cli.command {
        Commands::Get { key } => {
            commands::get::run(&options("get")?, key).await?;
        }
        Commands::Set { key, value } => {
            commands::set::run(&options("set")?, key, value).await?;
        }
        Commands::Rm { key } => {
            commands::rm::run(&options("rm")?, key).await?;
        }
        Commands::Version => {
            println!("keysync CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("keysync engine v{}", keysync_engine::VERSION);
        }
    }

    Ok(())
}
