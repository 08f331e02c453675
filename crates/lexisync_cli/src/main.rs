//! LexiSync CLI
//!
//! Command-line tools for LexiSync.
//!
//! # Commands
//!
//! - `replay` - Page through a record fixture to debug checkpoints
//! - `export` - Run the definition snapshot export over a fixture
//! - `version` - Show version information

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// LexiSync command-line tools.
#[derive(Parser)]
#[command(name = "lexisync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Page through a JSON record fixture
    Replay {
        /// Fixture file with a top-level "records" array
        #[arg(short, long)]
        input: PathBuf,

        /// Page size
        #[arg(short, long, default_value = "100")]
        limit: usize,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Export definition snapshot chunks from a JSON fixture
    Export {
        /// Fixture file with a top-level "definitions" array
        #[arg(short, long)]
        input: PathBuf,

        /// Language pair as from:to
        #[arg(long)]
        pair: String,

        /// Output directory
        #[arg(short, long)]
        output: PathBuf,

        /// Entries per chunk
        #[arg(short, long, default_value = "5000")]
        chunk_size: usize,

        /// Provider name used in chunk file names
        #[arg(short, long, default_value = "echo")]
        provider: String,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Replay {
            input,
            limit,
            format,
        } => {
            commands::replay::run(&input, limit, &format)?;
        }
        Commands::Export {
            input,
            pair,
            output,
            chunk_size,
            provider,
        } => {
            commands::export::run(&input, &pair, &output, chunk_size, &provider)?;
        }
        Commands::Version => {
            println!("LexiSync CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("LexiSync Core v{}", lexisync_core::VERSION);
        }
    }

    Ok(())
}
