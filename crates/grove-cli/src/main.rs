//! # Grove CLI
//!
//! Command-line driver for the Grove source tree indexer.
//!
//! ## Commands
//!
//! - `grove index <root>` - Register one source tree and print a summary
//! - `grove config` - Show the effective configuration
//!
//! ## Example Usage
//!
//! ```bash
//! # Walk a checkout recursively
//! grove index ~/src/linux --name linux --metadata '{"commit": "v6.9"}'
//!
//! # Register exactly the files git tracks, in git's order
//! git -C ~/src/linux ls-files | grove index ~/src/linux --files-from -
//! ```

mod app;
mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Grove - register source trees with a code search index
#[derive(Parser)]
#[command(name = "grove")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register the files of a source tree
    Index {
        /// Repository root to index
        root: PathBuf,

        /// Tree name (defaults to the root directory name)
        #[arg(short, long)]
        name: Option<String>,

        /// Metadata attached to the tree, as a JSON document
        #[arg(short, long)]
        metadata: Option<String>,

        /// Read an ordered list of relative paths from a file ("-" for stdin)
        #[arg(short, long, conflicts_with = "start")]
        files_from: Option<PathBuf>,

        /// Start the recursive walk at this path, relative to the root
        #[arg(short, long)]
        start: Option<PathBuf>,

        /// Override the configured maximum file size in bytes
        #[arg(long)]
        max_file_size: Option<u64>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        output: OutputFormat,
    },

    /// Show the effective configuration
    Config {
        /// Only print the default configuration file location
        #[arg(long)]
        path: bool,
    },
}

#[derive(Clone, Debug, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("Unknown output format: {}", s)),
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = match &cli.config {
        Some(path) => grove_core::Config::load_from(path)?,
        None => grove_core::Config::load()?,
    };

    // Setup logging
    let log_level = if cli.quiet {
        "error".to_string()
    } else {
        match cli.verbose {
            0 => config.general.log_level.clone(),
            1 => "debug".to_string(),
            _ => "trace".to_string(),
        }
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level)))
        .init();

    // Execute command
    match cli.command {
        Commands::Index {
            root,
            name,
            metadata,
            files_from,
            start,
            max_file_size,
            output,
        } => commands::index::run(
            config,
            commands::index::IndexArgs {
                root,
                name,
                metadata,
                files_from,
                start,
                max_file_size,
                output,
            },
        ),
        Commands::Config { path } => commands::config::run(config, path),
    }
}
