//! docsync CLI
//!
//! Command-line tools for docsync collections stored as JSON files.
//!
//! # Commands
//!
//! - `compile` - Show the compiled form of a query string
//! - `find` - Read documents from a collection file
//! - `sync` - Replace a collection's contents with a JSON array
//! - `version` - Show version information

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// docsync command-line tools.
#[derive(Parser)]
#[command(name = "docsync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the collection file (a JSON array of documents)
    #[arg(global = true, short, long)]
    store: Option<PathBuf>,

    /// Name of the identity field
    #[arg(global = true, long, default_value = docsync_query::DEFAULT_IDENTITY_FIELD)]
    identity_field: String,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a query string and print its native JSON form
    Compile {
        /// The query string, e.g. "age>=21&$sort=-age&$limit=10"
        query: String,
    },

    /// Print the documents selected by a query
    Find {
        /// The query string (empty selects everything)
        #[arg(default_value = "")]
        query: String,
    },

    /// Replace the collection's contents with the items of a JSON array
    Sync {
        /// File holding the JSON array of items
        #[arg(short, long)]
        input: PathBuf,

        /// Query whose filter limits which documents may be deleted
        #[arg(long, default_value = "")]
        scope: String,

        /// Maximum number of item writes in flight
        #[arg(short, long, default_value_t = docsync_sync_engine::DEFAULT_MAX_CONCURRENCY)]
        concurrency: usize,
    },

    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Compile { query } => {
            commands::compile::run(&query, &cli.identity_field)?;
        }
        Commands::Find { query } => {
            let store = cli.store.ok_or("Collection file required for find")?;
            commands::find::run(&store, &cli.identity_field, &query).await?;
        }
        Commands::Sync {
            input,
            scope,
            concurrency,
        } => {
            let store = cli.store.ok_or("Collection file required for sync")?;
            commands::sync::run(&store, &cli.identity_field, &input, &scope, concurrency).await?;
        }
        Commands::Version => {
            println!("docsync CLI v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
