//! editsync CLI
//!
//! Maintenance tools for the editor's local data.
//!
//! # Commands
//!
//! - `inspect` - Display table versions and row counts of a user's database
//! - `migrate` - Bring a user's database up to the current schema version
//! - `clear` - Delete every row of every managed table
//! - `download` - Download blobs from the server in parallel

mod commands;

use clap::{Parser, Subcommand};
use editsync_store::{StoreConfig, UserIdentity};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// editsync command-line tools.
#[derive(Parser)]
#[command(name = "editsync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Directory holding the per-user data directories
    #[arg(global = true, short, long)]
    root: Option<PathBuf>,

    /// User whose database to open
    #[arg(global = true, short, long)]
    user: Option<String>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Display table versions and row counts
    Inspect {
        /// Also list resources with revisions not yet uploaded
        #[arg(short = 'p', long)]
        pending: bool,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Bring the database up to the current schema version
    Migrate,

    /// Delete every row of every managed table
    Clear {
        /// Confirm the deletion
        #[arg(long)]
        yes: bool,
    },

    /// Download blobs from the server
    Download {
        /// Server base URL
        #[arg(short, long)]
        server: String,

        /// Directory the blobs are written to
        #[arg(short, long)]
        out: PathBuf,

        /// Maximum number of parallel downloads
        #[arg(short = 'c', long, default_value_t = editsync_sync::DEFAULT_MAX_CONNECTIONS)]
        max_connections: usize,

        /// Blob keys to download
        #[arg(required = true)]
        keys: Vec<String>,
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
        Commands::Inspect { pending, format } => {
            let (config, user) = target(cli.root, cli.user, "inspect")?;
            commands::inspect::run(config, &user, pending, &format)?;
        }
        Commands::Migrate => {
            let (config, user) = target(cli.root, cli.user, "migrate")?;
            commands::migrate::run(config, &user)?;
        }
        Commands::Clear { yes } => {
            let (config, user) = target(cli.root, cli.user, "clear")?;
            commands::clear::run(config, &user, yes)?;
        }
        Commands::Download {
            server,
            out,
            max_connections,
            keys,
        } => {
            commands::download::run(&server, &out, max_connections, keys)?;
        }
        Commands::Version => {
            println!("editsync CLI v{}", env!("CARGO_PKG_VERSION"));
            println!(
                "Schema version {}",
                editsync_store::schema::SCHEMA_VERSION
            );
        }
    }

    Ok(())
}

fn target(
    root: Option<PathBuf>,
    user: Option<String>,
    command: &str,
) -> Result<(StoreConfig, UserIdentity), String> {
    let root = root.ok_or_else(|| format!("Data root required for {command}"))?;
    let user = user.ok_or_else(|| format!("User name required for {command}"))?;
    Ok((StoreConfig::new(root), UserIdentity::new(user)))
}
