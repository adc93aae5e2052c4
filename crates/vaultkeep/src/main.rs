mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::error;
use tracing_subscriber::EnvFilter;

use vaultkeep::config::DEFAULT_CONFIG_FILE;

// ============================================================================
// CLI Types
// ============================================================================

/// vaultkeep - inspect and maintain stored vault records
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE, global = true)]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print an owner's pages and items
    Show {
        /// Owner key
        owner: String,
    },

    /// Empty every page of an owner's vault
    Clear {
        /// Owner key
        owner: String,
    },

    /// Rewrite every stored record in the current format
    Migrate {
        /// Report what would be rewritten without writing
        #[arg(long)]
        dry_run: bool,
    },
}

// ============================================================================
// Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> std::process::ExitCode {
    init_tracing();

    match run().await {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            std::process::ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Show { owner } => commands::show::run(&cli.config, &owner).await,
        Commands::Clear { owner } => commands::clear::run(&cli.config, &owner).await,
        Commands::Migrate { dry_run } => commands::migrate::run(&cli.config, dry_run).await,
    }
}

// ============================================================================
// Initialization
// ============================================================================

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
