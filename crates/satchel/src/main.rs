//! Satchel - inspect and edit stored sessions
//!
//! Main entry point for the satchel CLI.

use std::path::PathBuf;

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use tracing::warn;

mod commands;

use commands::{config, sessions};

// ─────────────────────────────────────────────────────────────────────────────
// CLI Structure
// ─────────────────────────────────────────────────────────────────────────────

/// Satchel - inspect and edit stored sessions
#[derive(Parser)]
#[command(name = "satchel")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output as JSON (for scripting)
    #[arg(long, global = true)]
    pub json: bool,

    /// Config file to use instead of the discovered layers
    #[arg(short, long, global = true, env = "SATCHEL_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show every key and value of a session
    Show(sessions::IdArgs),

    /// List the keys of a session
    Keys(sessions::IdArgs),

    /// Set a key (the value is parsed as JSON, falling back to a string)
    Set(sessions::SetArgs),

    /// Delete a key
    Delete(sessions::DeleteArgs),

    /// List stored session identities
    List,

    /// Print the resolved configuration
    Config,
}

// ─────────────────────────────────────────────────────────────────────────────
// Main
// ─────────────────────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Console (human-readable, stderr) + rolling JSON file
    let filter = if cli.verbose {
        "satchel=debug,satchel_session=debug,satchel_config=debug,info"
    } else {
        "satchel=info,satchel_session=warn,satchel_config=warn,warn"
    };

    let log_dir = satchel_config::xdg_config_dir()
        .map(|d| d.join("logs"))
        .unwrap_or_else(|| PathBuf::from("logs"));
    let file_appender = tracing_appender::rolling::daily(&log_dir, "satchel.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    use tracing_subscriber::prelude::*;
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_writer(std::io::stderr)
                .with_filter(tracing_subscriber::EnvFilter::new(filter)),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(non_blocking)
                .with_filter(tracing_subscriber::EnvFilter::new(
                    "satchel=trace,satchel_session=trace,satchel_config=trace,info",
                )),
        )
        .init();

    let (config, sources) = match &cli.config {
        Some(path) => {
            let config = satchel_config::load_config_file(path)
                .with_context(|| format!("loading {}", path.display()))?;
            (config, vec![path.clone()])
        }
        None => {
            let loaded = satchel_config::load_config(None)?;
            for warning in &loaded.warnings {
                warn!("{}", warning);
            }
            let sources = loaded.loaded_from().into_iter().map(PathBuf::from).collect();
            (loaded.config, sources)
        }
    };

    let ctx = commands::Context {
        config,
        sources,
        json_output: cli.json,
        verbose: cli.verbose,
    };

    match cli.command {
        Commands::Show(args) => sessions::show(args, &ctx),
        Commands::Keys(args) => sessions::keys(args, &ctx),
        Commands::Set(args) => sessions::set(args, &ctx),
        Commands::Delete(args) => sessions::delete(args, &ctx),
        Commands::List => sessions::list(&ctx),
        Commands::Config => config::run(&ctx),
    }
}
