use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod completion;
mod dispatch;
mod flows;
mod render;

use completion::CliCompletionShell;

#[derive(Parser, Debug)]
#[command(name = "commerce")]
#[command(about = "Install Commerce or upgrade an existing Market schema", long_about = None)]
struct Cli {
    /// Store prefix (defaults to the per-user location).
    #[arg(long, global = true)]
    prefix: Option<PathBuf>,
    /// Config file (defaults to `<prefix>/commerce.toml`).
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create the Commerce schema, upgrading Market 0.8.09 when present.
    Install {
        #[arg(long)]
        host_version: String,
        #[arg(long)]
        dry_run: bool,
    },
    /// List the upgrade steps in execution order.
    Plan,
    Status,
    #[command(subcommand)]
    Registry(RegistryCommands),
    #[command(subcommand)]
    Locale(LocaleCommands),
    /// Load the Market 0.8.09 fixture into an empty store for a rehearsal.
    SeedLegacy,
    Repair,
    Doctor,
    Completions {
        #[arg(value_enum)]
        shell: CliCompletionShell,
    },
}

#[derive(Subcommand, Debug)]
enum RegistryCommands {
    Add { name: String, version: String },
    List,
    Remove { name: String },
}

#[derive(Subcommand, Debug)]
enum LocaleCommands {
    Add { locale: String },
}

fn init_tracing(verbose: bool) {
    let fallback = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    flows::install_panic_hook();
    dispatch::run_cli(cli)
}

#[cfg(test)]
mod tests;
