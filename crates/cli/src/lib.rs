//! # Codecity CLI
//!
//! Thin front end over the orchestrator. The run document goes to stdout
//! (or `--output`); logs and the per-adapter summary go to stderr.

mod admin;
mod run;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use codecity_orchestrator::{Environment, OrchestratorError, RunConfig};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

/// Name of the configuration file picked up from the repository root.
pub const DEFAULT_CONFIG_FILE: &str = "codecity.toml";

const EXIT_FAILURE: u8 = 1;
const EXIT_CONFIG: u8 = 2;
const EXIT_CANCELLED: u8 = 130;

#[derive(Parser)]
#[command(name = "codecity")]
#[command(about = "Aggregate code analyzers into one correlated, projected report", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet mode: log only warnings/errors
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every configured adapter and emit the run document
    Run(RunArgs),

    /// Inspect or reset the incremental marker
    #[command(subcommand)]
    State(StateCommand),

    /// Inspect or prune the result cache
    #[command(subcommand)]
    Cache(CacheCommand),

    /// List registered adapters or probe configured ones
    #[command(subcommand)]
    Adapters(AdaptersCommand),

    /// Print the JSON Schema of the run document
    Schema,
}

#[derive(Args)]
struct RunArgs {
    /// Repository root
    #[arg(default_value = ".")]
    path: PathBuf,

    #[command(flatten)]
    config: ConfigArgs,

    /// Write the run document here instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Reproducible mode: stable run id, zeroed timestamps
    #[arg(long)]
    seed: Option<u64>,

    /// Bypass the result cache for this run
    #[arg(long)]
    no_cache: bool,
}

#[derive(Args, Clone)]
struct ConfigArgs {
    /// Run configuration (defaults to <path>/codecity.toml when present)
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum StateCommand {
    /// Print the marker as JSON (`null` before the first run)
    Show {
        #[arg(default_value = ".")]
        path: PathBuf,
    },
    /// Delete the marker so the next run is a full pass
    Clear {
        #[arg(default_value = ".")]
        path: PathBuf,
    },
}

#[derive(Subcommand)]
enum CacheCommand {
    /// Entry count and size of the disk tier
    Stats {
        #[command(flatten)]
        config: ConfigArgs,
    },
    /// Remove every cached entry
    Clear {
        #[command(flatten)]
        config: ConfigArgs,
    },
    /// Remove the entries computed for one repository
    Invalidate {
        path: PathBuf,
        #[command(flatten)]
        config: ConfigArgs,
    },
}

#[derive(Subcommand)]
enum AdaptersCommand {
    /// Describe every adapter type in the registry
    List,
    /// Probe the adapters configured for a repository
    Probe {
        #[arg(default_value = ".")]
        path: PathBuf,
        #[command(flatten)]
        config: ConfigArgs,
    },
}

fn init_logging(verbose: bool, quiet: bool) {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if quiet {
        builder.filter_level(log::LevelFilter::Warn);
    } else if verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder.target(env_logger::Target::Stderr).init();
}

/// `--config`, else `<root>/codecity.toml`, else defaults.
fn load_config(args: &ConfigArgs, root: Option<&Path>) -> Result<RunConfig> {
    if let Some(path) = &args.config {
        return Ok(RunConfig::load(path)?);
    }
    if let Some(candidate) = root.map(|r| r.join(DEFAULT_CONFIG_FILE)) {
        if candidate.is_file() {
            log::debug!("Using {}", candidate.display());
            return Ok(RunConfig::load(&candidate)?);
        }
    }
    Ok(RunConfig::default())
}

fn exit_code_for(err: &anyhow::Error) -> u8 {
    match err.downcast_ref::<OrchestratorError>() {
        Some(OrchestratorError::Cancelled) => EXIT_CANCELLED,
        Some(e) if e.is_config() => EXIT_CONFIG,
        _ => EXIT_FAILURE,
    }
}

pub async fn main_entry() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);
    let env = Environment::from_env();

    let outcome = match cli.command {
        Commands::Run(args) => run::run(args, env).await,
        Commands::State(cmd) => admin::state(cmd).await,
        Commands::Cache(cmd) => admin::cache(cmd, env),
        Commands::Adapters(cmd) => admin::adapters(cmd, env).await,
        Commands::Schema => admin::schema(),
    };

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err:#}");
            ExitCode::from(exit_code_for(&err))
        }
    }
}
