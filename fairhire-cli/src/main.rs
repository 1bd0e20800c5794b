//! fairhire CLI: bias audit and mitigation for hiring classifiers.

mod commands;

use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// fairhire: measure and reduce bias in hiring decisions
#[derive(Parser, Debug)]
#[command(name = "fairhire", version, about, long_about = None)]
struct Cli {
    /// Workspace directory
    #[arg(short, long, default_value = ".")]
    workspace: PathBuf,

    /// Seed for weight initialization and batch shuffling
    #[arg(long, global = true)]
    seed: Option<u64>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Train the baseline classifier and save scaler + classifier artifacts
    Train {
        /// Recruitment CSV with a HiringDecision column
        #[arg(short, long)]
        data: PathBuf,
    },
    /// Score a candidate (or a CSV batch) for gender and age bias
    Evaluate {
        /// Candidate record as inline JSON, or @path to a JSON file
        #[arg(short, long, conflicts_with = "batch", required_unless_present = "batch")]
        record: Option<String>,
        /// Hiring decision for the candidate (0 or 1)
        #[arg(long, default_value_t = 0)]
        decision: u8,
        /// Recruitment CSV to score as one batch
        #[arg(short, long)]
        batch: Option<PathBuf>,
    },
    /// Report fairness and accuracy of the saved classifier on a labeled CSV
    Audit {
        #[arg(short, long)]
        data: PathBuf,
    },
    /// Reweigh, train the adversarially debiased classifier and report results
    Mitigate {
        #[arg(short, long)]
        data: PathBuf,
        /// Save the debiased classifier as the current artifacts
        #[arg(long)]
        save: bool,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(clap::Subcommand, Debug)]
enum ConfigAction {
    /// Create a default .fairhire/config.toml in the workspace
    Init,
    /// Print the effective configuration
    Show,
}

/// Stderr gets human-readable output at the requested level; a daily JSON
/// log under the platform data dir always records debug and above.
///
/// The returned guard flushes the file writer when dropped.
fn init_logging(verbose: u8, quiet: bool) -> tracing_appender::non_blocking::WorkerGuard {
    let level = match (verbose, quiet) {
        (0, true) => "error",
        (0, false) => "info",
        (1, _) => "debug",
        _ => "trace",
    };

    let log_dir = directories::ProjectDirs::from("dev", "fairhire", "fairhire")
        .map(|dirs| dirs.data_dir().join("logs"))
        .unwrap_or_else(|| PathBuf::from("."));
    let _ = std::fs::create_dir_all(&log_dir);
    let (writer, guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::daily(&log_dir, "fairhire.log"));

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr)
                .with_filter(EnvFilter::new(level)),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(writer)
                .with_filter(EnvFilter::new("fairhire_ml=debug,fairhire=debug")),
        )
        .init();
    guard
}

fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    let _log_guard = init_logging(cli.verbose, cli.quiet);

    let workspace = match cli.workspace.canonicalize() {
        Ok(path) => path,
        Err(_) => std::env::current_dir()?,
    };
    commands::handle_command(cli.command, &workspace, cli.seed)
}
