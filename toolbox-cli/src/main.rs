//! toolbox CLI: inspect dataset splits and drive training loops.

mod commands;

use clap::Parser;
use std::path::PathBuf;

/// toolbox: dataset splitting and training-loop helpers
#[derive(Parser, Debug)]
#[command(name = "toolbox", version, about, long_about = None)]
struct Cli {
    /// Workspace directory (holds `.toolbox/config.toml`)
    #[arg(short, long, default_value = ".")]
    workspace: PathBuf,

    /// Directory for JSON log files
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Increase verbosity (-v, -vv)
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
    /// Load a dataset, split it and print its layout
    Split {
        /// A CSV file, or one or more folders of files
        #[arg(required = true)]
        sources: Vec<PathBuf>,

        /// Dataset name (defaults to the file or folder name)
        #[arg(long)]
        name: Option<String>,

        /// Subset with a fixed number of records, e.g. `train=800`
        #[arg(long = "count", value_parser = parse_count)]
        counts: Vec<(String, usize)>,

        /// Subset with a share of the records, e.g. `train=0.8`
        #[arg(long = "fraction", value_parser = parse_fraction)]
        fractions: Vec<(String, f64)>,

        /// Shuffle records before splitting
        #[arg(long)]
        shuffle: bool,

        /// Seed for the shuffle (overrides `data.shuffle_seed`)
        #[arg(long)]
        seed: Option<u64>,

        /// File suffixes to collect from folders, e.g. `--ext .png`
        #[arg(long = "ext")]
        extensions: Vec<String>,
    },
    /// Run the training loop on a synthetic regression task
    Train {
        /// Number of epochs (overrides `training.nr_of_epochs`)
        #[arg(long)]
        epochs: Option<usize>,

        /// Number of synthetic samples
        #[arg(long, default_value = "256")]
        samples: usize,

        /// Samples per batch
        #[arg(long, default_value = "32")]
        batch_size: usize,

        /// Learning rate (overrides `training.sgd.lr`)
        #[arg(long)]
        lr: Option<f64>,

        /// Continue an interrupted run from `.toolbox/checkpoint.json`
        #[arg(long)]
        resume: bool,

        /// Pause after each batch, in milliseconds
        #[arg(long, default_value = "0")]
        step_delay_ms: u64,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(clap::Subcommand, Debug)]
enum ConfigAction {
    /// Create default configuration file
    Init,
    /// Show current configuration
    Show,
}

fn parse_pair(raw: &str) -> Result<(String, &str), String> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=VALUE, got '{raw}'"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("missing subset name in '{raw}'"));
    }
    Ok((name.to_string(), value.trim()))
}

fn parse_count(raw: &str) -> Result<(String, usize), String> {
    let (name, value) = parse_pair(raw)?;
    let count = value
        .parse()
        .map_err(|e| format!("invalid count '{value}': {e}"))?;
    Ok((name, count))
}

fn parse_fraction(raw: &str) -> Result<(String, f64), String> {
    let (name, value) = parse_pair(raw)?;
    let fraction = value
        .parse()
        .map_err(|e| format!("invalid fraction '{value}': {e}"))?;
    Ok((name, fraction))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let filter = toolbox_ml::logging::filter_for(cli.verbose, cli.quiet);
    let _guard = toolbox_ml::logging::init(filter, cli.log_dir.as_deref());

    let workspace = cli
        .workspace
        .canonicalize()
        .unwrap_or_else(|_| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

    commands::handle_command(cli.command, &workspace).await
}
