//! Kiln CLI: drives input signing for incremental builds.
//!
//! Provides `kiln sign` to compute step signatures from input files and
//! `kiln cache` to inspect or clear the persistent digest cache.

#![warn(missing_docs)]

mod cache_cmd;
mod logging;
mod project;
mod sign;

use std::process;

use clap::{ArgAction, Parser, Subcommand, ValueEnum};

/// Kiln: incremental build input signatures.
#[derive(Parser, Debug)]
#[command(name = "kiln", version, about = "Kiln incremental build signatures")]
pub struct Cli {
    /// Log only errors and skip status messages; requested results
    /// (signatures, `--stats`, `cache info`) are still printed.
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Increase log verbosity (`-v` debug, `-vv` trace).
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Path to a custom `kiln.toml` configuration file.
    #[arg(long, global = true)]
    pub config: Option<String>,

    /// The subcommand to run.
    #[command(subcommand)]
    pub command: Command,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Compute signatures for one or more build steps.
    Sign(SignArgs),
    /// Inspect or clear the persistent digest cache.
    #[command(subcommand)]
    Cache(CacheCommand),
}

/// Arguments for the `kiln sign` subcommand.
#[derive(Parser, Debug)]
pub struct SignArgs {
    /// A named step and its inputs, as `NAME=FILE[,FILE...]`. Repeatable.
    #[arg(long = "step", value_name = "NAME=FILES")]
    pub steps: Vec<String>,

    /// Input files of an unnamed step, signed in the order given.
    pub files: Vec<String>,

    /// Output format for signatures.
    #[arg(short, long, value_enum, default_value_t = ReportFormat::Text)]
    pub format: ReportFormat,

    /// Also report cache and recompute counters.
    #[arg(long)]
    pub stats: bool,

    /// Number of worker threads (defaults to the number of CPUs).
    #[arg(short, long)]
    pub jobs: Option<usize>,
}

/// `kiln cache` subcommands.
#[derive(Subcommand, Debug)]
pub enum CacheCommand {
    /// Show where the digest cache lives and how many entries it holds.
    Info,
    /// Delete the persisted digest cache.
    Clear,
}

/// Signature output format.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ReportFormat {
    /// One `NAME  SIGNATURE` line per step.
    Text,
    /// Machine-readable JSON output.
    Json,
}

/// Global settings derived from CLI flags.
pub struct GlobalArgs {
    /// Whether to skip status messages such as `cache clear` confirmations.
    pub quiet: bool,
    /// Optional path to a custom config file.
    pub config: Option<String>,
}

fn main() {
    let cli = Cli::parse();
    logging::init_logging(cli.verbose, cli.quiet);

    let global = GlobalArgs {
        quiet: cli.quiet,
        config: cli.config,
    };

    let result = match cli.command {
        Command::Sign(ref args) => sign::run(args, &global),
        Command::Cache(ref cmd) => cache_cmd::run(cmd, &global),
    };

    match result {
        Ok(code) => process::exit(code),
        Err(e) => {
            log::error!("{e}");
            eprintln!("error: {e}");
            process::exit(1);
        }
    }
}
