//! Command line front end for typeflow

mod commands;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "typeflow", version, about = "Recover data-types over p-code function graphs")]
struct Cli {
    /// More logging (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run type recovery and print the committed type of every value
    Infer {
        #[command(flatten)]
        run: RunArgs,
        /// Stop after this many rounds even if types are still changing
        #[arg(long)]
        rounds: Option<u32>,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Run type recovery to the end and print the analysis report as JSON
    Report {
        #[command(flatten)]
        run: RunArgs,
        /// Only list values that have a name in the graph file
        #[arg(long)]
        named_only: bool,
    },
    /// Run type recovery to the end and fail if the result is inconsistent
    Check {
        #[command(flatten)]
        run: RunArgs,
    },
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Function graph in JSON
    graph: PathBuf,
    /// Pass configuration in TOML
    #[arg(long)]
    config: Option<PathBuf>,
    /// Override the round cap from the configuration
    #[arg(long)]
    max_rounds: Option<u32>,
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Command::Infer { run, rounds, json } => commands::infer(&run, rounds, json),
        Command::Report { run, named_only } => commands::report(&run, named_only),
        Command::Check { run } => commands::check(&run),
    }
}
