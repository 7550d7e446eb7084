mod commands;
mod config;

use clap::{Parser, Subcommand};
use colored::Colorize;
use commands::{hash, init, scan, watch, HashArgs, InitArgs, ScanArgs, WatchArgs};
use config::Config;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Plasma CLI - track and hash the files of a Plasma project
#[derive(Parser, Debug)]
#[command(name = "plasma")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Project config file (defaults to ./plasma.config.json)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log debug output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Initialize a new Plasma project
    Init(InitArgs),

    /// Scan the data directories and update the status cache
    Scan(ScanArgs),

    /// Watch the data directories and print changes
    Watch(WatchArgs),

    /// Print content hashes of files inside the data directories
    Hash(HashArgs),
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let cwd = std::env::current_dir()?;
    let config_path = Config::locate(cli.config.as_deref(), &cwd);

    match cli.command {
        Command::Init(args) => init(args, &config_path),
        Command::Scan(args) => scan(args, &config_path),
        Command::Watch(args) => watch(args, &config_path),
        Command::Hash(args) => hash(args, &config_path),
    }
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(err) = run(cli) {
        eprintln!();
        eprintln!("{} {:#}", "Error:".red().bold(), err);
        eprintln!();
        std::process::exit(1);
    }
}
