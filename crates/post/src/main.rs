//! Post CLI.
//!
//! Provides commands for:
//! - `build`: Compile the project and write the static output
//! - `manifest`: Print the route manifest

mod commands;
mod error;
mod output;

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use commands::{BuildArgs, ManifestArgs};
use output::Output;

/// Post - front-end framework compiler.
#[derive(Parser)]
#[command(name = "post", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile the project and write it to the output directory.
    Build(BuildArgs),
    /// Print the route manifest as JSON.
    Manifest(ManifestArgs),
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let output = Output::new();

    // --verbose enables INFO level, otherwise use RUST_LOG
    let verbose = matches!(&cli.command, Commands::Build(args) if args.verbose);
    let filter = if verbose {
        EnvFilter::new("info")
    } else {
        EnvFilter::from_default_env()
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Commands::Build(args) => args.execute(),
        Commands::Manifest(args) => args.execute(),
    };

    if let Err(err) = result {
        output.failed(&err);
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
