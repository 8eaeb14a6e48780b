//! netype - fine-grained entity typing CLI
//!
//! # Usage
//!
//! ```bash
//! # Train, keeping the best dev checkpoint, then score test/level splits
//! netype train -c run.toml --progress
//!
//! # Re-evaluate a saved checkpoint
//! netype evaluate -c run.toml --format json
//!
//! # Type mentions from a JSONL file
//! netype predict -c run.toml --input mentions.jsonl
//! ```
//!
//! Log verbosity follows `RUST_LOG` (default `info`).

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use netype::cli::commands::{cmd_evaluate, cmd_predict, cmd_train};
use netype::cli::output::format_error;
use netype::cli::{Cli, Commands};

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let (operation, result) = match cli.command {
        Commands::Train(args) => ("train", cmd_train(args)),
        Commands::Evaluate(args) => ("evaluate", cmd_evaluate(args)),
        Commands::Predict(args) => ("predict", cmd_predict(args)),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", format_error(operation, &e));
            ExitCode::FAILURE
        }
    }
}
