//! CLI argument parsing and structure definitions

use clap::{Parser, Subcommand, ValueEnum};

use super::commands::{EvaluateArgs, PredictArgs, TrainArgs};

/// Fine-grained entity typing: train, evaluate and predict
#[derive(Parser, Debug)]
#[command(name = "netype")]
#[command(
    author,
    version,
    about = "Fine-grained entity typing with label embeddings",
    long_about = r#"
netype - neural fine-grained entity typing

Mentions are encoded with word + character BiLSTMs and a BiLSTM over
precomputed contextual embeddings, projected into a label-embedding space
and scored against every type at four granularities (train, test, level1,
level2).

EXAMPLES:
  netype train --config run.toml
  netype evaluate --config run.toml
  netype predict --config run.toml --input mentions.jsonl
"#
)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Command to run
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Train with early stopping on dev micro-F1
    #[command(visible_alias = "t")]
    Train(TrainArgs),

    /// Run the test, level-1 and level-2 evaluations on a checkpoint
    #[command(visible_alias = "e")]
    Evaluate(EvaluateArgs),

    /// Print predicted types for a JSONL file of mentions
    #[command(visible_alias = "p")]
    Predict(PredictArgs),
}

/// Output format selection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text (default)
    #[default]
    Human,
    /// One JSON document
    Json,
    /// JSON lines (one object per line)
    Jsonl,
}
