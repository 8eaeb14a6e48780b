//! Evaluate command

use clap::Parser;
use std::collections::BTreeMap;
use std::path::PathBuf;

use super::super::output::{format_metrics, write_output};
use super::super::parser::OutputFormat;
use super::{load_trainer, restore};
use crate::eval::TypingMetrics;
use crate::training::Trainer;
use crate::types::Granularity;

/// Evaluate a checkpoint on the test and level splits
#[derive(Parser, Debug)]
pub struct EvaluateArgs {
    /// Run configuration (TOML)
    #[arg(short, long, value_name = "PATH")]
    pub config: PathBuf,

    /// Checkpoint to evaluate (defaults to the run's best checkpoint)
    #[arg(long, value_name = "PATH")]
    pub checkpoint: Option<PathBuf>,

    /// Output format
    #[arg(long, default_value = "human")]
    pub format: OutputFormat,

    /// Write the report to a file instead of stdout
    #[arg(short, long, value_name = "PATH")]
    pub output: Option<PathBuf>,
}

/// Run every evaluation whose split is configured.
pub fn evaluate_configured(trainer: &Trainer) -> Result<BTreeMap<Granularity, TypingMetrics>, String> {
    let mut results = BTreeMap::new();
    for g in [Granularity::Test, Granularity::Level1, Granularity::Level2] {
        if !trainer.has_split(g) {
            continue;
        }
        let m = match g {
            Granularity::Level1 => trainer.evaluate_level1(),
            Granularity::Level2 => trainer.evaluate_level2(),
            _ => trainer.evaluate_all(),
        }
        .map_err(|e| format!("{} evaluation failed: {}", g, e))?;
        results.insert(g, m);
    }
    if results.is_empty() {
        return Err("no test, level1 or level2 split configured".to_string());
    }
    Ok(results)
}

/// Restore a checkpoint and report metrics for each configured split.
pub fn cmd_evaluate(args: EvaluateArgs) -> Result<(), String> {
    let mut trainer = load_trainer(&args.config)?;
    restore(&mut trainer, args.checkpoint.as_deref())?;
    let results = evaluate_configured(&trainer)?;

    let content = match args.format {
        OutputFormat::Human => results
            .iter()
            .map(|(g, m)| format_metrics(g.as_str(), m) + "\n")
            .collect::<String>(),
        OutputFormat::Json => {
            let by_name: BTreeMap<&str, &TypingMetrics> =
                results.iter().map(|(g, m)| (g.as_str(), m)).collect();
            serde_json::to_string_pretty(&by_name).map_err(|e| e.to_string())? + "\n"
        }
        OutputFormat::Jsonl => {
            let mut out = String::new();
            for (g, m) in &results {
                let line = serde_json::json!({ "split": g.as_str(), "metrics": m });
                out.push_str(&line.to_string());
                out.push('\n');
            }
            out
        }
    };
    write_output(&content, args.output.as_deref())
}
