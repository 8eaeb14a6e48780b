//! Predict command

use clap::Parser;
use serde::Serialize;
use std::path::PathBuf;

use super::super::output::write_output;
use super::super::parser::OutputFormat;
use super::{load_trainer, restore};
use crate::dataset::Split;
use crate::training::Trainer;
use crate::types::Granularity;

/// Predict types for mentions in a JSONL file
#[derive(Parser, Debug)]
pub struct PredictArgs {
    /// Run configuration (TOML)
    #[arg(short, long, value_name = "PATH")]
    pub config: PathBuf,

    /// Mentions to type (same JSONL layout as the training splits)
    #[arg(short, long, value_name = "PATH")]
    pub input: PathBuf,

    /// Checkpoint to use (defaults to the run's best checkpoint)
    #[arg(long, value_name = "PATH")]
    pub checkpoint: Option<PathBuf>,

    /// Output format
    #[arg(long, default_value = "human")]
    pub format: OutputFormat,

    /// Write predictions to a file instead of stdout
    #[arg(short, long, value_name = "PATH")]
    pub output: Option<PathBuf>,
}

/// One typed mention.
#[derive(Debug, Clone, Serialize)]
pub struct Prediction {
    /// Mention text
    pub mention: String,
    /// Number of words the model saw
    pub words: usize,
    /// Label indices, supertypes included
    pub indices: Vec<usize>,
    /// Label paths
    pub labels: Vec<String>,
}

/// Type every mention of `split`, batch by batch.
pub fn predict_split(trainer: &Trainer, split: &Split) -> Result<Vec<Prediction>, String> {
    let batch_size = trainer.config().train.batch_size;
    let all: Vec<usize> = (0..split.len()).collect();
    let mut out = Vec::with_capacity(split.len());

    for chunk in all.chunks(batch_size) {
        let batch = split.batch(chunk);
        let (labels, lengths) = trainer
            .predict_raw(&batch)
            .map_err(|e| format!("Prediction failed: {}", e))?;
        for ((mention, indices), words) in batch.mentions.into_iter().zip(labels).zip(lengths) {
            let names = trainer
                .label_names(&indices)
                .into_iter()
                .map(str::to_string)
                .collect();
            out.push(Prediction {
                mention,
                words,
                indices,
                labels: names,
            });
        }
    }
    Ok(out)
}

/// Restore a checkpoint and type every mention of `--input`.
pub fn cmd_predict(args: PredictArgs) -> Result<(), String> {
    let mut trainer = load_trainer(&args.config)?;
    restore(&mut trainer, args.checkpoint.as_deref())?;

    let model_cfg = &trainer.config().model;
    let split = Split::load(
        &args.input,
        trainer.model().labels().label_count(Granularity::Train),
        model_cfg.timesteps,
        model_cfg.bert_emb_len,
    )
    .map_err(|e| format!("Failed to read {}: {}", args.input.display(), e))?;

    let predictions = predict_split(&trainer, &split)?;
    let content = match args.format {
        OutputFormat::Human => predictions
            .iter()
            .map(|p| format!("{}\t{}\n", p.mention, p.labels.join(" ")))
            .collect::<String>(),
        OutputFormat::Json => {
            serde_json::to_string_pretty(&predictions).map_err(|e| e.to_string())? + "\n"
        }
        OutputFormat::Jsonl => {
            let mut out = String::new();
            for p in &predictions {
                out.push_str(&serde_json::to_string(p).map_err(|e| e.to_string())?);
                out.push('\n');
            }
            out
        }
    };
    write_output(&content, args.output.as_deref())
}
