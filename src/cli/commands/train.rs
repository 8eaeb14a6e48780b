//! Train command

use clap::Parser;
use std::path::PathBuf;
use std::time::Instant;

use super::super::output::{format_metrics, log_info};
use super::{load_trainer, restore};
use crate::types::Granularity;

/// Train a model
#[derive(Parser, Debug)]
pub struct TrainArgs {
    /// Run configuration (TOML)
    #[arg(short, long, value_name = "PATH")]
    pub config: PathBuf,

    /// Start from a saved checkpoint
    #[arg(long, value_name = "PATH")]
    pub resume: Option<PathBuf>,

    /// Override the maximum number of epochs
    #[arg(long, value_name = "N")]
    pub epochs: Option<usize>,

    /// Show a progress bar per epoch
    #[arg(long)]
    pub progress: bool,

    /// Skip the final test and level evaluations
    #[arg(long)]
    pub no_eval: bool,

    /// Minimal output
    #[arg(short, long)]
    pub quiet: bool,
}

/// Train, keep the best dev checkpoint, then score the configured test splits.
pub fn cmd_train(args: TrainArgs) -> Result<(), String> {
    let mut trainer = load_trainer(&args.config)?;
    if let Some(n) = args.epochs {
        trainer.set_epochs(n);
    }
    if args.progress {
        trainer.set_progress(true);
    }
    if let Some(path) = &args.resume {
        restore(&mut trainer, Some(path.as_path()))?;
    }

    let start = Instant::now();
    let reports = trainer.fit().map_err(|e| format!("Training failed: {}", e))?;
    log_info(
        &format!(
            "Trained {} epochs in {:.1}s",
            reports.len(),
            start.elapsed().as_secs_f64()
        ),
        args.quiet,
    );
    if let Some(best) = reports
        .iter()
        .max_by(|a, b| a.dev.micro_f1.total_cmp(&b.dev.micro_f1))
    {
        log_info(
            &format!("Best epoch {}: {}", best.epoch, format_metrics("dev", &best.dev)),
            args.quiet,
        );
    }

    if args.no_eval {
        return Ok(());
    }
    let checkpoint = trainer.config().train.checkpoint_path();
    if checkpoint.exists() {
        restore(&mut trainer, Some(checkpoint.as_path()))?;
    }
    if trainer.has_split(Granularity::Test) {
        let m = trainer.evaluate_all().map_err(|e| format!("Test evaluation failed: {}", e))?;
        log_info(&format_metrics("test", &m), args.quiet);
    }
    if trainer.has_split(Granularity::Level1) {
        let m = trainer.evaluate_level1().map_err(|e| format!("Level-1 evaluation failed: {}", e))?;
        log_info(&format_metrics("level1", &m), args.quiet);
    }
    if trainer.has_split(Granularity::Level2) {
        let m = trainer.evaluate_level2().map_err(|e| format!("Level-2 evaluation failed: {}", e))?;
        log_info(&format_metrics("level2", &m), args.quiet);
    }
    Ok(())
}
