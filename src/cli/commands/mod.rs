//! Command implementations for the netype CLI
//!
//! Each command has its own module and returns `Result<(), String>`; the
//! binary turns an error into a message on stderr and a failing exit code.

pub mod evaluate;
pub mod predict;
pub mod train;

use std::path::Path;

use crate::config::Config;
use crate::model::best_device;
use crate::training::Trainer;

pub use evaluate::{cmd_evaluate, EvaluateArgs};
pub use predict::{cmd_predict, PredictArgs};
pub use train::{cmd_train, TrainArgs};

/// Read the configuration and build a trainer on the best device.
pub(crate) fn load_trainer(config_path: &Path) -> Result<Trainer, String> {
    let config = Config::from_toml_path(config_path)
        .map_err(|e| format!("Failed to load {}: {}", config_path.display(), e))?;
    let device = best_device().map_err(|e| format!("No compute device: {}", e))?;
    Trainer::new(config, device).map_err(|e| format!("Failed to build model: {}", e))
}

/// Restore `checkpoint`, or the configured best checkpoint when `None`.
pub(crate) fn restore(trainer: &mut Trainer, checkpoint: Option<&Path>) -> Result<(), String> {
    let path = match checkpoint {
        Some(p) => p.to_path_buf(),
        None => trainer.config().train.checkpoint_path(),
    };
    trainer
        .restore(&path)
        .map_err(|e| format!("Failed to restore {}: {}", path.display(), e))
}
