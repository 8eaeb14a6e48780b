//! # netype
//!
//! Fine-grained entity typing for Rust.
//!
//! A mention such as "Barack Obama" is assigned one label from a
//! hierarchical inventory (`/person/politician`), then expanded to its
//! supertypes (`/person`, `/person/politician`).
//!
//! - **Encoders**: word + character BiLSTM over the mention, plus a BiLSTM
//!   over precomputed contextual token embeddings
//! - **Label space**: fused features are projected into a fixed label-embedding
//!   space and scored against four label sets (train, test, level 1, level 2)
//! - **Training**: margin loss, Adam or SGD, gradient clipping, lr decay and
//!   early stopping on dev micro-F1
//! - **Evaluation**: strict accuracy with loose micro/macro precision, recall, F1
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use netype::prelude::*;
//!
//! let config = Config::from_toml_path("run.toml")?;
//! let mut trainer = Trainer::new(config, best_device()?)?;
//! trainer.fit()?;
//! let metrics = trainer.evaluate_all()?;
//! println!("{metrics}");
//! ```
//!
//! ## Feature Flags
//!
//! ```toml
//! [dependencies]
//! netype = "0.1"                                      # CPU
//! netype = { version = "0.1", features = ["metal"] }  # + Apple GPU
//! netype = { version = "0.1", features = ["cuda"] }   # + NVIDIA GPU
//! ```
//!
//! ## Modules
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`vocab`], [`padding`] | mention → padded word and char ids |
//! | [`dataset`] | JSONL splits, shuffled batching |
//! | [`taxonomy`] | label paths and supertype expansion |
//! | [`model`] | encoders, projector, margin loss, [`NetModel`] |
//! | [`training`] | [`Trainer`]: epochs, checkpoints, evaluation |
//! | [`eval`] | typing metrics and results files |
//! | [`cli`] | the `netype` command line |

#![warn(missing_docs)]

pub mod cli;
pub mod config;
pub mod dataset;
mod error;
pub mod eval;
pub mod model;
pub mod padding;
pub mod taxonomy;
pub mod training;
pub mod types;
pub mod vocab;

pub mod prelude {
    //! Commonly used items, re-exported for convenience.
    //!
    //! ```rust
    //! use netype::prelude::*;
    //!
    //! let m = evaluate(&[vec![0, 1]], &[vec![0, 1]]).unwrap();
    //! assert_eq!(m.strict_acc, 1.0);
    //! assert_eq!(Granularity::Level1.as_str(), "level1");
    //! ```
    pub use crate::config::{Config, DataConfig, ModelConfig, TrainConfig};
    pub use crate::dataset::{BatchSource, Example, RawBatch, ShuffledSource, Split};
    pub use crate::error::{Error, Result};
    pub use crate::eval::{evaluate, TypingMetrics};
    pub use crate::model::{best_device, Inputs, LabelEmbeddings, NetModel};
    pub use crate::taxonomy::LabelTaxonomy;
    pub use crate::training::{EpochReport, Trainer, TrainerParts};
    pub use crate::types::{Granularity, LrMethod};
    pub use crate::vocab::{MentionProcessor, Vocab};
}

// Re-exports
pub use config::{Config, DataConfig, ModelConfig, TrainConfig};
pub use dataset::{BatchSource, Example, RawBatch, ShuffledSource, Split};
pub use error::{Error, Result};
pub use eval::TypingMetrics;
pub use model::{best_device, Inputs, LabelEmbeddings, NetModel};
pub use taxonomy::LabelTaxonomy;
pub use training::{EpochReport, Trainer};
pub use types::{Granularity, LrMethod};
pub use vocab::{MentionProcessor, Vocab};
