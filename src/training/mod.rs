//! Training and evaluation orchestration.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                        Trainer                           │
//! │                                                          │
//! │  ShuffledSource ──► Inputs ──► NetModel ──► margin loss  │
//! │                                   │            │         │
//! │                                   │      backward, clip  │
//! │                                   │            │         │
//! │                                   │     Adam │ SGD step  │
//! │                                   ▼                      │
//! │               dev / test / level splits ──► evaluator    │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! - [`trainer`]: [`Trainer`] with `run_epoch`, `fit`, `predict_batch` and
//!   the `evaluate_*` entry points
//! - [`optimizer`]: optimizer selection and global-norm clipping
//! - [`summary`]: periodic loss snapshots

pub mod optimizer;
pub mod summary;
pub mod trainer;

pub use optimizer::{clip_grad_norm, TypingOptimizer};
pub use summary::{LossSummary, SummaryWriter, SUMMARY_FILE};
pub use trainer::{EpochReport, Trainer, TrainerParts, PREDICTIONS_FILE, PRETRAINED_TENSOR};
