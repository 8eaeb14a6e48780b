//! Evaluation of typing predictions.
//!
//! - [`metrics`]: strict accuracy and loose micro/macro precision, recall, F1
//! - [`writer`]: prediction/gold results files
//!
//! ```rust
//! use netype::eval::evaluate;
//!
//! let predicted = vec![vec![0, 1], vec![2]];
//! let gold = vec![vec![0, 1], vec![3]];
//! let m = evaluate(&predicted, &gold).unwrap();
//! assert!((m.strict_acc - 0.5).abs() < 1e-9);
//! ```

pub mod metrics;
pub mod writer;

pub use metrics::{evaluate, TypingMetrics};
pub use writer::write_predictions;
