//! Fine-grained entity typing metrics.
//!
//! Each mention has a predicted label set `p` and a gold label set `g`:
//!
//! - **Strict accuracy**: fraction of mentions with `p == g`
//! - **Loose macro**: mean over mentions of `|p ∩ g| / |p|` (precision) and
//!   `|p ∩ g| / |g|` (recall); mentions with an empty set contribute 0
//! - **Loose micro**: `Σ|p ∩ g| / Σ|p|` and `Σ|p ∩ g| / Σ|g|`
//!
//! F1 is the harmonic mean of the matching precision and recall, 0 when both are 0.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::{Error, Result};

/// Evaluation results for one split.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TypingMetrics {
    /// Exact set-match accuracy
    pub strict_acc: f64,
    /// Loose micro F1
    pub micro_f1: f64,
    /// Loose macro F1
    pub macro_f1: f64,
    /// Loose micro precision
    pub micro_p: f64,
    /// Loose micro recall
    pub micro_r: f64,
    /// Loose macro precision
    pub macro_p: f64,
    /// Loose macro recall
    pub macro_r: f64,
}

impl TypingMetrics {
    /// The seven values in evaluator order:
    /// `(strict_acc, mi_f1, ma_f1, mi_p, mi_r, ma_p, ma_r)`.
    #[must_use]
    pub fn as_tuple(&self) -> (f64, f64, f64, f64, f64, f64, f64) {
        (
            self.strict_acc,
            self.micro_f1,
            self.macro_f1,
            self.micro_p,
            self.micro_r,
            self.macro_p,
            self.macro_r,
        )
    }
}

impl fmt::Display for TypingMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "strict_acc: {:.4}, mi_f1: {:.4}, ma_f1: {:.4}, mi_p: {:.4}, mi_r: {:.4}, ma_p: {:.4}, ma_r: {:.4}",
            self.strict_acc,
            self.micro_f1,
            self.macro_f1,
            self.micro_p,
            self.micro_r,
            self.macro_p,
            self.macro_r,
        )
    }
}

fn f1(p: f64, r: f64) -> f64 {
    if p + r == 0.0 {
        0.0
    } else {
        2.0 * p * r / (p + r)
    }
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

/// Score predicted label sets against gold label sets.
///
/// Duplicate indices inside a set are ignored. An empty evaluation returns
/// all-zero metrics.
pub fn evaluate(predicted: &[Vec<usize>], gold: &[Vec<usize>]) -> Result<TypingMetrics> {
    if predicted.len() != gold.len() {
        return Err(Error::evaluation(format!(
            "{} predictions for {} gold examples",
            predicted.len(),
            gold.len()
        )));
    }
    if predicted.is_empty() {
        return Ok(TypingMetrics::default());
    }

    let n = predicted.len() as f64;
    let mut strict = 0usize;
    let mut macro_p = 0.0;
    let mut macro_r = 0.0;
    let mut overlap_total = 0usize;
    let mut pred_total = 0usize;
    let mut gold_total = 0usize;

    for (p, g) in predicted.iter().zip(gold) {
        let p: BTreeSet<usize> = p.iter().copied().collect();
        let g: BTreeSet<usize> = g.iter().copied().collect();
        let overlap = p.intersection(&g).count();

        if p == g {
            strict += 1;
        }
        macro_p += ratio(overlap, p.len());
        macro_r += ratio(overlap, g.len());
        overlap_total += overlap;
        pred_total += p.len();
        gold_total += g.len();
    }

    let macro_p = macro_p / n;
    let macro_r = macro_r / n;
    let micro_p = ratio(overlap_total, pred_total);
    let micro_r = ratio(overlap_total, gold_total);

    Ok(TypingMetrics {
        strict_acc: strict as f64 / n,
        micro_f1: f1(micro_p, micro_r),
        macro_f1: f1(macro_p, macro_r),
        micro_p,
        micro_r,
        macro_p,
        macro_r,
    })
}
