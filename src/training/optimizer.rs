//! Optimizer selection and gradient clipping.

use candle_core::backprop::GradStore;
use candle_core::{DType, Var};
use candle_nn::{AdamW, Optimizer, ParamsAdamW, SGD};

use crate::types::LrMethod;
use crate::Result;

/// Either optimizer behind one interface.
pub enum TypingOptimizer {
    /// Adam (AdamW with zero weight decay)
    Adam(AdamW),
    /// Plain gradient descent
    Sgd(SGD),
}

impl TypingOptimizer {
    /// Create the optimizer named by `method` over `vars`.
    pub fn new(method: LrMethod, vars: Vec<Var>, lr: f64) -> Result<Self> {
        Ok(match method {
            LrMethod::Adam => {
                let params = ParamsAdamW {
                    lr,
                    weight_decay: 0.0,
                    ..Default::default()
                };
                Self::Adam(AdamW::new(vars, params)?)
            }
            LrMethod::Sgd => Self::Sgd(SGD::new(vars, lr)?),
        })
    }

    /// Apply one update.
    pub fn step(&mut self, grads: &GradStore) -> Result<()> {
        match self {
            Self::Adam(opt) => opt.step(grads)?,
            Self::Sgd(opt) => opt.step(grads)?,
        }
        Ok(())
    }

    /// Current learning rate.
    #[must_use]
    pub fn learning_rate(&self) -> f64 {
        match self {
            Self::Adam(opt) => opt.learning_rate(),
            Self::Sgd(opt) => opt.learning_rate(),
        }
    }

    /// Replace the learning rate.
    pub fn set_learning_rate(&mut self, lr: f64) {
        match self {
            Self::Adam(opt) => opt.set_learning_rate(lr),
            Self::Sgd(opt) => opt.set_learning_rate(lr),
        }
    }
}

/// Rescale all gradients so their global L2 norm is at most `max_norm`.
///
/// Returns the norm before clipping.
pub fn clip_grad_norm(grads: &mut GradStore, vars: &[Var], max_norm: f64) -> Result<f64> {
    let mut sum_sq = 0.0f64;
    for var in vars {
        if let Some(g) = grads.get(var) {
            sum_sq += g.sqr()?.sum_all()?.to_dtype(DType::F64)?.to_scalar::<f64>()?;
        }
    }
    let norm = sum_sq.sqrt();

    if norm > max_norm && norm > 0.0 {
        let scale = max_norm / norm;
        for var in vars {
            let scaled = match grads.get(var) {
                Some(g) => g.affine(scale, 0.0)?,
                None => continue,
            };
            grads.insert(var, scaled);
        }
    }
    Ok(norm)
}
