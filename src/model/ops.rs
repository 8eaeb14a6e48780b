//! Small tensor helpers shared by the encoders.

use candle_core::{DType, Tensor};
use rand::Rng;
use rand_chacha::ChaCha8Rng;

use crate::{Error, Result};

/// Inverted dropout driven by an explicitly passed generator.
///
/// `keep_prob` is the probability of keeping a unit; kept units are scaled
/// by `1 / keep_prob`. A keep probability of 1.0 (or no generator) is the
/// identity, which is what every forward-only pass uses.
pub struct Dropout<'a> {
    keep_prob: f64,
    rng: Option<&'a mut ChaCha8Rng>,
}

impl<'a> Dropout<'a> {
    /// Dropout drawing masks from `rng`.
    pub fn new(keep_prob: f64, rng: &'a mut ChaCha8Rng) -> Self {
        Self {
            keep_prob,
            rng: Some(rng),
        }
    }

    /// Identity dropout.
    #[must_use]
    pub fn disabled() -> Dropout<'static> {
        Dropout {
            keep_prob: 1.0,
            rng: None,
        }
    }

    /// Apply a fresh mask to `xs`.
    pub fn apply(&mut self, xs: &Tensor) -> Result<Tensor> {
        let keep = self.keep_prob;
        let rng = match self.rng.as_mut() {
            Some(rng) if keep < 1.0 => rng,
            _ => return Ok(xs.clone()),
        };
        if keep <= 0.0 {
            return Err(Error::invalid_input(format!(
                "dropout keep probability must be positive, got {keep}"
            )));
        }

        let scale = (1.0 / keep) as f32;
        let mask: Vec<f32> = (0..xs.elem_count())
            .map(|_| if rng.gen::<f64>() < keep { scale } else { 0.0 })
            .collect();
        let mask = Tensor::from_vec(mask, xs.shape(), xs.device())?.to_dtype(xs.dtype())?;
        Ok(xs.mul(&mask)?)
    }
}

/// Logistic sigmoid built from differentiable primitives.
pub fn sigmoid(xs: &Tensor) -> Result<Tensor> {
    Ok((xs.neg()?.exp()? + 1.0)?.recip()?)
}

/// `[batch, timesteps]` 0/1 mask with ones at positions `< length`.
pub fn length_mask(lengths: &[usize], timesteps: usize, like: &Tensor) -> Result<Tensor> {
    let mut data = vec![0f32; lengths.len() * timesteps];
    for (b, &len) in lengths.iter().enumerate() {
        for t in 0..len.min(timesteps) {
            data[b * timesteps + t] = 1.0;
        }
    }
    let mask = Tensor::from_vec(data, (lengths.len(), timesteps), like.device())?;
    Ok(mask.to_dtype(like.dtype())?)
}

/// Per-row argmax; the lowest index wins on exact ties.
pub fn argmax_rows(probs: &Tensor) -> Result<Vec<usize>> {
    let rows: Vec<Vec<f32>> = probs.to_dtype(DType::F32)?.to_vec2()?;
    Ok(rows
        .iter()
        .map(|row| {
            row.iter()
                .enumerate()
                .fold((0usize, f32::NEG_INFINITY), |(best, max), (i, &v)| {
                    if v > max {
                        (i, v)
                    } else {
                        (best, max)
                    }
                })
                .0
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Device;
    use rand::SeedableRng;

    #[test]
    fn test_disabled_dropout_is_identity() {
        let xs = Tensor::new(&[1f32, 2.0, 3.0], &Device::Cpu).unwrap();
        let mut d = Dropout::disabled();
        let ys: Vec<f32> = d.apply(&xs).unwrap().to_vec1().unwrap();
        assert_eq!(ys, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_dropout_zeroes_or_scales() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let xs = Tensor::ones(1000, DType::F32, &Device::Cpu).unwrap();
        let ys: Vec<f32> = Dropout::new(0.5, &mut rng).apply(&xs).unwrap().to_vec1().unwrap();
        assert!(ys.iter().all(|&v| v == 0.0 || (v - 2.0).abs() < 1e-6));
        let kept = ys.iter().filter(|&&v| v > 0.0).count();
        assert!(kept > 400 && kept < 600, "kept {kept}");
    }

    #[test]
    fn test_dropout_same_seed_same_mask() {
        let xs = Tensor::ones(64, DType::F32, &Device::Cpu).unwrap();
        let mut a = ChaCha8Rng::seed_from_u64(11);
        let mut b = ChaCha8Rng::seed_from_u64(11);
        let ya: Vec<f32> = Dropout::new(0.7, &mut a).apply(&xs).unwrap().to_vec1().unwrap();
        let yb: Vec<f32> = Dropout::new(0.7, &mut b).apply(&xs).unwrap().to_vec1().unwrap();
        assert_eq!(ya, yb);
    }

    #[test]
    fn test_sigmoid_values() {
        let xs = Tensor::new(&[0f32, 100.0, -100.0], &Device::Cpu).unwrap();
        let ys: Vec<f32> = sigmoid(&xs).unwrap().to_vec1().unwrap();
        assert!((ys[0] - 0.5).abs() < 1e-6);
        assert!((ys[1] - 1.0).abs() < 1e-6);
        assert!(ys[2].abs() < 1e-6);
    }

    #[test]
    fn test_length_mask() {
        let like = Tensor::zeros(1, DType::F32, &Device::Cpu).unwrap();
        let m: Vec<Vec<f32>> = length_mask(&[2, 0, 5], 3, &like).unwrap().to_vec2().unwrap();
        assert_eq!(m, vec![vec![1.0, 1.0, 0.0], vec![0.0; 3], vec![1.0; 3]]);
    }

    #[test]
    fn test_argmax_ties_pick_lowest_index() {
        let probs = Tensor::new(&[[0.25f32, 0.25, 0.25, 0.25], [0.1, 0.45, 0.45, 0.0]], &Device::Cpu)
            .unwrap();
        assert_eq!(argmax_rows(&probs).unwrap(), vec![0, 1]);
    }
}
