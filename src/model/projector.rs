//! Projection into the label-embedding space and label scoring.

use candle_core::{DType, Device, Tensor, D};
use candle_nn::{init, Init, Linear, Module, VarBuilder};
use std::path::Path;

use super::ops::argmax_rows;
use crate::types::Granularity;
use crate::{Error, Result};

// =============================================================================
// Label embeddings
// =============================================================================

/// The four fixed label-embedding matrices, one per granularity.
///
/// Each is `[labels, n_label_emb]`. They are plain tensors and never receive
/// gradient updates.
#[derive(Debug, Clone)]
pub struct LabelEmbeddings {
    matrices: [Tensor; 4],
}

impl LabelEmbeddings {
    /// Wrap matrices given in [`Granularity::ALL`] order.
    pub fn from_tensors(train: Tensor, test: Tensor, level1: Tensor, level2: Tensor) -> Result<Self> {
        let matrices = [train, test, level1, level2];
        let width = matrices[0].dims2()?.1;
        for (g, m) in Granularity::ALL.iter().zip(&matrices) {
            let (_, cols) = m.dims2()?;
            if cols != width {
                return Err(Error::model_init(format!(
                    "{g} label embeddings have width {cols}, train has {width}"
                )));
            }
        }
        Ok(Self { matrices })
    }

    /// Load tensors `train`, `test`, `level1` and `level2` from a safetensors file.
    pub fn load(path: impl AsRef<Path>, device: &Device) -> Result<Self> {
        let path = path.as_ref();
        let mut tensors = candle_core::safetensors::load(path, device)
            .map_err(|e| Error::model_init(format!("label embeddings {}: {e}", path.display())))?;
        let mut take = |g: Granularity| -> Result<Tensor> {
            let t = tensors.remove(g.as_str()).ok_or_else(|| {
                Error::model_init(format!("{} has no `{g}` tensor", path.display()))
            })?;
            Ok(t.to_dtype(DType::F32)?)
        };
        let train = take(Granularity::Train)?;
        let test = take(Granularity::Test)?;
        let level1 = take(Granularity::Level1)?;
        let level2 = take(Granularity::Level2)?;
        log::debug!(
            "label embeddings: train {:?}, test {:?}, level1 {:?}, level2 {:?}",
            train.dims(),
            test.dims(),
            level1.dims(),
            level2.dims()
        );
        Self::from_tensors(train, test, level1, level2)
    }

    /// Matrix for a granularity.
    #[must_use]
    pub fn get(&self, granularity: Granularity) -> &Tensor {
        &self.matrices[granularity.index()]
    }

    /// Number of labels at a granularity.
    #[must_use]
    pub fn label_count(&self, granularity: Granularity) -> usize {
        self.get(granularity).dims()[0]
    }

    /// Shared embedding width.
    #[must_use]
    pub fn dim(&self) -> usize {
        self.matrices[0].dims()[1]
    }
}

// =============================================================================
// Scores
// =============================================================================

/// Label scores for a batch.
#[derive(Debug, Clone)]
pub struct Scores {
    /// `[batch, labels]` raw similarities
    pub logits: Tensor,
    /// `[batch, labels]` softmax over labels
    pub probs: Tensor,
}

impl Scores {
    /// Highest-probability label per row; the lowest index wins ties.
    pub fn predictions(&self) -> Result<Vec<usize>> {
        argmax_rows(&self.probs)
    }
}

// =============================================================================
// Projector
// =============================================================================

/// Affine map from fused mention features to the label-embedding space.
pub struct LabelSpaceProjector {
    proj: Linear,
}

impl LabelSpaceProjector {
    /// `W: [n_label_emb, fused_dim]`, `b` zero-initialized.
    pub fn new(fused_dim: usize, n_label_emb: usize, vb: VarBuilder) -> Result<Self> {
        let weight = vb
            .get_with_hints((n_label_emb, fused_dim), "weight", init::DEFAULT_KAIMING_NORMAL)
            .map_err(|e| Error::model_init(format!("projection weight: {e}")))?;
        let bias = vb
            .get_with_hints(n_label_emb, "bias", Init::Const(0.0))
            .map_err(|e| Error::model_init(format!("projection bias: {e}")))?;
        Ok(Self {
            proj: Linear::new(weight, Some(bias)),
        })
    }

    /// `[batch, fused_dim]` → `[batch, n_label_emb]`.
    pub fn project(&self, features: &Tensor) -> Result<Tensor> {
        Ok(self.proj.forward(features)?)
    }

    /// Similarity of projected features with every label, then softmax.
    pub fn score(&self, projected: &Tensor, labels: &Tensor) -> Result<Scores> {
        let (_, width) = projected.dims2()?;
        let (_, label_width) = labels.dims2()?;
        if width != label_width {
            return Err(Error::inference(format!(
                "projected width {width} does not match label width {label_width}"
            )));
        }
        let logits = projected.matmul(&labels.t()?)?;
        let probs = candle_nn::ops::softmax(&logits, D::Minus1)?;
        Ok(Scores { logits, probs })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_nn::VarMap;

    fn labels(rows: usize, cols: usize) -> Tensor {
        Tensor::ones((rows, cols), DType::F32, &Device::Cpu).unwrap()
    }

    #[test]
    fn test_label_counts() {
        let l = LabelEmbeddings::from_tensors(labels(5, 3), labels(4, 3), labels(2, 3), labels(7, 3))
            .unwrap();
        assert_eq!(l.label_count(Granularity::Train), 5);
        assert_eq!(l.label_count(Granularity::Level2), 7);
        assert_eq!(l.dim(), 3);
    }

    #[test]
    fn test_width_mismatch_rejected() {
        assert!(
            LabelEmbeddings::from_tensors(labels(5, 3), labels(4, 2), labels(2, 3), labels(7, 3))
                .is_err()
        );
    }

    #[test]
    fn test_load_from_safetensors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("labels.safetensors");
        let map: std::collections::HashMap<String, Tensor> = [
            ("train".to_string(), labels(3, 2)),
            ("test".to_string(), labels(3, 2)),
            ("level1".to_string(), labels(2, 2)),
            ("level2".to_string(), labels(4, 2)),
        ]
        .into_iter()
        .collect();
        candle_core::safetensors::save(&map, &path).unwrap();

        let l = LabelEmbeddings::load(&path, &Device::Cpu).unwrap();
        assert_eq!(l.label_count(Granularity::Level1), 2);
    }

    #[test]
    fn test_projector_starts_with_zero_bias() {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        let p = LabelSpaceProjector::new(4, 3, vb).unwrap();
        let zeros = Tensor::zeros((2, 4), DType::F32, &Device::Cpu).unwrap();
        let out: Vec<Vec<f32>> = p.project(&zeros).unwrap().to_vec2().unwrap();
        assert!(out.iter().flatten().all(|&v| v == 0.0));
    }

    #[test]
    fn test_scores_are_distributions() {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        let p = LabelSpaceProjector::new(4, 3, vb).unwrap();
        let features = Tensor::randn(0f32, 1.0, (5, 4), &Device::Cpu).unwrap();
        let label_emb = Tensor::randn(0f32, 1.0, (6, 3), &Device::Cpu).unwrap();

        let scores = p.score(&p.project(&features).unwrap(), &label_emb).unwrap();
        assert_eq!(scores.probs.dims(), &[5, 6]);
        let probs: Vec<Vec<f32>> = scores.probs.to_vec2().unwrap();
        for row in &probs {
            assert!((row.iter().sum::<f32>() - 1.0).abs() < 1e-5);
        }
        let preds = scores.predictions().unwrap();
        for (row, &p) in probs.iter().zip(&preds) {
            assert!(row.iter().all(|&v| v <= row[p]));
        }
    }

    #[test]
    fn test_score_width_mismatch() {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        let p = LabelSpaceProjector::new(4, 3, vb).unwrap();
        let projected = Tensor::zeros((1, 3), DType::F32, &Device::Cpu).unwrap();
        assert!(p.score(&projected, &labels(2, 5)).is_err());
    }
}
