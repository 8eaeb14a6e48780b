//! Margin loss over label probabilities.
//!
//! For each `(example, label)` cell with output `o` and target `y`:
//!
//! ```text
//! ind  = 2 * [y == 1] - 1
//! term = max(0, MARGIN - ind * o)
//! ```
//!
//! The loss is the mean of all terms.

use candle_core::Tensor;

use crate::{Error, Result};

/// Margin between positive outputs and zero.
pub const MARGIN: f64 = 0.1;

/// Element-wise margin terms, same shape as `outputs`.
pub fn margin_terms(outputs: &Tensor, targets: &Tensor) -> Result<Tensor> {
    if outputs.dims() != targets.dims() {
        return Err(Error::invalid_input(format!(
            "outputs {:?} and targets {:?} differ in shape",
            outputs.dims(),
            targets.dims()
        )));
    }
    let indicator = targets
        .eq(1.0)?
        .to_dtype(outputs.dtype())?
        .affine(2.0, -1.0)?;
    Ok((indicator * outputs)?.affine(-1.0, MARGIN)?.relu()?)
}

/// Scalar mean of [`margin_terms`].
pub fn margin_loss(outputs: &Tensor, targets: &Tensor) -> Result<Tensor> {
    Ok(margin_terms(outputs, targets)?.mean_all()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Device;

    fn t(rows: &[[f32; 2]]) -> Tensor {
        let flat: Vec<f32> = rows.iter().flatten().copied().collect();
        Tensor::from_vec(flat, (rows.len(), 2), &Device::Cpu).unwrap()
    }

    #[test]
    fn test_terms() {
        let outputs = t(&[[0.7, 0.3], [0.05, 0.95]]);
        let targets = t(&[[1.0, 0.0], [1.0, 0.0]]);
        let terms: Vec<Vec<f32>> = margin_terms(&outputs, &targets).unwrap().to_vec2().unwrap();
        // positive above the margin: 0; positive below: 0.1 - 0.05; negatives: 0.1 + o
        let expected = [[0.0, 0.4], [0.05, 1.05]];
        for (row, exp) in terms.iter().zip(expected) {
            for (a, b) in row.iter().zip(exp) {
                assert!((a - b).abs() < 1e-6, "{a} vs {b}");
            }
        }
    }

    #[test]
    fn test_loss_is_mean() {
        let outputs = t(&[[0.7, 0.3], [0.05, 0.95]]);
        let targets = t(&[[1.0, 0.0], [1.0, 0.0]]);
        let loss = margin_loss(&outputs, &targets).unwrap().to_scalar::<f32>().unwrap();
        assert!((loss - 1.5 / 4.0).abs() < 1e-6);
    }

    #[test]
    fn test_zero_only_for_confident_positives() {
        let outputs = t(&[[0.1, 0.0]]);
        let targets = t(&[[1.0, 1.0]]);
        let terms: Vec<Vec<f32>> = margin_terms(&outputs, &targets).unwrap().to_vec2().unwrap();
        assert!(terms[0][0].abs() < 1e-6);
        assert!((terms[0][1] - 0.1).abs() < 1e-6);

        // a negative label with zero output still pays the margin
        let terms: Vec<Vec<f32>> = margin_terms(&t(&[[0.0, 0.0]]), &t(&[[0.0, 0.0]]))
            .unwrap()
            .to_vec2()
            .unwrap();
        assert!(terms[0].iter().all(|&v| (v - 0.1).abs() < 1e-6));
    }

    #[test]
    fn test_shape_mismatch() {
        let outputs = t(&[[0.5, 0.5]]);
        let targets = Tensor::new(&[1f32, 0.0, 0.0], &Device::Cpu).unwrap();
        assert!(margin_loss(&outputs, &targets).is_err());
    }
}
