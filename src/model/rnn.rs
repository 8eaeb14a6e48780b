//! Length-masked bidirectional LSTM.
//!
//! Each direction is stepped one timestep at a time. Positions at or past an
//! example's length leave its state untouched and emit zeros, and the
//! backward direction reads only the valid prefix in reverse, so padding
//! never leaks into either direction or into the final states.

use candle_core::{Device, Tensor, D};
use candle_nn::{linear, linear_no_bias, Linear, Module, VarBuilder};

use super::ops::{length_mask, sigmoid};
use crate::{Error, Result};

/// Added to the forget gate pre-activation.
const FORGET_BIAS: f64 = 1.0;

// =============================================================================
// Cell
// =============================================================================

/// Single LSTM cell with fused gate projections `(i, f, g, o)`.
pub struct LstmCell {
    input: Linear,
    recurrent: Linear,
    hidden: usize,
}

impl LstmCell {
    /// Create a cell reading `in_dim` features.
    pub fn new(in_dim: usize, hidden: usize, vb: VarBuilder) -> Result<Self> {
        let input = linear(in_dim, 4 * hidden, vb.pp("input"))
            .map_err(|e| Error::model_init(format!("lstm input projection: {e}")))?;
        let recurrent = linear_no_bias(hidden, 4 * hidden, vb.pp("recurrent"))
            .map_err(|e| Error::model_init(format!("lstm recurrent projection: {e}")))?;
        Ok(Self {
            input,
            recurrent,
            hidden,
        })
    }

    /// Hidden size.
    #[must_use]
    pub fn hidden(&self) -> usize {
        self.hidden
    }

    /// One step: `x` is `[batch, in_dim]`, `h`/`c` are `[batch, hidden]`.
    pub fn step(&self, x: &Tensor, h: &Tensor, c: &Tensor) -> Result<(Tensor, Tensor)> {
        let gates = (self.input.forward(x)? + self.recurrent.forward(h)?)?;
        let chunks = gates.chunk(4, D::Minus1)?;
        let i = sigmoid(&chunks[0])?;
        let f = sigmoid(&(&chunks[1] + FORGET_BIAS)?)?;
        let g = chunks[2].tanh()?;
        let o = sigmoid(&chunks[3])?;

        let c = ((f * c)? + (i * g)?)?;
        let h = (o * c.tanh()?)?;
        Ok((h, c))
    }
}

// =============================================================================
// Bidirectional encoder
// =============================================================================

/// Output of [`BiLstm::forward`].
pub struct BiLstmOutput {
    /// `[batch, timesteps, 2 * hidden]`, forward then backward features;
    /// zero at padded positions
    pub outputs: Tensor,
    /// `[batch, hidden]` forward state after the last valid step
    pub last_fw: Tensor,
    /// `[batch, hidden]` backward state after reading the whole valid prefix
    pub last_bw: Tensor,
}

impl BiLstmOutput {
    /// `[batch, 2 * hidden]` concatenation of both final states.
    pub fn final_states(&self) -> Result<Tensor> {
        Ok(Tensor::cat(&[&self.last_fw, &self.last_bw], D::Minus1)?)
    }
}

/// Forward and backward LSTMs over the same input.
pub struct BiLstm {
    fw: LstmCell,
    bw: LstmCell,
}

impl BiLstm {
    /// Create both directions under `vb.pp("fw")` and `vb.pp("bw")`.
    pub fn new(in_dim: usize, hidden: usize, vb: VarBuilder) -> Result<Self> {
        Ok(Self {
            fw: LstmCell::new(in_dim, hidden, vb.pp("fw"))?,
            bw: LstmCell::new(in_dim, hidden, vb.pp("bw"))?,
        })
    }

    /// Hidden size of one direction.
    #[must_use]
    pub fn hidden(&self) -> usize {
        self.fw.hidden()
    }

    /// Run both directions over `xs` (`[batch, timesteps, features]`).
    ///
    /// `lengths[b]` must be at most `timesteps`; a length of 0 yields zero
    /// outputs and zero final states for that row.
    pub fn forward(&self, xs: &Tensor, lengths: &[usize]) -> Result<BiLstmOutput> {
        let (batch, timesteps, _) = xs.dims3()?;
        if lengths.len() != batch {
            return Err(Error::invalid_input(format!(
                "{} lengths for a batch of {batch}",
                lengths.len()
            )));
        }
        if timesteps == 0 {
            return Err(Error::invalid_input("sequence input has no timesteps"));
        }
        if let Some(&bad) = lengths.iter().find(|&&l| l > timesteps) {
            return Err(Error::invalid_input(format!(
                "sequence length {bad} exceeds {timesteps} timesteps"
            )));
        }

        let mask = length_mask(lengths, timesteps, xs)?;
        let (out_fw, last_fw) = run_direction(&self.fw, xs, &mask)?;

        let reverse = reverse_index(lengths, timesteps, xs.device())?;
        let xs_rev = reverse_time(xs, &reverse)?;
        let (out_bw_rev, last_bw) = run_direction(&self.bw, &xs_rev, &mask)?;
        let out_bw = reverse_time(&out_bw_rev, &reverse)?;

        Ok(BiLstmOutput {
            outputs: Tensor::cat(&[&out_fw, &out_bw], D::Minus1)?,
            last_fw,
            last_bw,
        })
    }
}

fn run_direction(cell: &LstmCell, xs: &Tensor, mask: &Tensor) -> Result<(Tensor, Tensor)> {
    let (batch, timesteps, _) = xs.dims3()?;
    let mut h = Tensor::zeros((batch, cell.hidden()), xs.dtype(), xs.device())?;
    let mut c = h.clone();
    let mut outputs = Vec::with_capacity(timesteps);

    for t in 0..timesteps {
        let x_t = xs.narrow(1, t, 1)?.squeeze(1)?.contiguous()?;
        let m = mask.narrow(1, t, 1)?;
        let (h_new, c_new) = cell.step(&x_t, &h, &c)?;

        h = (&h + (&h_new - &h)?.broadcast_mul(&m)?)?;
        c = (&c + (&c_new - &c)?.broadcast_mul(&m)?)?;
        outputs.push(h_new.broadcast_mul(&m)?);
    }

    Ok((Tensor::stack(&outputs, 1)?, h))
}

/// Flat row permutation reversing each example's valid prefix in place.
fn reverse_index(lengths: &[usize], timesteps: usize, device: &Device) -> Result<Tensor> {
    let mut idx = Vec::with_capacity(lengths.len() * timesteps);
    for (b, &len) in lengths.iter().enumerate() {
        for t in 0..timesteps {
            let src = if t < len { len - 1 - t } else { t };
            idx.push((b * timesteps + src) as u32);
        }
    }
    Ok(Tensor::from_vec(idx, lengths.len() * timesteps, device)?)
}

fn reverse_time(xs: &Tensor, index: &Tensor) -> Result<Tensor> {
    let (batch, timesteps, features) = xs.dims3()?;
    let flat = xs.reshape((batch * timesteps, features))?;
    Ok(flat
        .index_select(index, 0)?
        .reshape((batch, timesteps, features))?)
}

// =============================================================================
// Last valid timestep
// =============================================================================

/// `length - 1` for every row; lengths must lie in `1..=timesteps`.
pub fn last_valid_positions(lengths: &[usize], timesteps: usize) -> Result<Vec<usize>> {
    lengths
        .iter()
        .map(|&len| {
            if len == 0 || len > timesteps {
                Err(Error::invalid_input(format!(
                    "length {len} outside 1..={timesteps}"
                )))
            } else {
                Ok(len - 1)
            }
        })
        .collect()
}

/// Pick `outputs[b, lengths[b] - 1, :]` for every row.
///
/// `outputs` is `[batch, timesteps, features]`; the result is
/// `[batch, features]`. The selection is a one-hot mask over time, summed out,
/// so gradients reach only the selected step.
pub fn select_last_valid(outputs: &Tensor, lengths: &[usize]) -> Result<Tensor> {
    let (batch, timesteps, _) = outputs.dims3()?;
    if lengths.len() != batch {
        return Err(Error::invalid_input(format!(
            "{} lengths for a batch of {batch}",
            lengths.len()
        )));
    }
    let positions = last_valid_positions(lengths, timesteps)?;

    let mut one_hot = vec![0f32; batch * timesteps];
    for (b, &p) in positions.iter().enumerate() {
        one_hot[b * timesteps + p] = 1.0;
    }
    let one_hot = Tensor::from_vec(one_hot, (batch, timesteps, 1), outputs.device())?
        .to_dtype(outputs.dtype())?;

    Ok(outputs.broadcast_mul(&one_hot)?.sum(1)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::DType;
    use candle_nn::VarMap;

    fn bilstm(in_dim: usize, hidden: usize) -> (VarMap, BiLstm) {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        let lstm = BiLstm::new(in_dim, hidden, vb).unwrap();
        (varmap, lstm)
    }

    fn rows(t: &Tensor) -> Vec<Vec<f32>> {
        t.to_vec2().unwrap()
    }

    #[test]
    fn test_last_valid_positions() {
        assert_eq!(last_valid_positions(&[2, 3, 1], 3).unwrap(), vec![1, 2, 0]);
        assert!(last_valid_positions(&[0], 3).is_err());
        assert!(last_valid_positions(&[4], 3).is_err());
    }

    #[test]
    fn test_select_last_valid_differs_from_last_padded_position() {
        // outputs[b, t, 0] = 10 * b + t
        let data: Vec<f32> = (0..2)
            .flat_map(|b| (0..3).map(move |t| (10 * b + t) as f32))
            .collect();
        let outputs = Tensor::from_vec(data, (2, 3, 1), &Device::Cpu).unwrap();
        let picked = select_last_valid(&outputs, &[2, 3]).unwrap();
        assert_eq!(rows(&picked), vec![vec![1.0], vec![12.0]]);

        let naive = outputs.narrow(1, 2, 1).unwrap().squeeze(1).unwrap();
        assert_ne!(rows(&picked), rows(&naive));
    }

    #[test]
    fn test_select_last_valid_rejects_zero_length() {
        let outputs = Tensor::zeros((1, 3, 2), DType::F32, &Device::Cpu).unwrap();
        assert!(select_last_valid(&outputs, &[0]).is_err());
        assert!(select_last_valid(&outputs, &[1, 1]).is_err());
    }

    #[test]
    fn test_output_shapes() {
        let (_vm, lstm) = bilstm(4, 3);
        let xs = Tensor::ones((2, 5, 4), DType::F32, &Device::Cpu).unwrap();
        let out = lstm.forward(&xs, &[5, 2]).unwrap();
        assert_eq!(out.outputs.dims(), &[2, 5, 6]);
        assert_eq!(out.last_fw.dims(), &[2, 3]);
        assert_eq!(out.final_states().unwrap().dims(), &[2, 6]);
    }

    #[test]
    fn test_padding_does_not_change_results() {
        let (_vm, lstm) = bilstm(2, 3);
        let short = Tensor::new(&[[[0.5f32, -1.0], [2.0, 0.25]]], &Device::Cpu).unwrap();
        let padded = Tensor::new(&[[[0.5f32, -1.0], [2.0, 0.25], [9.0, 9.0], [-7.0, 3.0]]], &Device::Cpu)
            .unwrap();

        let a = lstm.forward(&short, &[2]).unwrap();
        let b = lstm.forward(&padded, &[2]).unwrap();

        for (x, y) in [(&a.last_fw, &b.last_fw), (&a.last_bw, &b.last_bw)] {
            let (x, y) = (rows(x), rows(y));
            for (u, v) in x[0].iter().zip(&y[0]) {
                assert!((u - v).abs() < 1e-5);
            }
        }

        let tail: Vec<Vec<f32>> = b.outputs.narrow(1, 2, 2).unwrap().squeeze(0).unwrap().to_vec2().unwrap();
        assert!(tail.iter().flatten().all(|&v| v == 0.0));
    }

    #[test]
    fn test_zero_length_gives_zero_state() {
        let (_vm, lstm) = bilstm(2, 2);
        let xs = Tensor::ones((1, 3, 2), DType::F32, &Device::Cpu).unwrap();
        let out = lstm.forward(&xs, &[0]).unwrap();
        assert!(rows(&out.last_fw)[0].iter().all(|&v| v == 0.0));
        assert!(rows(&out.last_bw)[0].iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_backward_final_state_matches_first_output() {
        // The backward direction finishes on the first valid token.
        let (_vm, lstm) = bilstm(2, 2);
        let xs = Tensor::new(&[[[1f32, 0.0], [0.0, 1.0], [0.0, 0.0]]], &Device::Cpu).unwrap();
        let out = lstm.forward(&xs, &[2]).unwrap();
        let first: Vec<f32> = out.outputs.narrow(1, 0, 1).unwrap().flatten_all().unwrap().to_vec1().unwrap();
        let bw = rows(&out.last_bw);
        for (u, v) in first[2..].iter().zip(&bw[0]) {
            assert!((u - v).abs() < 1e-6);
        }
    }

    #[test]
    fn test_rejects_length_past_timesteps() {
        let (_vm, lstm) = bilstm(2, 2);
        let xs = Tensor::ones((1, 2, 2), DType::F32, &Device::Cpu).unwrap();
        assert!(lstm.forward(&xs, &[3]).is_err());
    }
}
