//! Mention encoders.
//!
//! - [`WordCharEncoder`]: word embedding concatenated with the final states
//!   of a character BiLSTM run over each word
//! - [`LastStepEncoder`]: BiLSTM over a sequence, reduced to the output at
//!   the last valid timestep; used for both the lexical (`lstm_1`) and the
//!   contextual-embedding (`bert`) paths

use candle_core::{Tensor, D};
use candle_nn::{embedding, Embedding, Module, VarBuilder};

use super::ops::Dropout;
use super::rnn::{last_valid_positions, select_last_valid, BiLstm};
use crate::config::ModelConfig;
use crate::{Error, Result};

// =============================================================================
// Word + character representation
// =============================================================================

/// Per-word representation `[word_emb ; char_fw ; char_bw]`.
pub struct WordCharEncoder {
    words: Embedding,
    frozen_words: bool,
    chars: Embedding,
    char_lstm: BiLstm,
}

impl WordCharEncoder {
    /// Build the encoder.
    ///
    /// With `pretrained` set, the word table is that tensor, used as-is and
    /// never registered as a trainable variable. Otherwise a `[nwords, dim_word]`
    /// table is created under `words`.
    pub fn new(config: &ModelConfig, pretrained: Option<Tensor>, vb: VarBuilder) -> Result<Self> {
        let (words, frozen_words) = match pretrained {
            Some(table) => {
                let (rows, cols) = table.dims2()?;
                if cols != config.dim_word {
                    return Err(Error::model_init(format!(
                        "pretrained embeddings have width {cols}, expected {}",
                        config.dim_word
                    )));
                }
                if rows < config.nwords {
                    return Err(Error::model_init(format!(
                        "pretrained embeddings cover {rows} words, vocabulary has {}",
                        config.nwords
                    )));
                }
                (Embedding::new(table, config.dim_word), true)
            }
            None => {
                log::warn!("randomly initializing word vectors");
                let table = embedding(config.nwords, config.dim_word, vb.pp("words"))
                    .map_err(|e| Error::model_init(format!("word embeddings: {e}")))?;
                (table, false)
            }
        };

        let chars_vb = vb.pp("chars");
        let chars = embedding(config.nchars, config.dim_char, chars_vb.pp("embeddings"))
            .map_err(|e| Error::model_init(format!("char embeddings: {e}")))?;
        let char_lstm = BiLstm::new(config.dim_char, config.hidden_size_char, chars_vb.pp("bilstm"))?;

        Ok(Self {
            words,
            frozen_words,
            chars,
            char_lstm,
        })
    }

    /// True if the word table came from pretrained vectors.
    #[must_use]
    pub fn frozen_words(&self) -> bool {
        self.frozen_words
    }

    /// The `[nwords, dim_word]` word table.
    #[must_use]
    pub fn word_table(&self) -> &Tensor {
        self.words.embeddings()
    }

    /// Encode padded ids.
    ///
    /// * `word_ids` - `[batch, timesteps]`
    /// * `char_ids` - `[batch, timesteps, max_chars]`
    /// * `word_lengths` - `batch * timesteps` character counts, row-major
    ///
    /// Returns `[batch, timesteps, dim_word + 2 * hidden_size_char]` with
    /// dropout applied.
    pub fn forward(
        &self,
        word_ids: &Tensor,
        char_ids: &Tensor,
        word_lengths: &[usize],
        dropout: &mut Dropout<'_>,
    ) -> Result<Tensor> {
        let (batch, timesteps) = word_ids.dims2()?;
        let (_, _, max_chars) = char_ids.dims3()?;

        let word_emb = self.words.forward(word_ids)?;

        let char_emb = self
            .chars
            .forward(char_ids)?
            .reshape((batch * timesteps, max_chars, ()))?;
        let char_repr = self
            .char_lstm
            .forward(&char_emb, word_lengths)?
            .final_states()?
            .reshape((batch, timesteps, ()))?;

        let repr = Tensor::cat(&[&word_emb, &char_repr], D::Minus1)?;
        dropout.apply(&repr)
    }
}

// =============================================================================
// Sequence → last valid step
// =============================================================================

/// BiLSTM reduced to its output at each row's last valid timestep.
pub struct LastStepEncoder {
    lstm: BiLstm,
}

impl LastStepEncoder {
    /// Create an encoder reading `in_dim` features with `hidden` units per direction.
    pub fn new(in_dim: usize, hidden: usize, vb: VarBuilder) -> Result<Self> {
        Ok(Self {
            lstm: BiLstm::new(in_dim, hidden, vb)?,
        })
    }

    /// Output width (`2 * hidden`).
    #[must_use]
    pub fn output_dim(&self) -> usize {
        2 * self.lstm.hidden()
    }

    /// `[batch, timesteps, in_dim]` → `[batch, 2 * hidden]`.
    ///
    /// Dropout is applied to the full output sequence before selection.
    /// Every length must lie in `1..=timesteps`.
    pub fn forward(&self, xs: &Tensor, lengths: &[usize], dropout: &mut Dropout<'_>) -> Result<Tensor> {
        let (_, timesteps, _) = xs.dims3()?;
        last_valid_positions(lengths, timesteps)?;

        let outputs = self.lstm.forward(xs, lengths)?.outputs;
        let outputs = dropout.apply(&outputs)?;
        select_last_valid(&outputs, lengths)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, Device};
    use candle_nn::VarMap;

    fn small_config() -> ModelConfig {
        ModelConfig::default()
            .with_vocab(6, 5)
            .with_embedding_dims(4, 3)
            .with_hidden_sizes(2, 3, 3)
            .with_timesteps(3)
    }

    fn ids(batch: usize, timesteps: usize, chars: usize) -> (Tensor, Tensor) {
        let words = Tensor::from_vec(vec![1u32; batch * timesteps], (batch, timesteps), &Device::Cpu).unwrap();
        let chars = Tensor::from_vec(
            vec![2u32; batch * timesteps * chars],
            (batch, timesteps, chars),
            &Device::Cpu,
        )
        .unwrap();
        (words, chars)
    }

    #[test]
    fn test_word_char_shape() {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        let cfg = small_config();
        let enc = WordCharEncoder::new(&cfg, None, vb).unwrap();
        assert!(!enc.frozen_words());

        let (w, c) = ids(2, 3, 4);
        let out = enc
            .forward(&w, &c, &[4, 2, 0, 1, 0, 0], &mut Dropout::disabled())
            .unwrap();
        assert_eq!(out.dims(), &[2, 3, cfg.word_repr_dim()]);
    }

    #[test]
    fn test_pretrained_words_not_registered() {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        let cfg = small_config();
        let table = Tensor::ones((6, 4), DType::F32, &Device::Cpu).unwrap();
        let enc = WordCharEncoder::new(&cfg, Some(table), vb).unwrap();
        assert!(enc.frozen_words());

        let data = varmap.data().lock().unwrap();
        assert!(data.keys().all(|k| !k.starts_with("words")));
        assert!(data.keys().any(|k| k.starts_with("chars")));
    }

    #[test]
    fn test_pretrained_width_mismatch() {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        let table = Tensor::ones((6, 7), DType::F32, &Device::Cpu).unwrap();
        assert!(WordCharEncoder::new(&small_config(), Some(table), vb).is_err());
    }

    #[test]
    fn test_last_step_encoder() {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        let enc = LastStepEncoder::new(4, 3, vb).unwrap();
        assert_eq!(enc.output_dim(), 6);

        let xs = Tensor::ones((2, 3, 4), DType::F32, &Device::Cpu).unwrap();
        let out = enc.forward(&xs, &[1, 3], &mut Dropout::disabled()).unwrap();
        assert_eq!(out.dims(), &[2, 6]);
        assert!(enc.forward(&xs, &[0, 3], &mut Dropout::disabled()).is_err());
    }

    #[test]
    fn test_last_step_encoder_row_independent_of_batch() {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        let enc = LastStepEncoder::new(4, 3, vb).unwrap();

        let xs = Tensor::randn(0f32, 1.0, (2, 3, 4), &Device::Cpu).unwrap();
        let batched: Vec<Vec<f32>> = enc
            .forward(&xs, &[2, 3], &mut Dropout::disabled())
            .unwrap()
            .to_vec2()
            .unwrap();
        let alone: Vec<Vec<f32>> = enc
            .forward(&xs.narrow(0, 0, 1).unwrap(), &[2], &mut Dropout::disabled())
            .unwrap()
            .to_vec2()
            .unwrap();

        for (x, y) in batched[0].iter().zip(&alone[0]) {
            assert!((x - y).abs() < 1e-5);
        }
        // position 2 is padding for the first row and emits zeros
        assert!(batched[0].iter().any(|v| v.abs() > 0.0));
    }
}
