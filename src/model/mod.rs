//! The typing network.
//!
//! ```text
//! mention words ──► WordCharEncoder ──► lstm_1 BiLSTM ──► last valid step ─┐
//!                                                                          ├─► concat ─► proj ─► · label_emb[g]ᵀ ─► softmax
//! contextual rows ─────────────────────► bert BiLSTM ───► last valid step ─┘
//! ```
//!
//! Trainable variables live under the `VarBuilder` prefixes `words`
//! (unless pretrained vectors are supplied), `chars`, `lstm_1`, `bert` and
//! `proj`. Label embeddings and pretrained word vectors are plain tensors.

pub mod encoder;
pub mod loss;
pub mod ops;
pub mod projector;
pub mod rnn;

use candle_core::{Device, Tensor, D};
use candle_nn::VarBuilder;

pub use encoder::{LastStepEncoder, WordCharEncoder};
pub use loss::{margin_loss, margin_terms, MARGIN};
pub use ops::Dropout;
pub use projector::{LabelEmbeddings, LabelSpaceProjector, Scores};
pub use rnn::{last_valid_positions, select_last_valid, BiLstm};

use crate::config::ModelConfig;
use crate::dataset::RawBatch;
use crate::padding::{pad_chars, pad_words, PAD_ID};
use crate::types::Granularity;
use crate::vocab::MentionProcessor;
use crate::{Error, Result};

// =============================================================================
// Device Selection
// =============================================================================

/// Get the best available compute device.
pub fn best_device() -> Result<Device> {
    #[cfg(all(target_os = "macos", feature = "metal"))]
    {
        if let Ok(device) = Device::new_metal(0) {
            log::info!("using Metal GPU");
            return Ok(device);
        }
    }

    #[cfg(feature = "cuda")]
    {
        if let Ok(device) = Device::new_cuda(0) {
            log::info!("using CUDA GPU");
            return Ok(device);
        }
    }

    log::info!("using CPU");
    Ok(Device::Cpu)
}

// =============================================================================
// Inputs
// =============================================================================

/// Network inputs for one batch.
#[derive(Debug, Clone)]
pub struct Inputs {
    /// `[batch, timesteps]` word ids
    pub word_ids: Tensor,
    /// Words per mention (after truncation to `timesteps`)
    pub mention_lengths: Vec<usize>,
    /// `[batch, timesteps, max_chars]` character ids
    pub char_ids: Tensor,
    /// `batch * timesteps` characters per word, row-major
    pub word_lengths: Vec<usize>,
    /// `[batch, timesteps, bert_emb_len]` contextual embeddings
    pub embedding: Tensor,
    /// Valid contextual rows per mention
    pub embedding_lengths: Vec<usize>,
}

impl Inputs {
    /// Tokenize, pad and upload a raw batch.
    pub fn build(
        processor: &MentionProcessor,
        batch: &RawBatch,
        timesteps: usize,
        device: &Device,
    ) -> Result<Self> {
        if batch.timesteps != timesteps {
            return Err(Error::invalid_input(format!(
                "batch has {} timesteps, model expects {timesteps}",
                batch.timesteps
            )));
        }
        let embedding = batch.embedding_tensor(device)?;
        Self::from_mentions(processor, &batch.mentions, embedding, batch.lengths.clone(), timesteps)
    }

    /// Tokenize and pad mention texts next to an already-built embedding tensor.
    pub fn from_mentions<S: AsRef<str>>(
        processor: &MentionProcessor,
        mentions: &[S],
        embedding: Tensor,
        embedding_lengths: Vec<usize>,
        timesteps: usize,
    ) -> Result<Self> {
        let (batch, emb_steps, _) = embedding.dims3()?;
        if batch != mentions.len() || embedding_lengths.len() != batch {
            return Err(Error::invalid_input(format!(
                "{} mentions, {batch} embedding rows, {} lengths",
                mentions.len(),
                embedding_lengths.len()
            )));
        }
        if emb_steps != timesteps {
            return Err(Error::invalid_input(format!(
                "embedding has {emb_steps} timesteps, model expects {timesteps}"
            )));
        }

        let device = embedding.device().clone();
        let (chars, words) = processor.process_batch(mentions);
        let words = pad_words(&words, timesteps, PAD_ID);
        let chars = pad_chars(&chars, timesteps, PAD_ID);

        let word_ids: Vec<u32> = words.ids.into_iter().flatten().collect();
        let word_ids = Tensor::from_vec(word_ids, (batch, timesteps), &device)?;
        let char_ids: Vec<u32> = chars.ids.into_iter().flatten().flatten().collect();
        let char_ids = Tensor::from_vec(char_ids, (batch, timesteps, chars.max_chars), &device)?;

        Ok(Self {
            word_ids,
            mention_lengths: words.lengths,
            char_ids,
            word_lengths: chars.word_lengths.into_iter().flatten().collect(),
            embedding,
            embedding_lengths,
        })
    }

    /// Batch size.
    #[must_use]
    pub fn len(&self) -> usize {
        self.mention_lengths.len()
    }

    /// True if the batch is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.mention_lengths.is_empty()
    }
}

// =============================================================================
// Network
// =============================================================================

/// Output of [`NetModel::forward`].
#[derive(Debug, Clone)]
pub struct Features {
    /// `[batch, 2 * hidden_size_bert + 2 * hidden_size_lstm_1]`, contextual part first
    pub fused: Tensor,
    /// `[batch, n_label_emb]`
    pub projected: Tensor,
}

/// Mention typing network.
pub struct NetModel {
    config: ModelConfig,
    encoder: WordCharEncoder,
    lexical: LastStepEncoder,
    contextual: LastStepEncoder,
    projector: LabelSpaceProjector,
    labels: LabelEmbeddings,
}

impl NetModel {
    /// Build every component.
    ///
    /// `labels` must have width `n_label_emb`. `pretrained`, when given, is the
    /// frozen `[nwords, dim_word]` word table.
    pub fn new(
        config: &ModelConfig,
        labels: LabelEmbeddings,
        pretrained: Option<Tensor>,
        vb: VarBuilder,
    ) -> Result<Self> {
        if labels.dim() != config.n_label_emb {
            return Err(Error::model_init(format!(
                "label embeddings have width {}, n_label_emb is {}",
                labels.dim(),
                config.n_label_emb
            )));
        }

        let encoder = WordCharEncoder::new(config, pretrained, vb.clone())?;
        let lexical = LastStepEncoder::new(config.word_repr_dim(), config.hidden_size_lstm_1, vb.pp("lstm_1"))?;
        let contextual = LastStepEncoder::new(config.bert_emb_len, config.hidden_size_bert, vb.pp("bert"))?;
        let projector = LabelSpaceProjector::new(config.fused_dim(), config.n_label_emb, vb.pp("proj"))?;

        log::debug!(
            "network: word repr {}, fused {}, label space {}",
            config.word_repr_dim(),
            config.fused_dim(),
            config.n_label_emb
        );

        Ok(Self {
            config: config.clone(),
            encoder,
            lexical,
            contextual,
            projector,
            labels,
        })
    }

    /// Dimensions the network was built with.
    #[must_use]
    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    /// Fixed label embeddings.
    #[must_use]
    pub fn labels(&self) -> &LabelEmbeddings {
        &self.labels
    }

    /// Word embedding table.
    #[must_use]
    pub fn word_table(&self) -> &Tensor {
        self.encoder.word_table()
    }

    /// True if the word table is frozen pretrained vectors.
    #[must_use]
    pub fn frozen_words(&self) -> bool {
        self.encoder.frozen_words()
    }

    /// Encode a batch into fused and projected features.
    pub fn forward(&self, inputs: &Inputs, dropout: &mut Dropout<'_>) -> Result<Features> {
        let word_repr = self.encoder.forward(
            &inputs.word_ids,
            &inputs.char_ids,
            &inputs.word_lengths,
            dropout,
        )?;
        let lexical = self.lexical.forward(&word_repr, &inputs.mention_lengths, dropout)?;
        let contextual = self
            .contextual
            .forward(&inputs.embedding, &inputs.embedding_lengths, dropout)?;

        let fused = Tensor::cat(&[&contextual, &lexical], D::Minus1)?;
        let projected = self.projector.project(&fused)?;
        Ok(Features { fused, projected })
    }

    /// Score projected features against one granularity's labels.
    pub fn score(&self, features: &Features, granularity: Granularity) -> Result<Scores> {
        self.projector
            .score(&features.projected, self.labels.get(granularity))
    }

    /// Forward pass without dropout, scored at `granularity`.
    pub fn predict(&self, inputs: &Inputs, granularity: Granularity) -> Result<Scores> {
        let features = self.forward(inputs, &mut Dropout::disabled())?;
        self.score(&features, granularity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vocab::{Vocab, UNK};
    use candle_core::DType;
    use candle_nn::VarMap;

    fn config() -> ModelConfig {
        ModelConfig::default()
            .with_vocab(5, 8)
            .with_embedding_dims(4, 3)
            .with_hidden_sizes(2, 3, 2)
            .with_bert_emb_len(5)
            .with_timesteps(3)
            .with_label_emb_dim(4)
    }

    fn labels() -> LabelEmbeddings {
        let m = |n: usize| Tensor::randn(0f32, 1.0, (n, 4), &Device::Cpu).unwrap();
        LabelEmbeddings::from_tensors(m(6), m(6), m(2), m(3)).unwrap()
    }

    fn processor() -> MentionProcessor {
        MentionProcessor::new(
            Vocab::from_tokens(["<pad>", UNK, "new", "york", "paris"]),
            Vocab::from_tokens(["<pad>", "n", "e", "w", "y", "o", "r", "k"]),
        )
        .unwrap()
    }

    fn inputs(mentions: &[&str]) -> Inputs {
        let embedding = Tensor::randn(0f32, 1.0, (mentions.len(), 3, 5), &Device::Cpu).unwrap();
        let lengths = vec![2; mentions.len()];
        Inputs::from_mentions(&processor(), mentions, embedding, lengths, 3).unwrap()
    }

    #[test]
    fn test_inputs_padding() {
        let inp = inputs(&["new york", "paris"]);
        assert_eq!(inp.word_ids.dims(), &[2, 3]);
        assert_eq!(inp.mention_lengths, vec![2, 1]);
        assert_eq!(inp.char_ids.dims(), &[2, 3, 4]);
        // only "r" of "paris" is in the character vocabulary
        assert_eq!(inp.word_lengths, vec![3, 4, 0, 1, 0, 0]);
    }

    #[test]
    fn test_inputs_reject_wrong_timesteps() {
        let embedding = Tensor::zeros((1, 4, 5), DType::F32, &Device::Cpu).unwrap();
        assert!(Inputs::from_mentions(&processor(), &["paris"], embedding, vec![1], 3).is_err());
    }

    #[test]
    fn test_forward_shapes_and_distributions() {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        let cfg = config();
        let model = NetModel::new(&cfg, labels(), None, vb).unwrap();

        let features = model.forward(&inputs(&["New York", "paris"]), &mut Dropout::disabled()).unwrap();
        assert_eq!(features.fused.dims(), &[2, cfg.fused_dim()]);
        assert_eq!(features.projected.dims(), &[2, 4]);

        for g in Granularity::ALL {
            let scores = model.score(&features, g).unwrap();
            let probs: Vec<Vec<f32>> = scores.probs.to_vec2().unwrap();
            assert_eq!(probs[0].len(), model.labels().label_count(g));
            for row in probs {
                assert!((row.iter().sum::<f32>() - 1.0).abs() < 1e-5);
            }
        }
    }

    #[test]
    fn test_variable_prefixes() {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        NetModel::new(&config(), labels(), None, vb).unwrap();
        let data = varmap.data().lock().unwrap();
        for prefix in ["words.", "chars.", "lstm_1.", "bert.", "proj."] {
            assert!(data.keys().any(|k| k.starts_with(prefix)), "missing {prefix}");
        }
    }

    #[test]
    fn test_empty_mention_rejected() {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        let model = NetModel::new(&config(), labels(), None, vb).unwrap();
        assert!(model.predict(&inputs(&["   "]), Granularity::Train).is_err());
    }

    #[test]
    fn test_label_width_checked() {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        let cfg = config().with_label_emb_dim(7);
        assert!(NetModel::new(&cfg, labels(), None, vb).is_err());
    }
}
