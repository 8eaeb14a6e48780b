//! Model, training and data configuration.
//!
//! A full run is described by one TOML file:
//!
//! ```toml
//! [model]
//! nwords = 20000
//! nchars = 100
//! timesteps = 10
//!
//! [train]
//! lr = 0.001
//! batch_size = 100
//! dir_output = "results/run1"
//!
//! [data]
//! words = "data/words.txt"
//! chars = "data/chars.txt"
//! label_embeddings = "data/label_emb.safetensors"
//! supertypefile_common = "data/supertype_common.txt"
//! train = "data/train.jsonl"
//! dev = "data/dev.jsonl"
//! test = "data/test.jsonl"
//! level1 = "data/level1.jsonl"
//! level2 = "data/level2.jsonl"
//! ```
//!
//! Every section and field has a default, so partial files are fine.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::types::LrMethod;
use crate::{Error, Result};

// =============================================================================
// Model
// =============================================================================

/// Network dimensions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Word vocabulary size
    pub nwords: usize,
    /// Character vocabulary size
    pub nchars: usize,
    /// Word embedding width
    pub dim_word: usize,
    /// Character embedding width
    pub dim_char: usize,
    /// Hidden size of each direction of the character encoder
    pub hidden_size_char: usize,
    /// Hidden size of each direction of the lexical (word) encoder
    pub hidden_size_lstm_1: usize,
    /// Hidden size of each direction of the external-embedding encoder
    pub hidden_size_bert: usize,
    /// Width of the precomputed contextual embeddings
    pub bert_emb_len: usize,
    /// Maximum number of timesteps per mention
    pub timesteps: usize,
    /// Width of the shared label-embedding space
    pub n_label_emb: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            nwords: 0,
            nchars: 0,
            dim_word: 300,
            dim_char: 100,
            hidden_size_char: 100,
            hidden_size_lstm_1: 300,
            hidden_size_bert: 300,
            bert_emb_len: 768,
            timesteps: 10,
            n_label_emb: 300,
        }
    }
}

impl ModelConfig {
    /// Set vocabulary sizes.
    #[must_use]
    pub fn with_vocab(mut self, nwords: usize, nchars: usize) -> Self {
        self.nwords = nwords;
        self.nchars = nchars;
        self
    }

    /// Set word and character embedding widths.
    #[must_use]
    pub fn with_embedding_dims(mut self, dim_word: usize, dim_char: usize) -> Self {
        self.dim_word = dim_word;
        self.dim_char = dim_char;
        self
    }

    /// Set the three encoder hidden sizes (char, lexical, external).
    #[must_use]
    pub fn with_hidden_sizes(mut self, char: usize, lstm_1: usize, bert: usize) -> Self {
        self.hidden_size_char = char;
        self.hidden_size_lstm_1 = lstm_1;
        self.hidden_size_bert = bert;
        self
    }

    /// Set the external embedding width.
    #[must_use]
    pub fn with_bert_emb_len(mut self, len: usize) -> Self {
        self.bert_emb_len = len;
        self
    }

    /// Set the timestep cap.
    #[must_use]
    pub fn with_timesteps(mut self, timesteps: usize) -> Self {
        self.timesteps = timesteps;
        self
    }

    /// Set the label-embedding width.
    #[must_use]
    pub fn with_label_emb_dim(mut self, dim: usize) -> Self {
        self.n_label_emb = dim;
        self
    }

    /// Width of the fused feature vector fed to the projector.
    #[must_use]
    pub fn fused_dim(&self) -> usize {
        2 * self.hidden_size_bert + 2 * self.hidden_size_lstm_1
    }

    /// Width of each word vector after the char branch is concatenated.
    #[must_use]
    pub fn word_repr_dim(&self) -> usize {
        self.dim_word + 2 * self.hidden_size_char
    }

    fn validate(&self) -> Result<()> {
        let dims = [
            ("nwords", self.nwords),
            ("nchars", self.nchars),
            ("dim_word", self.dim_word),
            ("dim_char", self.dim_char),
            ("hidden_size_char", self.hidden_size_char),
            ("hidden_size_lstm_1", self.hidden_size_lstm_1),
            ("hidden_size_bert", self.hidden_size_bert),
            ("bert_emb_len", self.bert_emb_len),
            ("timesteps", self.timesteps),
            ("n_label_emb", self.n_label_emb),
        ];
        for (name, value) in dims {
            if value == 0 {
                return Err(Error::config(format!("model.{name} must be non-zero")));
            }
        }
        Ok(())
    }
}

// =============================================================================
// Training
// =============================================================================

/// Optimizer and epoch-loop settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainConfig {
    /// Learning rate
    pub lr: f64,
    /// Optimizer
    pub lr_method: LrMethod,
    /// Multiplicative learning-rate decay applied after every epoch
    pub lr_decay: f64,
    /// Global-norm gradient clip; non-positive disables clipping
    pub clip: f64,
    /// Dropout keep probability used for training steps
    pub dropout: f64,
    /// Batch size
    pub batch_size: usize,
    /// Maximum number of epochs
    pub nepochs: usize,
    /// Early stopping patience (epochs without dev improvement)
    pub nepoch_no_imprv: usize,
    /// Seed for dropout masks and batch shuffling
    pub seed: u64,
    /// Record a loss summary every N batches
    pub summary_every: usize,
    /// Show a progress bar during epochs
    pub progress: bool,
    /// Directory for checkpoints, summaries and prediction files
    pub dir_output: PathBuf,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            lr: 0.001,
            lr_method: LrMethod::Adam,
            lr_decay: 0.9,
            clip: -1.0,
            dropout: 0.5,
            batch_size: 100,
            nepochs: 15,
            nepoch_no_imprv: 3,
            seed: 1,
            summary_every: 10,
            progress: false,
            dir_output: PathBuf::from("results"),
        }
    }
}

impl TrainConfig {
    /// Set the learning rate.
    #[must_use]
    pub fn with_lr(mut self, lr: f64) -> Self {
        self.lr = lr;
        self
    }

    /// Set the optimizer.
    #[must_use]
    pub fn with_lr_method(mut self, method: LrMethod) -> Self {
        self.lr_method = method;
        self
    }

    /// Set the batch size.
    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Set the dropout keep probability.
    #[must_use]
    pub fn with_dropout(mut self, keep_prob: f64) -> Self {
        self.dropout = keep_prob;
        self
    }

    /// Set the number of epochs.
    #[must_use]
    pub fn with_epochs(mut self, nepochs: usize) -> Self {
        self.nepochs = nepochs;
        self
    }

    /// Set the seed.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Set the output directory.
    #[must_use]
    pub fn with_dir_output(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dir_output = dir.into();
        self
    }

    /// Path of the best-model checkpoint.
    #[must_use]
    pub fn checkpoint_path(&self) -> PathBuf {
        self.dir_output.join("model.safetensors")
    }

    fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(Error::config("train.batch_size must be at least 1"));
        }
        if !(self.dropout > 0.0 && self.dropout <= 1.0) {
            return Err(Error::config(format!(
                "train.dropout is a keep probability in (0, 1], got {}",
                self.dropout
            )));
        }
        if self.summary_every == 0 {
            return Err(Error::config("train.summary_every must be at least 1"));
        }
        Ok(())
    }
}

// =============================================================================
// Data
// =============================================================================

/// Locations of vocabularies, embeddings, taxonomy and splits.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    /// Word vocabulary, one word per line
    pub words: PathBuf,
    /// Character vocabulary, one character per line
    pub chars: PathBuf,
    /// Pretrained word vectors (safetensors, tensor `embeddings`); frozen when set
    pub embeddings: Option<PathBuf>,
    /// Label embeddings (safetensors, tensors `train`, `test`, `level1`, `level2`)
    pub label_embeddings: PathBuf,
    /// Label taxonomy used to expand train/test predictions to raw label sets
    pub supertypefile_common: PathBuf,
    /// Training split (JSONL)
    pub train: PathBuf,
    /// Development split (JSONL)
    pub dev: PathBuf,
    /// Test split (JSONL)
    pub test: PathBuf,
    /// Level-1 evaluation split (JSONL)
    pub level1: PathBuf,
    /// Level-2 evaluation split (JSONL)
    pub level2: PathBuf,
}

// =============================================================================
// Top level
// =============================================================================

/// Complete run configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Network dimensions
    pub model: ModelConfig,
    /// Training settings
    pub train: TrainConfig,
    /// Input files
    pub data: DataConfig,
}

impl Config {
    /// Parse a configuration from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Config = toml::from_str(text)?;
        Ok(config)
    }

    /// Load a configuration file.
    pub fn from_toml_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&text)
    }

    /// Check dimensions and hyperparameters.
    ///
    /// Vocabulary sizes are usually filled in from the vocabulary files, so
    /// call this after they are known.
    pub fn validate(&self) -> Result<()> {
        self.model.validate()?;
        self.train.validate()
    }
}
