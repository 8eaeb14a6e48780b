//! Mention datasets and batch sources.
//!
//! Splits are stored as JSON Lines, one mention per line:
//!
//! ```json
//! {"mention": "Barack Obama", "embedding": [[0.1, ...], [0.3, ...]], "labels": [4, 17], "length": 2}
//! ```
//!
//! - `embedding`: per-token contextual vectors (at most `timesteps` rows of
//!   `bert_emb_len` values; shorter inputs are zero-padded)
//! - `labels`: gold label indices for the split's granularity
//! - `length`: number of valid embedding rows (defaults to the row count)

use candle_core::{Device, Tensor};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::{Error, Result};

/// One annotated mention.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Example {
    /// Raw mention text
    pub mention: String,
    /// Contextual embedding rows
    pub embedding: Vec<Vec<f32>>,
    /// Gold label indices (empty for unlabeled input)
    #[serde(default)]
    pub labels: Vec<usize>,
    /// Valid embedding rows
    #[serde(default)]
    pub length: Option<usize>,
}

/// A batch as pulled from a source, before tokenization.
#[derive(Debug, Clone)]
pub struct RawBatch {
    /// Mention texts
    pub mentions: Vec<String>,
    /// `[batch * timesteps * emb_dim]` contextual embeddings
    pub embedding: Vec<f32>,
    /// Valid rows of each embedding sequence
    pub lengths: Vec<usize>,
    /// `[batch * label_count]` multi-hot targets
    pub targets: Vec<f32>,
    /// Gold label indices per mention
    pub gold: Vec<Vec<usize>>,
    /// Timestep cap
    pub timesteps: usize,
    /// Width of each embedding row
    pub emb_dim: usize,
    /// Number of labels in the granularity
    pub label_count: usize,
}

impl RawBatch {
    /// Number of mentions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.mentions.len()
    }

    /// True if the batch holds no mentions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.mentions.is_empty()
    }

    /// Embeddings as a `[batch, timesteps, emb_dim]` tensor.
    pub fn embedding_tensor(&self, device: &Device) -> Result<Tensor> {
        Ok(Tensor::from_slice(
            &self.embedding,
            (self.len(), self.timesteps, self.emb_dim),
            device,
        )?)
    }

    /// Targets as a `[batch, label_count]` tensor.
    pub fn target_tensor(&self, device: &Device) -> Result<Tensor> {
        Ok(Tensor::from_slice(
            &self.targets,
            (self.len(), self.label_count),
            device,
        )?)
    }
}

/// Anything that hands out training batches.
pub trait BatchSource {
    /// Pull the next batch of at most `batch_size` mentions.
    fn next_batch(&mut self, batch_size: usize) -> Result<RawBatch>;

    /// Number of examples behind the source.
    fn len(&self) -> usize;

    /// True if the source has no examples.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A validated, in-memory split.
#[derive(Debug, Clone)]
pub struct Split {
    examples: Vec<Example>,
    label_count: usize,
    timesteps: usize,
    emb_dim: usize,
}

impl Split {
    /// Validate examples against the model shape.
    ///
    /// Rejects out-of-range labels, embedding rows of the wrong width, and
    /// lengths outside `1..=timesteps`. Extra embedding rows are truncated.
    pub fn from_examples(
        examples: Vec<Example>,
        label_count: usize,
        timesteps: usize,
        emb_dim: usize,
    ) -> Result<Self> {
        let mut checked = Vec::with_capacity(examples.len());
        for (i, mut ex) in examples.into_iter().enumerate() {
            if let Some(&bad) = ex.labels.iter().find(|&&l| l >= label_count) {
                return Err(Error::dataset(format!(
                    "example {i}: label {bad} out of range for {label_count} labels"
                )));
            }
            if let Some(row) = ex.embedding.iter().find(|r| r.len() != emb_dim) {
                return Err(Error::dataset(format!(
                    "example {i}: embedding row has width {}, expected {emb_dim}",
                    row.len()
                )));
            }
            ex.embedding.truncate(timesteps);
            let length = ex.length.unwrap_or(ex.embedding.len());
            if length == 0 || length > timesteps {
                return Err(Error::dataset(format!(
                    "example {i}: length {length} outside 1..={timesteps}"
                )));
            }
            ex.length = Some(length);
            checked.push(ex);
        }

        Ok(Self {
            examples: checked,
            label_count,
            timesteps,
            emb_dim,
        })
    }

    /// Load and validate a JSONL split.
    pub fn load(
        path: impl AsRef<Path>,
        label_count: usize,
        timesteps: usize,
        emb_dim: usize,
    ) -> Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path)
            .map_err(|e| Error::dataset(format!("{}: {e}", path.display())))?;

        let mut examples = Vec::new();
        for (lineno, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let ex: Example = serde_json::from_str(&line).map_err(|e| {
                Error::dataset(format!("{}:{}: {e}", path.display(), lineno + 1))
            })?;
            examples.push(ex);
        }
        log::debug!("loaded {} examples from {}", examples.len(), path.display());

        Self::from_examples(examples, label_count, timesteps, emb_dim)
    }

    /// Number of examples.
    #[must_use]
    pub fn len(&self) -> usize {
        self.examples.len()
    }

    /// True if the split is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.examples.is_empty()
    }

    /// Number of labels in this split's granularity.
    #[must_use]
    pub fn label_count(&self) -> usize {
        self.label_count
    }

    /// Assemble a batch from example indices.
    #[must_use]
    pub fn batch(&self, indices: &[usize]) -> RawBatch {
        let row_width = self.timesteps * self.emb_dim;
        let mut embedding = Vec::with_capacity(indices.len() * row_width);
        let mut targets = vec![0.0f32; indices.len() * self.label_count];
        let mut mentions = Vec::with_capacity(indices.len());
        let mut lengths = Vec::with_capacity(indices.len());
        let mut gold = Vec::with_capacity(indices.len());

        for (row, &i) in indices.iter().enumerate() {
            let ex = &self.examples[i];
            let start = embedding.len();
            for r in &ex.embedding {
                embedding.extend_from_slice(r);
            }
            embedding.resize(start + row_width, 0.0);

            for &l in &ex.labels {
                targets[row * self.label_count + l] = 1.0;
            }
            mentions.push(ex.mention.clone());
            lengths.push(ex.length.unwrap_or(ex.embedding.len()));
            gold.push(ex.labels.clone());
        }

        RawBatch {
            mentions,
            embedding,
            lengths,
            targets,
            gold,
            timesteps: self.timesteps,
            emb_dim: self.emb_dim,
            label_count: self.label_count,
        }
    }
}

/// Shuffles a split each pass and repeats it forever.
#[derive(Debug, Clone)]
pub struct ShuffledSource {
    split: Split,
    order: Vec<usize>,
    pos: usize,
    rng: ChaCha8Rng,
}

impl ShuffledSource {
    /// Create a source seeded for reproducible order.
    #[must_use]
    pub fn new(split: Split, seed: u64) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut order: Vec<usize> = (0..split.len()).collect();
        order.shuffle(&mut rng);
        Self {
            split,
            order,
            pos: 0,
            rng,
        }
    }

    /// Underlying split.
    #[must_use]
    pub fn split(&self) -> &Split {
        &self.split
    }
}

impl BatchSource for ShuffledSource {
    fn next_batch(&mut self, batch_size: usize) -> Result<RawBatch> {
        if self.split.is_empty() {
            return Err(Error::dataset("cannot draw a batch from an empty split"));
        }
        let mut picked = Vec::with_capacity(batch_size);
        while picked.len() < batch_size {
            if self.pos == self.order.len() {
                self.order.shuffle(&mut self.rng);
                self.pos = 0;
            }
            picked.push(self.order[self.pos]);
            self.pos += 1;
        }
        Ok(self.split.batch(&picked))
    }

    fn len(&self) -> usize {
        self.split.len()
    }
}
