//! Epoch loop, evaluation entry points and checkpointing.

use candle_core::{DType, Device, Tensor};
use candle_nn::{VarBuilder, VarMap};
use indicatif::{ProgressBar, ProgressStyle};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::path::{Path, PathBuf};

use super::optimizer::{clip_grad_norm, TypingOptimizer};
use super::summary::{LossSummary, SummaryWriter};
use crate::config::Config;
use crate::dataset::{BatchSource, RawBatch, ShuffledSource, Split};
use crate::eval::{evaluate, write_predictions, TypingMetrics};
use crate::model::{margin_loss, Dropout, Inputs, LabelEmbeddings, NetModel};
use crate::taxonomy::LabelTaxonomy;
use crate::types::Granularity;
use crate::vocab::{MentionProcessor, Vocab};
use crate::{Error, Result};

/// Name of the predictions file written by [`Trainer::evaluate_all`].
pub const PREDICTIONS_FILE: &str = "label.txt";

/// Tensor name of pretrained word vectors inside their safetensors file.
pub const PRETRAINED_TENSOR: &str = "embeddings";

/// Everything a [`Trainer`] needs besides its configuration.
pub struct TrainerParts {
    /// Word/char id mapping
    pub processor: MentionProcessor,
    /// Fixed label embeddings
    pub labels: LabelEmbeddings,
    /// Frozen `[nwords, dim_word]` word vectors
    pub pretrained: Option<Tensor>,
    /// Supertype expansion for train/test predictions
    pub taxonomy: LabelTaxonomy,
    /// Training split
    pub train: Split,
    /// Development split
    pub dev: Split,
    /// Test split (train-sized label set)
    pub test: Option<Split>,
    /// Level-1 split
    pub level1: Option<Split>,
    /// Level-2 split
    pub level2: Option<Split>,
}

impl TrainerParts {
    /// Load every input named by `config.data`.
    ///
    /// Test and level splits are optional: an empty path skips them.
    pub fn load(config: &Config, device: &Device) -> Result<Self> {
        let data = &config.data;
        let processor = MentionProcessor::new(Vocab::load(&data.words)?, Vocab::load(&data.chars)?)?;
        let labels = LabelEmbeddings::load(&data.label_embeddings, device)?;
        let taxonomy = LabelTaxonomy::load(&data.supertypefile_common)?;
        let pretrained = data
            .embeddings
            .as_ref()
            .map(|path| load_pretrained(path, device))
            .transpose()?;

        let timesteps = config.model.timesteps;
        let emb_dim = config.model.bert_emb_len;
        let load = |path: &PathBuf, g: Granularity| {
            Split::load(path, labels.label_count(g), timesteps, emb_dim)
        };
        let optional = |path: &PathBuf, g: Granularity| -> Result<Option<Split>> {
            if path.as_os_str().is_empty() {
                Ok(None)
            } else {
                load(path, g).map(Some)
            }
        };

        let train = load(&data.train, Granularity::Train)?;
        let dev = load(&data.dev, Granularity::Train)?;
        let test = optional(&data.test, Granularity::Test)?;
        let level1 = optional(&data.level1, Granularity::Level1)?;
        let level2 = optional(&data.level2, Granularity::Level2)?;

        log::info!(
            "loaded {} train, {} dev mentions; {} word types, {} chars",
            train.len(),
            dev.len(),
            processor.words().len(),
            processor.chars().len()
        );

        Ok(Self {
            processor,
            labels,
            pretrained,
            taxonomy,
            train,
            dev,
            test,
            level1,
            level2,
        })
    }
}

fn load_pretrained(path: &Path, device: &Device) -> Result<Tensor> {
    let mut tensors = candle_core::safetensors::load(path, device)
        .map_err(|e| Error::model_init(format!("pretrained vectors {}: {e}", path.display())))?;
    let table = tensors.remove(PRETRAINED_TENSOR).ok_or_else(|| {
        Error::model_init(format!("{} has no `{PRETRAINED_TENSOR}` tensor", path.display()))
    })?;
    Ok(table.to_dtype(DType::F32)?)
}

/// Result of one [`Trainer::run_epoch`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpochReport {
    /// Epoch index
    pub epoch: usize,
    /// Batches run
    pub nbatches: usize,
    /// Sum of batch losses
    pub total_loss: f64,
    /// Development-set metrics
    pub dev: TypingMetrics,
}

/// Owns the network, its parameters and the data it trains on.
pub struct Trainer {
    config: Config,
    device: Device,
    varmap: VarMap,
    model: NetModel,
    optimizer: TypingOptimizer,
    processor: MentionProcessor,
    taxonomy: LabelTaxonomy,
    train: ShuffledSource,
    dev: Split,
    test: Option<Split>,
    level1: Option<Split>,
    level2: Option<Split>,
    rng: ChaCha8Rng,
    summaries: SummaryWriter,
}

impl Trainer {
    /// Load all inputs named by the configuration and build the model.
    pub fn new(config: Config, device: Device) -> Result<Self> {
        let parts = TrainerParts::load(&config, &device)?;
        Self::from_parts(config, device, parts)
    }

    /// Build from already-loaded inputs.
    ///
    /// Vocabulary sizes in `config.model` are replaced by the processor's.
    pub fn from_parts(mut config: Config, device: Device, parts: TrainerParts) -> Result<Self> {
        config.model.nwords = parts.processor.words().len();
        config.model.nchars = parts.processor.chars().len();
        config.validate()?;

        let labels = &parts.labels;
        let expect = |name: &str, split: &Split, g: Granularity| -> Result<()> {
            if split.label_count() != labels.label_count(g) {
                return Err(Error::config(format!(
                    "{name} split has {} labels, {g} label embeddings have {}",
                    split.label_count(),
                    labels.label_count(g)
                )));
            }
            Ok(())
        };
        expect("train", &parts.train, Granularity::Train)?;
        expect("dev", &parts.dev, Granularity::Train)?;
        for (name, split, g) in [
            ("test", &parts.test, Granularity::Test),
            ("level1", &parts.level1, Granularity::Level1),
            ("level2", &parts.level2, Granularity::Level2),
        ] {
            if let Some(split) = split {
                expect(name, split, g)?;
            }
        }

        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let model = NetModel::new(&config.model, parts.labels, parts.pretrained, vb)?;

        let train_cfg = &config.train;
        let optimizer = TypingOptimizer::new(train_cfg.lr_method, varmap.all_vars(), train_cfg.lr)?;
        let rng = ChaCha8Rng::seed_from_u64(train_cfg.seed);
        let train = ShuffledSource::new(parts.train, train_cfg.seed);
        let summaries = SummaryWriter::new(&train_cfg.dir_output);

        log::debug!(
            "trainer: {} trainable tensors, {:?} optimizer, lr {}",
            varmap.all_vars().len(),
            train_cfg.lr_method,
            train_cfg.lr
        );

        Ok(Self {
            config,
            device,
            varmap,
            model,
            optimizer,
            processor: parts.processor,
            taxonomy: parts.taxonomy,
            train,
            dev: parts.dev,
            test: parts.test,
            level1: parts.level1,
            level2: parts.level2,
            rng,
            summaries,
        })
    }

    /// Configuration in effect (with vocabulary sizes filled in).
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The network.
    #[must_use]
    pub fn model(&self) -> &NetModel {
        &self.model
    }

    /// Trainable parameters.
    #[must_use]
    pub fn varmap(&self) -> &VarMap {
        &self.varmap
    }

    /// Loss snapshots recorded so far.
    #[must_use]
    pub fn summaries(&self) -> &[LossSummary] {
        self.summaries.history()
    }

    /// Current learning rate.
    #[must_use]
    pub fn learning_rate(&self) -> f64 {
        self.optimizer.learning_rate()
    }

    /// Override the maximum number of epochs run by [`Trainer::fit`].
    pub fn set_epochs(&mut self, nepochs: usize) {
        self.config.train.nepochs = nepochs;
    }

    /// Toggle the per-epoch progress bar.
    pub fn set_progress(&mut self, progress: bool) {
        self.config.train.progress = progress;
    }

    /// Whether the split evaluated at `granularity` was loaded.
    ///
    /// The train and dev splits are always present.
    #[must_use]
    pub fn has_split(&self, granularity: Granularity) -> bool {
        match granularity {
            Granularity::Train => true,
            Granularity::Test => self.test.is_some(),
            Granularity::Level1 => self.level1.is_some(),
            Granularity::Level2 => self.level2.is_some(),
        }
    }

    /// Batches per epoch: `floor(floor(train_size / batch_size) / batch_size)`.
    #[must_use]
    pub fn nbatches(&self) -> usize {
        let batch_size = self.config.train.batch_size;
        self.train.len() / batch_size / batch_size
    }

    /// Build network inputs for a raw batch.
    pub fn inputs(&self, batch: &RawBatch) -> Result<Inputs> {
        Inputs::build(&self.processor, batch, self.config.model.timesteps, &self.device)
    }

    /// One optimizer step on `batch`; returns the batch loss.
    pub fn train_step(&mut self, batch: &RawBatch) -> Result<f64> {
        let inputs = self.inputs(batch)?;
        let targets = batch.target_tensor(&self.device)?;

        let mut dropout = Dropout::new(self.config.train.dropout, &mut self.rng);
        let features = self.model.forward(&inputs, &mut dropout)?;
        let scores = self.model.score(&features, Granularity::Train)?;
        let loss = margin_loss(&scores.probs, &targets)?;

        let mut grads = loss.backward()?;
        if self.config.train.clip > 0.0 {
            let norm = clip_grad_norm(&mut grads, &self.varmap.all_vars(), self.config.train.clip)?;
            log::trace!("gradient norm {norm:.4}");
        }
        self.optimizer.step(&grads)?;

        Ok(f64::from(loss.to_dtype(DType::F32)?.to_scalar::<f32>()?))
    }

    /// Train for one epoch, then evaluate on the dev split.
    pub fn run_epoch(&mut self, epoch: usize) -> Result<EpochReport> {
        let nbatches = self.nbatches();
        let batch_size = self.config.train.batch_size;
        if nbatches == 0 {
            log::warn!(
                "{} training mentions with batch size {batch_size} give 0 batches per epoch",
                self.train.len()
            );
        }

        let progress = self.progress_bar(nbatches);
        let mut total_loss = 0.0;
        for i in 0..nbatches {
            let batch = self.train.next_batch(batch_size)?;
            let loss = self.train_step(&batch)?;
            total_loss += loss;

            if let Some(pb) = &progress {
                pb.set_message(format!("train loss {loss:.4}"));
                pb.inc(1);
            }
            if i % self.config.train.summary_every == 0 {
                let summary = LossSummary {
                    step: epoch * nbatches + i,
                    loss,
                };
                log::debug!("step {}: loss {:.4}", summary.step, summary.loss);
                self.summaries.record(summary)?;
            }
        }
        if let Some(pb) = progress {
            pb.finish_and_clear();
        }

        let dev = self.evaluate_dev()?;
        log::info!(
            "epoch: {epoch} | dev evaluation: [loss: {total_loss:.4}, strict_acc: {:.4}, mi_f1: {:.4}, ma_f1: {:.4}]",
            dev.strict_acc,
            dev.micro_f1,
            dev.macro_f1
        );

        Ok(EpochReport {
            epoch,
            nbatches,
            total_loss,
            dev,
        })
    }

    fn progress_bar(&self, len: usize) -> Option<ProgressBar> {
        if !self.config.train.progress {
            return None;
        }
        let pb = ProgressBar::new(len as u64);
        if let Ok(style) = ProgressStyle::with_template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}",
        ) {
            pb.set_style(style.progress_chars("#>-"));
        }
        Some(pb)
    }

    /// Train up to `nepochs` epochs with learning-rate decay and early stopping.
    ///
    /// The best dev micro-F1 checkpoint is saved to
    /// [`TrainConfig::checkpoint_path`](crate::config::TrainConfig::checkpoint_path).
    pub fn fit(&mut self) -> Result<Vec<EpochReport>> {
        let mut reports = Vec::new();
        let mut best = f64::NEG_INFINITY;
        let mut no_imprv = 0usize;
        let checkpoint = self.config.train.checkpoint_path();

        for epoch in 0..self.config.train.nepochs {
            log::info!("epoch {} out of {}", epoch + 1, self.config.train.nepochs);
            let report = self.run_epoch(epoch)?;

            let lr = self.optimizer.learning_rate() * self.config.train.lr_decay;
            self.optimizer.set_learning_rate(lr);

            let score = report.dev.micro_f1;
            reports.push(report);
            if score > best {
                best = score;
                no_imprv = 0;
                self.save(&checkpoint)?;
                log::info!("new best score {best:.4}, saved {}", checkpoint.display());
            } else {
                no_imprv += 1;
                if no_imprv >= self.config.train.nepoch_no_imprv {
                    log::info!("early stopping after {no_imprv} epochs without improvement");
                    break;
                }
            }
        }
        Ok(reports)
    }

    /// Write all trainable parameters.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        self.varmap.save(path)?;
        Ok(())
    }

    /// Load parameters written by [`Trainer::save`].
    pub fn restore(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        log::info!("reloading parameters from {}", path.display());
        self.varmap
            .load(path)
            .map_err(|e| Error::model_init(format!("checkpoint {}: {e}", path.display())))
    }

    // -------------------------------------------------------------------------
    // Prediction
    // -------------------------------------------------------------------------

    /// Predict expanded train-granularity label sets.
    ///
    /// `embedding` is `[batch, timesteps, bert_emb_len]`. Returns the label
    /// sets and the number of words of each mention.
    pub fn predict_batch<S: AsRef<str>>(
        &self,
        mentions: &[S],
        embedding: &Tensor,
        lengths: &[usize],
    ) -> Result<(Vec<Vec<usize>>, Vec<usize>)> {
        let inputs = Inputs::from_mentions(
            &self.processor,
            mentions,
            embedding.clone(),
            lengths.to_vec(),
            self.config.model.timesteps,
        )?;
        let predicted = self.model.predict(&inputs, Granularity::Train)?.predictions()?;
        let labels = self.taxonomy.raw_labels(&predicted)?;
        Ok((labels, inputs.mention_lengths))
    }

    /// [`Trainer::predict_batch`] over a raw batch.
    pub fn predict_raw(&self, batch: &RawBatch) -> Result<(Vec<Vec<usize>>, Vec<usize>)> {
        let embedding = batch.embedding_tensor(&self.device)?;
        self.predict_batch(&batch.mentions, &embedding, &batch.lengths)
    }

    /// Label names for an expanded label set.
    #[must_use]
    pub fn label_names(&self, labels: &[usize]) -> Vec<&str> {
        self.taxonomy.names(labels)
    }

    /// Argmax indices at `granularity` for a whole split, in split order,
    /// paired with the gold labels of the same batches.
    fn predict_split(
        &self,
        split: &Split,
        granularity: Granularity,
    ) -> Result<(Vec<usize>, Vec<Vec<usize>>)> {
        let mut predicted = Vec::with_capacity(split.len());
        let mut gold = Vec::with_capacity(split.len());
        let all: Vec<usize> = (0..split.len()).collect();
        for chunk in all.chunks(self.config.train.batch_size) {
            let batch = split.batch(chunk);
            let inputs = self.inputs(&batch)?;
            predicted.extend(self.model.predict(&inputs, granularity)?.predictions()?);
            gold.extend(batch.gold);
        }
        Ok((predicted, gold))
    }

    // -------------------------------------------------------------------------
    // Evaluation
    // -------------------------------------------------------------------------

    fn evaluate_dev(&self) -> Result<TypingMetrics> {
        let (predicted, gold) = self.predict_split(&self.dev, Granularity::Train)?;
        let expanded = self.taxonomy.raw_labels(&predicted)?;
        evaluate(&expanded, &gold)
    }

    /// Evaluate on the test split.
    ///
    /// Writes `(prediction, gold)` pairs to `<dir_output>/label.txt`, expands
    /// predictions through the taxonomy, then scores them.
    pub fn evaluate_all(&self) -> Result<TypingMetrics> {
        let test = self
            .test
            .as_ref()
            .ok_or_else(|| Error::config("no test split configured"))?;
        let (predicted, gold) = self.predict_split(test, Granularity::Test)?;

        write_predictions(
            self.config.train.dir_output.join(PREDICTIONS_FILE),
            &predicted,
            &gold,
        )?;
        let expanded = self.taxonomy.raw_labels(&predicted)?;
        let m = evaluate(&expanded, &gold)?;
        log::info!("Test Evaluation on Overall---\nOverall---{m}");
        Ok(m)
    }

    /// Evaluate level-1 predictions (no supertype expansion).
    pub fn evaluate_level1(&self) -> Result<TypingMetrics> {
        self.evaluate_level(Granularity::Level1)
    }

    /// Evaluate level-2 predictions (no supertype expansion).
    pub fn evaluate_level2(&self) -> Result<TypingMetrics> {
        self.evaluate_level(Granularity::Level2)
    }

    fn evaluate_level(&self, granularity: Granularity) -> Result<TypingMetrics> {
        let (split, title) = match granularity {
            Granularity::Level1 => (&self.level1, "Level_1"),
            Granularity::Level2 => (&self.level2, "Level_2"),
            other => {
                return Err(Error::evaluation(format!("{other} is not a level granularity")))
            }
        };
        let split = split
            .as_ref()
            .ok_or_else(|| Error::config(format!("no {granularity} split configured")))?;

        let (predicted, gold) = self.predict_split(split, granularity)?;
        let predicted: Vec<Vec<usize>> = predicted.into_iter().map(|p| vec![p]).collect();
        let m = evaluate(&predicted, &gold)?;
        log::info!(
            "Test Evaluation on {}---\n{title}---acc: {:.4}, mi_f1: {:.4}, ma_f1: {:.4}, mi_p: {:.4}, mi_r: {:.4}, ma_p: {:.4}, ma_r: {:.4}",
            title.to_lowercase(),
            m.strict_acc,
            m.micro_f1,
            m.macro_f1,
            m.micro_p,
            m.micro_r,
            m.macro_p,
            m.macro_r
        );
        Ok(m)
    }
}
