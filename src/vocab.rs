//! Word and character vocabularies, and mention tokenization.
//!
//! Vocabulary files hold one token per line; the line number is the id.
//! The word vocabulary must contain [`UNK`] (out-of-vocabulary words) and
//! should contain [`NUM`] (all-digit tokens).

use std::collections::HashMap;
use std::path::Path;

use crate::{Error, Result};

/// Out-of-vocabulary word token.
pub const UNK: &str = "$UNK$";

/// Numeric token.
pub const NUM: &str = "$NUM$";

/// Token ↔ id mapping.
#[derive(Debug, Clone, Default)]
pub struct Vocab {
    tokens: Vec<String>,
    index: HashMap<String, u32>,
}

impl Vocab {
    /// Build a vocabulary from tokens in id order. Later duplicates are ignored.
    pub fn from_tokens<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut vocab = Vocab::default();
        for token in tokens {
            let token = token.into();
            if vocab.index.contains_key(&token) {
                continue;
            }
            vocab.index.insert(token.clone(), vocab.tokens.len() as u32);
            vocab.tokens.push(token);
        }
        vocab
    }

    /// Load a vocabulary file (one token per line).
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::dataset(format!("vocab {}: {e}", path.display())))?;
        let vocab = Self::from_tokens(
            text.lines()
                .map(|l| l.trim_end_matches('\r'))
                .filter(|l| !l.is_empty()),
        );
        if vocab.is_empty() {
            return Err(Error::dataset(format!("vocab {} is empty", path.display())));
        }
        Ok(vocab)
    }

    /// Number of tokens.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// True if the vocabulary has no tokens.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Id of a token.
    #[must_use]
    pub fn get(&self, token: &str) -> Option<u32> {
        self.index.get(token).copied()
    }
}

/// Character ids and word id for one word of a mention.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessedWord {
    /// Character ids (unknown characters dropped)
    pub char_ids: Vec<u32>,
    /// Word id
    pub word_id: u32,
}

/// Turns raw mention text into word and character ids.
#[derive(Debug, Clone)]
pub struct MentionProcessor {
    words: Vocab,
    chars: Vocab,
    unk_id: u32,
    num_id: Option<u32>,
}

impl MentionProcessor {
    /// Create a processor. Fails if the word vocabulary has no [`UNK`] entry.
    pub fn new(words: Vocab, chars: Vocab) -> Result<Self> {
        let unk_id = words.get(UNK).ok_or_else(|| {
            Error::dataset(format!("word vocabulary has no {UNK} entry"))
        })?;
        let num_id = words.get(NUM);
        Ok(Self {
            words,
            chars,
            unk_id,
            num_id,
        })
    }

    /// Word vocabulary.
    pub fn words(&self) -> &Vocab {
        &self.words
    }

    /// Character vocabulary.
    pub fn chars(&self) -> &Vocab {
        &self.chars
    }

    /// Process one whitespace-free word.
    #[must_use]
    pub fn process_word(&self, word: &str) -> ProcessedWord {
        let char_ids = word.chars().filter_map(|c| {
            let mut buf = [0u8; 4];
            self.chars.get(c.encode_utf8(&mut buf))
        });
        let char_ids: Vec<u32> = char_ids.collect();

        let normalized = word.to_lowercase();

        let word_id = match self.num_id {
            Some(id) if !normalized.is_empty() && normalized.chars().all(|c| c.is_ascii_digit()) => {
                id
            }
            _ => self.words.get(&normalized).unwrap_or(self.unk_id),
        };

        ProcessedWord { char_ids, word_id }
    }

    /// Split a mention on whitespace and process every word.
    #[must_use]
    pub fn process(&self, mention: &str) -> Vec<ProcessedWord> {
        mention.split_whitespace().map(|w| self.process_word(w)).collect()
    }

    /// Process a batch of mentions into per-mention char id and word id lists.
    #[must_use]
    pub fn process_batch<S: AsRef<str>>(&self, mentions: &[S]) -> (Vec<Vec<Vec<u32>>>, Vec<Vec<u32>>) {
        let mut char_ids = Vec::with_capacity(mentions.len());
        let mut word_ids = Vec::with_capacity(mentions.len());
        for mention in mentions {
            let (chars, words): (Vec<_>, Vec<_>) = self
                .process(mention.as_ref())
                .into_iter()
                .map(|w| (w.char_ids, w.word_id))
                .unzip();
            char_ids.push(chars);
            word_ids.push(words);
        }
        (char_ids, word_ids)
    }
}
