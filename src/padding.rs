//! Padding of word and character id sequences to a fixed timestep cap.
//!
//! Word sequences are truncated or padded to exactly `timesteps` entries.
//! Character sequences are padded to the longest word in the batch, and
//! missing words are filled with all-pad character rows of length 0.

/// Pad id used for words and characters.
pub const PAD_ID: u32 = 0;

/// Word ids padded to `timesteps`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaddedWords {
    /// `[batch][timesteps]` word ids
    pub ids: Vec<Vec<u32>>,
    /// Unpadded length of each sequence after truncation
    pub lengths: Vec<usize>,
}

/// Character ids padded to `[batch][timesteps][max_chars]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaddedChars {
    /// `[batch][timesteps][max_chars]` character ids
    pub ids: Vec<Vec<Vec<u32>>>,
    /// `[batch][timesteps]` unpadded length of each word (0 for padded words)
    pub word_lengths: Vec<Vec<usize>>,
    /// Width of the character axis (at least 1)
    pub max_chars: usize,
}

fn pad_to(seq: &[u32], len: usize, pad: u32) -> (Vec<u32>, usize) {
    let kept = seq.len().min(len);
    let mut out = Vec::with_capacity(len);
    out.extend_from_slice(&seq[..kept]);
    out.resize(len, pad);
    (out, kept)
}

/// Pad or truncate word id sequences to `timesteps`.
#[must_use]
pub fn pad_words(seqs: &[Vec<u32>], timesteps: usize, pad: u32) -> PaddedWords {
    let (ids, lengths) = seqs.iter().map(|s| pad_to(s, timesteps, pad)).unzip();
    PaddedWords { ids, lengths }
}

/// Pad character id sequences: words to the longest word, mentions to `timesteps`.
#[must_use]
pub fn pad_chars(seqs: &[Vec<Vec<u32>>], timesteps: usize, pad: u32) -> PaddedChars {
    let max_chars = seqs
        .iter()
        .flat_map(|words| words.iter().take(timesteps).map(Vec::len))
        .max()
        .unwrap_or(0)
        .max(1);

    let mut ids = Vec::with_capacity(seqs.len());
    let mut word_lengths = Vec::with_capacity(seqs.len());
    for words in seqs {
        let mut rows = Vec::with_capacity(timesteps);
        let mut lens = Vec::with_capacity(timesteps);
        for word in words.iter().take(timesteps) {
            let (row, len) = pad_to(word, max_chars, pad);
            rows.push(row);
            lens.push(len);
        }
        rows.resize(timesteps, vec![pad; max_chars]);
        lens.resize(timesteps, 0);
        ids.push(rows);
        word_lengths.push(lens);
    }

    PaddedChars {
        ids,
        word_lengths,
        max_chars,
    }
}
