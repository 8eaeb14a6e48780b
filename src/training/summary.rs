//! Training-loss snapshots.
//!
//! Snapshots are kept in memory and written as JSON lines to
//! `<dir_output>/summaries.jsonl`. The first snapshot of a writer truncates
//! the file, so each run starts a fresh log:
//!
//! ```json
//! {"step":20,"loss":0.0931}
//! ```

use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::Result;

/// File name inside the output directory.
pub const SUMMARY_FILE: &str = "summaries.jsonl";

/// One recorded training loss.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LossSummary {
    /// `epoch * nbatches + batch`
    pub step: usize,
    /// Batch loss
    pub loss: f64,
}

/// Collects snapshots and mirrors them to disk.
#[derive(Debug)]
pub struct SummaryWriter {
    path: PathBuf,
    out: Option<BufWriter<File>>,
    history: Vec<LossSummary>,
}

impl SummaryWriter {
    /// Writer targeting `<dir>/summaries.jsonl`. The file is opened (and
    /// truncated) on the first [`SummaryWriter::record`].
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            path: dir.as_ref().join(SUMMARY_FILE),
            out: None,
            history: Vec::new(),
        }
    }

    /// Record a snapshot.
    pub fn record(&mut self, summary: LossSummary) -> Result<()> {
        if self.out.is_none() {
            if let Some(parent) = self.path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let file = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&self.path)?;
            self.out = Some(BufWriter::new(file));
        }
        if let Some(out) = self.out.as_mut() {
            serde_json::to_writer(&mut *out, &summary)?;
            out.write_all(b"\n")?;
            out.flush()?;
        }
        self.history.push(summary);
        Ok(())
    }

    /// Everything recorded so far.
    #[must_use]
    pub fn history(&self) -> &[LossSummary] {
        &self.history
    }

    /// Path of the JSONL file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_appends_lines() {
        let dir = tempfile::tempdir().unwrap();
        let mut w = SummaryWriter::new(dir.path().join("run"));
        w.record(LossSummary { step: 0, loss: 0.5 }).unwrap();
        w.record(LossSummary { step: 10, loss: 0.25 }).unwrap();

        assert_eq!(w.history().len(), 2);
        let text = std::fs::read_to_string(w.path()).unwrap();
        let lines: Vec<LossSummary> = text
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines, w.history());
    }

    #[test]
    fn test_new_writer_replaces_previous_run() {
        let dir = tempfile::tempdir().unwrap();
        let mut first = SummaryWriter::new(dir.path());
        first.record(LossSummary { step: 0, loss: 0.5 }).unwrap();
        first.record(LossSummary { step: 20, loss: 0.4 }).unwrap();
        drop(first);

        let mut second = SummaryWriter::new(dir.path());
        second.record(LossSummary { step: 0, loss: 0.9 }).unwrap();

        let text = std::fs::read_to_string(second.path()).unwrap();
        let lines: Vec<LossSummary> = text
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines, vec![LossSummary { step: 0, loss: 0.9 }]);
    }
}
