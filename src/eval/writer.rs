//! Results file writer.
//!
//! One line per mention: the predicted label index, a tab, then the gold
//! label indices separated by spaces.
//!
//! ```text
//! 3	0 1 3
//! 7	7
//! ```

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::{Error, Result};

/// Write `(prediction, gold)` pairs, creating parent directories as needed.
pub fn write_predictions(path: impl AsRef<Path>, predicted: &[usize], gold: &[Vec<usize>]) -> Result<()> {
    let path = path.as_ref();
    if predicted.len() != gold.len() {
        return Err(Error::evaluation(format!(
            "{} predictions for {} gold rows",
            predicted.len(),
            gold.len()
        )));
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut out = BufWriter::new(File::create(path)?);
    for (p, g) in predicted.iter().zip(gold) {
        let g: Vec<String> = g.iter().map(ToString::to_string).collect();
        writeln!(out, "{}\t{}", p, g.join(" "))?;
    }
    out.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_predictions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("label.txt");
        write_predictions(&path, &[3, 7], &[vec![0, 1, 3], vec![7]]).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text, "3\t0 1 3\n7\t7\n");
    }

    #[test]
    fn test_length_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        assert!(write_predictions(dir.path().join("x"), &[1], &[]).is_err());
    }
}
