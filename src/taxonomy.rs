//! Label taxonomy: index → raw label, with supertype expansion.
//!
//! The taxonomy file lists one label path per line; the line number is the
//! label index:
//!
//! ```text
//! /person
//! /person/artist
//! /person/artist/actor
//! /location
//! ```
//!
//! Expanding a predicted index yields the label plus every ancestor path
//! that is itself in the taxonomy, so predicting `/person/artist/actor`
//! counts as predicting `/person` and `/person/artist` too.

use std::collections::HashMap;
use std::path::Path;

use crate::{Error, Result};

/// Hierarchical label set.
#[derive(Debug, Clone, Default)]
pub struct LabelTaxonomy {
    labels: Vec<String>,
    ancestors: Vec<Vec<usize>>,
}

impl LabelTaxonomy {
    /// Build from label paths in index order.
    pub fn from_labels<I, S>(labels: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let labels: Vec<String> = labels.into_iter().map(Into::into).collect();
        let mut index: HashMap<&str, usize> = HashMap::with_capacity(labels.len());
        for (i, label) in labels.iter().enumerate() {
            if index.insert(label.as_str(), i).is_some() {
                return Err(Error::dataset(format!("duplicate taxonomy label {label}")));
            }
        }

        let ancestors = labels
            .iter()
            .map(|label| {
                let mut found: Vec<usize> = label
                    .match_indices('/')
                    .filter(|&(pos, _)| pos > 0)
                    .filter_map(|(pos, _)| index.get(&label[..pos]).copied())
                    .collect();
                found.sort_unstable();
                found
            })
            .collect();

        Ok(Self { labels, ancestors })
    }

    /// Load a taxonomy file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::dataset(format!("taxonomy {}: {e}", path.display())))?;
        Self::from_labels(text.lines().map(str::trim).filter(|l| !l.is_empty()))
    }

    /// Number of labels.
    #[must_use]
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// True if there are no labels.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Label path for an index.
    #[must_use]
    pub fn name(&self, index: usize) -> Option<&str> {
        self.labels.get(index).map(String::as_str)
    }

    /// The index plus its ancestors, ascending.
    pub fn expand(&self, index: usize) -> Result<Vec<usize>> {
        let ancestors = self.ancestors.get(index).ok_or_else(|| {
            Error::evaluation(format!(
                "label index {index} outside taxonomy of {} labels",
                self.len()
            ))
        })?;
        let mut out = ancestors.clone();
        out.push(index);
        out.sort_unstable();
        out.dedup();
        Ok(out)
    }

    /// Expand a batch of predicted indices to raw label sets.
    pub fn raw_labels(&self, predicted: &[usize]) -> Result<Vec<Vec<usize>>> {
        predicted.iter().map(|&i| self.expand(i)).collect()
    }

    /// Label paths for a label set.
    #[must_use]
    pub fn names(&self, indices: &[usize]) -> Vec<&str> {
        indices.iter().filter_map(|&i| self.name(i)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn figer() -> LabelTaxonomy {
        LabelTaxonomy::from_labels([
            "/person",
            "/person/artist",
            "/location",
            "/person/artist/actor",
            "/organization/company",
        ])
        .unwrap()
    }

    #[test]
    fn test_expand_adds_present_ancestors() {
        let t = figer();
        assert_eq!(t.expand(3).unwrap(), vec![0, 1, 3]);
        assert_eq!(t.expand(0).unwrap(), vec![0]);
        // "/organization" is not in the taxonomy
        assert_eq!(t.expand(4).unwrap(), vec![4]);
    }

    #[test]
    fn test_out_of_range_index_errors() {
        assert!(figer().expand(99).is_err());
    }

    #[test]
    fn test_names() {
        let t = figer();
        assert_eq!(t.names(&[0, 2]), vec!["/person", "/location"]);
        assert_eq!(t.raw_labels(&[1, 2]).unwrap(), vec![vec![0, 1], vec![2]]);
    }

    #[test]
    fn test_duplicate_labels_rejected() {
        assert!(LabelTaxonomy::from_labels(["/a", "/a"]).is_err());
    }

    #[test]
    fn test_load() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "/a\n/a/b\n\n").unwrap();
        let t = LabelTaxonomy::load(file.path()).unwrap();
        assert_eq!(t.len(), 2);
        assert_eq!(t.expand(1).unwrap(), vec![0, 1]);
    }
}
