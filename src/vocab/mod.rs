use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::error::Result;

/// Bidirectional mapping between external string ids and internal zero-based
/// indices. Built from a newline-delimited vocabulary file (line number =
/// internal id) and immutable for the life of a model version.
#[derive(Debug, Clone)]
pub struct Vocabulary {
    ids: Vec<String>,
    index: HashMap<String, i64>,
}

impl Vocabulary {
    pub fn from_file(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let mut ids = Vec::new();
        for line in BufReader::new(file).lines() {
            ids.push(line?.trim().to_string());
        }
        Ok(Self::from_ids(ids))
    }

    pub fn from_ids(ids: Vec<String>) -> Self {
        let index = ids
            .iter()
            .enumerate()
            .map(|(i, id)| (id.clone(), i as i64))
            .collect();
        Self { ids, index }
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn external_id(&self, internal: i64) -> Option<&str> {
        self.ids.get(internal as usize).map(String::as_str)
    }

    pub fn internal_id(&self, external: &str) -> Option<i64> {
        self.index.get(external).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn maps_lines_to_indices_both_ways() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "alpha").unwrap();
        writeln!(file, "beta ").unwrap();
        writeln!(file, "gamma").unwrap();

        let vocab = Vocabulary::from_file(file.path()).unwrap();
        assert_eq!(vocab.len(), 3);
        assert_eq!(vocab.external_id(1), Some("beta"));
        assert_eq!(vocab.internal_id("gamma"), Some(2));
        assert_eq!(vocab.internal_id("delta"), None);
        assert_eq!(vocab.external_id(3), None);
    }
}
