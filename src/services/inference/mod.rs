use rayon::prelude::*;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use crate::algorithms::find_top_k;
use crate::error::{RecError, Result};
use crate::models::FactorSet;
use crate::vocab::Vocabulary;

/// Writes top-K recommendations for every user, one line per user in
/// internal index order: `externalUserId\titem1,item2,...`.
pub struct BatchInferenceDriver {
    factors: Arc<FactorSet>,
    user_vocab: Arc<Vocabulary>,
    item_vocab: Arc<Vocabulary>,
    topk: usize,
}

impl BatchInferenceDriver {
    pub fn new(
        factors: Arc<FactorSet>,
        user_vocab: Arc<Vocabulary>,
        item_vocab: Arc<Vocabulary>,
        topk: usize,
    ) -> Self {
        Self {
            factors,
            user_vocab,
            item_vocab,
            topk,
        }
    }

    fn check_vocabularies(&self) -> Result<()> {
        if self.user_vocab.len() != self.factors.num_users() {
            return Err(RecError::VocabularyMismatch {
                side: "user",
                vocab: self.user_vocab.len(),
                factors: self.factors.num_users(),
            });
        }
        if self.item_vocab.len() != self.factors.num_items() {
            return Err(RecError::VocabularyMismatch {
                side: "item",
                vocab: self.item_vocab.len(),
                factors: self.factors.num_items(),
            });
        }
        Ok(())
    }

    fn line_for_user(&self, user_index: usize) -> Result<String> {
        let user = self.factors.row_factors.row(user_index).transpose();
        let top = find_top_k(&user, &self.factors.col_factors, self.topk)?;

        let user_id = self
            .user_vocab
            .external_id(user_index as i64)
            .ok_or_else(|| RecError::NotFound {
                kind: "user",
                id: user_index.to_string(),
            })?;
        let items: Vec<&str> = top
            .iter()
            .map(|&item| {
                self.item_vocab
                    .external_id(item as i64)
                    .ok_or_else(|| RecError::NotFound {
                        kind: "item",
                        id: item.to_string(),
                    })
            })
            .collect::<Result<_>>()?;

        Ok(format!("{}\t{}", user_id, items.join(",")))
    }

    /// Runs inference for all users and writes `batch_pred.txt` under
    /// `output_dir`. Per-user scoring runs in parallel; line order follows
    /// the internal user index.
    pub fn run(&self, output_dir: &Path) -> Result<PathBuf> {
        self.check_vocabularies()?;
        // Fail fast on a top-k beyond the catalog before doing any work.
        if self.topk > self.factors.num_items() {
            return Err(RecError::TopKRange {
                k: self.topk,
                num_items: self.factors.num_items(),
            });
        }

        let lines: Vec<String> = (0..self.factors.num_users())
            .into_par_iter()
            .map(|user_index| self.line_for_user(user_index))
            .collect::<Result<Vec<_>>>()?;

        std::fs::create_dir_all(output_dir)?;
        let path = output_dir.join(crate::BATCH_PRED_FILE);
        let mut writer = BufWriter::new(File::create(&path)?);
        for line in &lines {
            writeln!(writer, "{}", line)?;
        }
        writer.flush()?;

        info!("wrote {} prediction lines to {}", lines.len(), path.display());
        Ok(path)
    }
}
