use chrono::{DateTime, Utc};
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use crate::error::{RecError, Result};

/// One stored row (or column) of the interaction matrix: a sparse vector
/// keyed by its true matrix index. `indices` and `values` are parallel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InteractionRecord {
    pub key: i64,
    pub indices: Vec<i64>,
    pub values: Vec<f32>,
}

/// A decoded sparse vector. The last entry is the carrier `(key, 0.0)`
/// appended by the decoder; its column may lie outside `dim`.
#[derive(Debug, Clone, PartialEq)]
pub struct SparseVector {
    pub entries: Vec<(i64, f32)>,
    pub dim: i64,
}

/// Batched sparse matrix in coordinate form. Entry order is not part of the
/// contract; indices are unique and within `shape` once remapped.
#[derive(Debug, Clone, PartialEq)]
pub struct SparseMatrix {
    pub indices: Vec<(i64, i64)>,
    pub values: Vec<f32>,
    pub shape: (i64, i64),
}

impl SparseMatrix {
    pub fn empty(shape: (i64, i64)) -> Self {
        Self {
            indices: Vec::new(),
            values: Vec::new(),
            shape,
        }
    }

    pub fn nnz(&self) -> usize {
        self.indices.len()
    }
}

/// Trained factor matrices, read-only after training. `row_factors` is
/// (nusers x n_embeds), `col_factors` is (nitems x n_embeds).
#[derive(Debug, Clone)]
pub struct FactorSet {
    pub row_factors: DMatrix<f32>,
    pub col_factors: DMatrix<f32>,
}

impl FactorSet {
    pub fn num_users(&self) -> usize {
        self.row_factors.nrows()
    }

    pub fn num_items(&self) -> usize {
        self.col_factors.nrows()
    }

    pub fn embedding_dim(&self) -> usize {
        self.row_factors.ncols()
    }
}

/// Persisted form of a trained model, one file per training run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub version: String,
    pub n_embeds: usize,
    pub row_factors: Vec<Vec<f32>>,
    pub col_factors: Vec<Vec<f32>>,
    pub updated_at: DateTime<Utc>,
}

fn matrix_to_rows(m: &DMatrix<f32>) -> Vec<Vec<f32>> {
    (0..m.nrows())
        .map(|i| m.row(i).iter().copied().collect())
        .collect()
}

fn rows_to_matrix(rows: &[Vec<f32>], n_embeds: usize) -> Result<DMatrix<f32>> {
    for row in rows {
        if row.len() != n_embeds {
            return Err(RecError::Decode(format!(
                "checkpoint row has {} values, expected {}",
                row.len(),
                n_embeds
            )));
        }
    }
    let flat: Vec<f32> = rows.iter().flatten().copied().collect();
    Ok(DMatrix::from_row_slice(rows.len(), n_embeds, &flat))
}

impl Checkpoint {
    pub fn from_factors(factors: &FactorSet) -> Self {
        Self {
            version: format!("v{}", Utc::now().timestamp()),
            n_embeds: factors.embedding_dim(),
            row_factors: matrix_to_rows(&factors.row_factors),
            col_factors: matrix_to_rows(&factors.col_factors),
            updated_at: Utc::now(),
        }
    }

    pub fn into_factors(self) -> Result<FactorSet> {
        Ok(FactorSet {
            row_factors: rows_to_matrix(&self.row_factors, self.n_embeds)?,
            col_factors: rows_to_matrix(&self.col_factors, self.n_embeds)?,
        })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let file = File::create(path)?;
        serde_json::to_writer(BufWriter::new(file), self)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        Ok(serde_json::from_reader(BufReader::new(file))?)
    }
}

/// Wire form of an online embedding request. Exactly one of the two fields
/// must be non-empty; the empty string signals "absent".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawEmbeddingRequest {
    #[serde(rename = "visitorId", default)]
    pub visitor_id: String,
    #[serde(rename = "contentId", default)]
    pub content_id: String,
}

/// Validated embedding request, one variant per projection side.
#[derive(Debug, Clone, PartialEq)]
pub enum EmbeddingRequest {
    User(String),
    Item(String),
}

impl TryFrom<RawEmbeddingRequest> for EmbeddingRequest {
    type Error = RecError;

    fn try_from(raw: RawEmbeddingRequest) -> Result<Self> {
        match (raw.visitor_id.is_empty(), raw.content_id.is_empty()) {
            (false, true) => Ok(EmbeddingRequest::User(raw.visitor_id)),
            (true, false) => Ok(EmbeddingRequest::Item(raw.content_id)),
            (true, true) => Err(RecError::InvalidRequest(
                "one of visitorId or contentId must be set".to_string(),
            )),
            (false, false) => Err(RecError::InvalidRequest(
                "visitorId and contentId are mutually exclusive".to_string(),
            )),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingResponse {
    pub id: String,
    pub kind: String,
    pub embedding: Vec<f32>,
}

/// Minimal sparse input for the projection operation. `project_row = true`
/// asks for a user embedding, `false` for an item embedding.
#[derive(Debug, Clone)]
pub struct ProjectionInput {
    pub input_rows: SparseMatrix,
    pub input_cols: SparseMatrix,
    pub project_row: bool,
}
