use thiserror::Error;

/// Error taxonomy for the recommender core.
///
/// `Decode` aborts the current pipeline run, `VocabularyMismatch` and
/// `TopKRange` are fatal configuration errors, and `NotFound` is surfaced
/// per-request at serving time. No variant is retried inside this crate.
#[derive(Debug, Error)]
pub enum RecError {
    #[error("decode error: {0}")]
    Decode(String),

    #[error("{side} vocabulary has {vocab} entries but factor matrix has {factors} rows")]
    VocabularyMismatch {
        side: &'static str,
        vocab: usize,
        factors: usize,
    },

    #[error("unknown {kind} id: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("top-k of {k} exceeds item count {num_items}")]
    TopKRange { k: usize, num_items: usize },

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("solver failed: {0}")]
    Solve(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, RecError>;
