use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

use crate::algorithms::FactorizationEngine;
use crate::config::Config;
use crate::error::{RecError, Result};
use crate::models::{
    EmbeddingRequest, EmbeddingResponse, FactorSet, ProjectionInput, SparseMatrix,
};
use crate::vocab::Vocabulary;

/// Online adapter: turns one external user or item id into the minimal
/// sparse input for the engine's projection, and returns the embedding.
/// Holds only read-only shared state, so requests cannot affect each other.
pub struct ServingService {
    config: Arc<Config>,
    factors: Arc<FactorSet>,
    user_vocab: Arc<Vocabulary>,
    item_vocab: Arc<Vocabulary>,
    engine: Arc<dyn FactorizationEngine>,
    serving_stats: Arc<DashMap<String, u64>>,
}

/// Synthetic rating written into every cell of the projection input.
const PROJECTION_RATING: f32 = 0.1;

impl ServingService {
    pub fn new(
        config: Arc<Config>,
        factors: Arc<FactorSet>,
        user_vocab: Arc<Vocabulary>,
        item_vocab: Arc<Vocabulary>,
        engine: Arc<dyn FactorizationEngine>,
    ) -> Self {
        Self {
            config,
            factors,
            user_vocab,
            item_vocab,
            engine,
            serving_stats: Arc::new(DashMap::new()),
        }
    }

    /// One low-weight rating against every item column for this user.
    fn user_projection_input(&self, user_id: i64) -> ProjectionInput {
        let nusers = self.config.model.nusers as i64;
        let nitems = self.config.model.nitems as i64;
        let mut input_rows = SparseMatrix::empty((nusers, nitems));
        let mut input_cols = SparseMatrix::empty((nusers, nitems));
        for item in 0..nitems {
            input_rows.indices.push((user_id, item));
            input_rows.values.push(PROJECTION_RATING);
            input_cols.indices.push((item, user_id));
            input_cols.values.push(PROJECTION_RATING);
        }
        ProjectionInput {
            input_rows,
            input_cols,
            project_row: true,
        }
    }

    /// The symmetric construction: every user row against this item.
    fn item_projection_input(&self, item_id: i64) -> ProjectionInput {
        let nusers = self.config.model.nusers as i64;
        let nitems = self.config.model.nitems as i64;
        let mut input_rows = SparseMatrix::empty((nusers, nitems));
        let mut input_cols = SparseMatrix::empty((nusers, nitems));
        for user in 0..nusers {
            input_rows.indices.push((user, item_id));
            input_rows.values.push(PROJECTION_RATING);
            input_cols.indices.push((item_id, user));
            input_cols.values.push(PROJECTION_RATING);
        }
        ProjectionInput {
            input_rows,
            input_cols,
            project_row: false,
        }
    }

    pub async fn project_embedding(&self, request: &EmbeddingRequest) -> Result<EmbeddingResponse> {
        self.increment_stat("total_requests");

        let (kind, external_id, input) = match request {
            EmbeddingRequest::User(id) => {
                let user_id = self
                    .user_vocab
                    .internal_id(id)
                    .ok_or_else(|| RecError::NotFound {
                        kind: "user",
                        id: id.clone(),
                    })?;
                ("user", id, self.user_projection_input(user_id))
            }
            EmbeddingRequest::Item(id) => {
                let item_id = self
                    .item_vocab
                    .internal_id(id)
                    .ok_or_else(|| RecError::NotFound {
                        kind: "item",
                        id: id.clone(),
                    })?;
                ("item", id, self.item_projection_input(item_id))
            }
        };

        let embedding = self.engine.project(&input, &self.factors).await?;
        self.increment_stat("successful_requests");
        info!("projected {} embedding for {}", kind, external_id);

        Ok(EmbeddingResponse {
            id: external_id.clone(),
            kind: kind.to_string(),
            embedding,
        })
    }

    pub fn get_serving_stats(&self) -> HashMap<String, u64> {
        self.serving_stats
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect()
    }

    fn increment_stat(&self, key: &str) {
        let mut counter = self.serving_stats.entry(key.to_string()).or_insert(0);
        *counter += 1;
    }
}
