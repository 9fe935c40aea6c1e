pub mod algorithms;
pub mod config;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod services;
pub mod utils;
pub mod vocab;

pub use config::Config;
pub use error::RecError;
pub use models::*;

use anyhow::Result;
use std::sync::Arc;

/// File name of the persisted factor checkpoint inside `output_dir`.
pub const CHECKPOINT_FILE: &str = "model.json";

/// File name of the batch prediction output inside `output_dir`.
pub const BATCH_PRED_FILE: &str = "batch_pred.txt";

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub factors: Arc<FactorSet>,
    pub user_vocab: Arc<vocab::Vocabulary>,
    pub item_vocab: Arc<vocab::Vocabulary>,
    pub serving_service: Arc<services::serving::ServingService>,
}

impl AppState {
    /// Loads the trained factors and vocabularies and wires the serving
    /// adapter around them. Everything here is read-only after loading.
    pub fn load(config: Config) -> Result<Self> {
        let config = Arc::new(config);

        let checkpoint = Checkpoint::load(&config.model.output_dir.join(CHECKPOINT_FILE))?;
        let factors = Arc::new(checkpoint.into_factors()?);

        let user_vocab = Arc::new(vocab::Vocabulary::from_file(
            &config.model.input_path.join("vocab_users"),
        )?);
        let item_vocab = Arc::new(vocab::Vocabulary::from_file(
            &config.model.input_path.join("vocab_items"),
        )?);

        let engine = Arc::new(algorithms::WalsEngine::new(
            config.model.n_embeds,
            config.training.num_epochs,
            config.training.regularization,
        ));

        let serving_service = Arc::new(services::serving::ServingService::new(
            config.clone(),
            factors.clone(),
            user_vocab.clone(),
            item_vocab.clone(),
            engine,
        ));

        Ok(Self {
            config,
            factors,
            user_vocab,
            item_vocab,
            serving_service,
        })
    }
}

pub async fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
}
