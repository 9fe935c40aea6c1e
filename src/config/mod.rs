use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub model: ModelConfig,
    pub training: TrainingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub workers: usize,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(format!("{}:{}", self.host, self.port).parse()?)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    pub input_path: PathBuf,
    pub output_dir: PathBuf,
    pub nusers: usize,
    pub nitems: usize,
    pub n_embeds: usize,
    pub topk: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingConfig {
    pub batch_size: usize,
    pub num_epochs: usize,
    pub regularization: f32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
                workers: num_cpus::get(),
            },
            model: ModelConfig {
                input_path: PathBuf::from("data"),
                output_dir: PathBuf::from("output"),
                nusers: 0,
                nitems: 0,
                n_embeds: 16,
                topk: 10,
            },
            training: TrainingConfig {
                batch_size: 512,
                num_epochs: 10,
                regularization: 0.05,
            },
        }
    }
}

impl Config {
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(config::Environment::with_prefix("WALSREC"))
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    /// Number of solver steps for a full run, and steps per epoch. Mirrors
    /// the rounding of the original training schedule.
    pub fn train_steps(&self) -> (usize, usize) {
        let per_epoch =
            (0.5 + self.model.nusers as f64 / self.training.batch_size as f64).floor() as usize;
        let total = (0.5
            + (self.training.num_epochs * self.model.nusers) as f64
                / self.training.batch_size as f64)
            .floor() as usize;
        (total.max(1), per_epoch.max(1))
    }
}
