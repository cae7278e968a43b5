pub mod dataset;
pub mod schedule;
pub mod train;

pub use schedule::LrSchedule;
pub use train::{EpochStats, TrainReport, Trainer};

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainerConfig {
    pub max_epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
    pub betas: (f64, f64),
    pub weight_decay: f64,
    pub grad_norm_clip: f64,
    /// Warm up, then cosine-decay the learning rate over the tokens seen.
    pub lr_decay: bool,
    pub warmup_tokens: u64,
    /// Token count at which the decay bottoms out. Defaults to every output token of every epoch.
    pub final_tokens: Option<u64>,
    /// Where to write checkpoints; `None` disables saving.
    pub checkpoint_dir: Option<String>,
    /// Seed of the per-epoch shuffle of training batches.
    pub seed: u64,
    pub log_every: usize,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            max_epochs: 50,
            batch_size: 512,
            learning_rate: 6e-4,
            betas: (0.9, 0.95),
            weight_decay: 0.1,
            grad_norm_clip: 1.0,
            lr_decay: true,
            warmup_tokens: 1024,
            final_tokens: None,
            checkpoint_dir: Some("./checkpoints".to_string()),
            seed: 42,
            log_every: 10,
        }
    }
}

/// Reads a YAML config, or falls back to `T::default()` when the file does not exist.
pub fn load_config_or_default<T, P>(path: P) -> Result<T>
where
    T: DeserializeOwned + Default,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    if !path.exists() {
        log::info!("{:?} not found, using defaults", path);
        return Ok(T::default());
    }
    let content =
        fs::read_to_string(path).with_context(|| format!("Failed to read config at {:?}", path))?;
    serde_yaml::from_str(&content).with_context(|| format!("Failed to parse config at {:?}", path))
}
