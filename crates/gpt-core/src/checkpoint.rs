use std::fs;
use std::path::Path;
use tch::{nn, Device};

use crate::config::ModelConfig;
use crate::error::{ModelError, Result};
use crate::transformer::GPT;

pub const WEIGHTS_FILE: &str = "model.ot";
pub const CONFIG_FILE: &str = "config.json";

/// Writes the variables of `vs` and the config that built them into `dir`.
pub fn save_checkpoint<P: AsRef<Path>>(vs: &nn::VarStore, config: &ModelConfig, dir: P) -> Result<()> {
    let dir = dir.as_ref();
    fs::create_dir_all(dir)?;

    vs.save(dir.join(WEIGHTS_FILE))?;
    let config_json = serde_json::to_string_pretty(config)?;
    fs::write(dir.join(CONFIG_FILE), config_json)?;

    log::info!("saved checkpoint and config to {:?}", dir);
    Ok(())
}

/// Rebuilds a model from `dir`. The returned `VarStore` owns the restored weights.
pub fn load_checkpoint<P: AsRef<Path>>(dir: P, device: Device) -> Result<(nn::VarStore, GPT)> {
    let dir = dir.as_ref();
    let config_path = dir.join(CONFIG_FILE);
    let weights_path = dir.join(WEIGHTS_FILE);
    if !config_path.exists() || !weights_path.exists() {
        return Err(ModelError::CheckpointNotFound(dir.to_path_buf()));
    }

    let config: ModelConfig = serde_json::from_str(&fs::read_to_string(&config_path)?)?;
    let mut vs = nn::VarStore::new(device);
    let model = GPT::new(&vs.root(), &config)?;
    vs.load(&weights_path)?;

    log::info!("loaded weights from {:?}", weights_path);
    Ok((vs, model))
}
