use std::path::Path;
use std::sync::Arc;
use tch::Device;

pub mod error;
pub mod generator;
pub mod sampling;

// Re-export common types
pub use error::{InferenceError, Result};
pub use generator::Generator;
pub use sampling::{Sampler, SamplingParams};

/// Helper function to load a model from a checkpoint directory
pub fn load_model<P: AsRef<Path>>(dir: P, device: Device) -> Result<gpt_core::GPT> {
    let (_vs, model) = gpt_core::load_checkpoint(dir, device)?;
    log::info!(
        "loaded {}-layer model with block size {}",
        model.config.n_layer,
        model.config.block_size
    );
    Ok(model)
}

/// Loads a checkpoint and wraps it in a [`Generator`] with the given sampling parameters.
pub fn load_generator<P: AsRef<Path>>(
    dir: P,
    device: Device,
    params: SamplingParams,
) -> Result<Generator> {
    let model = load_model(dir, device)?;
    Ok(Generator::new(Arc::new(model), device).with_params(params))
}
