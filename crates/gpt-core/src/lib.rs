pub mod attention;
pub mod checkpoint;
pub mod config;
pub mod error;
pub mod transformer;

pub use attention::NO_DECAY_GROUP;
pub use checkpoint::{load_checkpoint, save_checkpoint};
pub use config::{ModelConfig, ModelType};
pub use error::ModelError;
pub use transformer::{parameter_count, GPT};
