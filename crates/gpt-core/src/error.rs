use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("invalid model config: {0}")]
    InvalidConfig(String),

    #[error("sequence of length {len} exceeds block size {block_size}")]
    SequenceTooLong { len: i64, block_size: i64 },

    #[error("no checkpoint found at {0:?}")]
    CheckpointNotFound(PathBuf),

    #[error("torch error: {0}")]
    Tch(#[from] tch::TchError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ModelError>;
