use thiserror::Error;

#[derive(Error, Debug)]
pub enum InferenceError {
    #[error("cannot generate from an empty prompt")]
    EmptyPrompt,

    #[error("prompts in a batch must share a length: expected {expected}, found {found}")]
    RaggedPrompts { expected: usize, found: usize },

    #[error("invalid sampling parameters: {0}")]
    InvalidParams(String),

    #[error("model reads {block_size} tokens of context, problems need {expected}")]
    ContextMismatch { block_size: i64, expected: usize },

    #[error(transparent)]
    Model(#[from] gpt_core::ModelError),

    #[error("torch error: {0}")]
    Tch(#[from] tch::TchError),
}

pub type Result<T> = std::result::Result<T, InferenceError>;
