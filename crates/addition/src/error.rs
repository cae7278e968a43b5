use thiserror::Error;

#[derive(Error, Debug)]
pub enum AdditionError {
    #[error("index {index} out of range for split of length {len}")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("malformed prediction: expected {expected} tokens, found {found}")]
    MalformedPrediction { expected: usize, found: usize },

    #[error("model answered {found} prompts of a batch of {expected}")]
    BatchMismatch { expected: usize, found: usize },

    #[error("token {0} is not a decimal digit")]
    InvalidDigit(i64),

    #[error("malformed sequence: {0}")]
    MalformedSequence(String),

    #[error("operand {value} does not fit in {ndigit} digits")]
    OperandOutOfRange { value: u32, ndigit: usize },

    #[error("sequence model failed: {0}")]
    Model(#[source] Box<dyn std::error::Error + Send + Sync>),
}

pub type Result<T> = std::result::Result<T, AdditionError>;
