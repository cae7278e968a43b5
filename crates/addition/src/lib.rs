//! Synthetic addition problems for training a small GPT, and the exam that grades it.
//!
//! Every `(a, b)` pair with `ndigit`-wide operands is encoded as the digits of `a`, `b` and
//! `a + b`. A seeded permutation assigns problems to a train and a test split.

pub mod dataset;
pub mod error;
pub mod exam;
pub mod problem;
pub mod split;

pub use dataset::{AdditionDataset, DatasetConfig, Sample};
pub use error::{AdditionError, Result};
pub use exam::{decode_prediction, Exam, ExamReport, Mistake, SequenceModel};
pub use problem::{Problem, MAX_NDIGIT, VOCAB_SIZE};
pub use split::{SeededShuffle, Shuffle, Split, SplitAssignment, DEFAULT_SEED};
