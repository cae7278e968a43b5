use serde::{Deserialize, Serialize};

use crate::error::{AdditionError, Result};
use crate::problem::{check_ndigit, sequence_len, Problem, VOCAB_SIZE};
use crate::split::{Split, SplitAssignment, DEFAULT_SEED};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetConfig {
    /// Digits per operand.
    pub ndigit: usize,
    /// Seed of the permutation that assigns problems to splits.
    pub seed: u64,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            ndigit: 2,
            seed: DEFAULT_SEED,
        }
    }
}

impl DatasetConfig {
    pub fn validate(&self) -> Result<()> {
        check_ndigit(self.ndigit)
    }
}

/// One training example.
///
/// `input` is the encoded problem without its last digit, `target` is the encoding shifted
/// left by one. Target positions that would predict operand digits are `None`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sample {
    pub problem: Problem,
    pub input: Vec<u8>,
    pub target: Vec<Option<u8>>,
}

impl Sample {
    pub fn from_problem(problem: Problem) -> Self {
        let ndigit = problem.ndigit();
        let digits = problem.encode();
        let input = digits[..digits.len() - 1].to_vec();
        let masked = 2 * ndigit - 1;
        let target = digits[1..]
            .iter()
            .enumerate()
            .map(|(pos, &d)| if pos < masked { None } else { Some(d) })
            .collect();
        Self {
            problem,
            input,
            target,
        }
    }

    /// The operand digits: what the model is conditioned on at exam time.
    pub fn prompt(&self) -> &[u8] {
        &self.input[..2 * self.problem.ndigit()]
    }
}

/// Read-only view of one split of the addition problem space.
#[derive(Debug, Clone)]
pub struct AdditionDataset {
    assignment: SplitAssignment,
    split: Split,
}

impl AdditionDataset {
    pub fn new(config: &DatasetConfig, split: Split) -> Result<Self> {
        config.validate()?;
        let assignment = SplitAssignment::seeded(config.ndigit, config.seed)?;
        Ok(Self::with_assignment(assignment, split))
    }

    /// Shares an existing assignment, so train and test views come from the same permutation.
    pub fn with_assignment(assignment: SplitAssignment, split: Split) -> Self {
        Self { assignment, split }
    }

    /// Builds the train and test views over a single permutation.
    pub fn pair(config: &DatasetConfig) -> Result<(Self, Self)> {
        config.validate()?;
        let assignment = SplitAssignment::seeded(config.ndigit, config.seed)?;
        Ok((
            Self::with_assignment(assignment.clone(), Split::Train),
            Self::with_assignment(assignment, Split::Test),
        ))
    }

    pub fn ndigit(&self) -> usize {
        self.assignment.ndigit()
    }

    pub fn split(&self) -> Split {
        self.split
    }

    pub fn len(&self) -> usize {
        self.assignment.len(self.split)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn vocab_size(&self) -> usize {
        VOCAB_SIZE
    }

    /// Length of the model input: the full encoding minus its last digit.
    pub fn block_size(&self) -> usize {
        sequence_len(self.ndigit()) - 1
    }

    pub fn problem(&self, index: usize) -> Result<Problem> {
        let indices = self.assignment.indices(self.split);
        let raw = indices
            .get(index)
            .copied()
            .ok_or(AdditionError::IndexOutOfRange {
                index,
                len: indices.len(),
            })?;
        Problem::from_index(self.ndigit(), raw)
    }

    pub fn get(&self, index: usize) -> Result<Sample> {
        self.problem(index).map(Sample::from_problem)
    }

    pub fn iter(&self) -> impl Iterator<Item = Sample> + '_ {
        self.assignment
            .indices(self.split)
            .iter()
            .filter_map(move |&raw| Problem::from_index(self.ndigit(), raw).ok())
            .map(Sample::from_problem)
    }
}
