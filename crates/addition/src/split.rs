use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::error::{AdditionError, Result};
use crate::problem::{check_ndigit, problem_count};

pub const DEFAULT_SEED: u64 = 1337;

/// Upper bound on the number of held-out problems.
pub const MAX_TEST_PROBLEMS: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Split {
    Train,
    Test,
}

impl fmt::Display for Split {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Split::Train => f.write_str("train"),
            Split::Test => f.write_str("test"),
        }
    }
}

impl FromStr for Split {
    type Err = AdditionError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "train" => Ok(Split::Train),
            "test" => Ok(Split::Test),
            other => Err(AdditionError::InvalidConfiguration(format!(
                "unknown split '{}', expected 'train' or 'test'",
                other
            ))),
        }
    }
}

/// Deterministic in-place permutation of problem indices.
///
/// Implementations must produce the same order for the same input on every call.
pub trait Shuffle {
    fn shuffle(&self, indices: &mut [u32]);
}

impl<F: Fn(&mut [u32])> Shuffle for F {
    fn shuffle(&self, indices: &mut [u32]) {
        self(indices)
    }
}

/// Fisher-Yates over a freshly seeded `StdRng`.
#[derive(Debug, Clone, Copy)]
pub struct SeededShuffle {
    seed: u64,
}

impl SeededShuffle {
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }
}

impl Default for SeededShuffle {
    fn default() -> Self {
        Self::new(DEFAULT_SEED)
    }
}

impl Shuffle for SeededShuffle {
    fn shuffle(&self, indices: &mut [u32]) {
        let mut rng = StdRng::seed_from_u64(self.seed);
        indices.shuffle(&mut rng);
    }
}

/// Number of test problems for a problem space of `total` entries: `min(0.2 * total, 1000)`.
pub fn test_size(total: usize) -> usize {
    (total / 5).min(MAX_TEST_PROBLEMS)
}

/// The permuted problem space, cut into a test prefix and a train remainder.
///
/// Cloning is cheap: the permutation is shared.
#[derive(Debug, Clone)]
pub struct SplitAssignment {
    ndigit: usize,
    perm: Arc<[u32]>,
    num_test: usize,
}

impl SplitAssignment {
    pub fn new<S: Shuffle + ?Sized>(ndigit: usize, shuffle: &S) -> Result<Self> {
        check_ndigit(ndigit)?;
        let total = problem_count(ndigit);
        let mut perm: Vec<u32> = (0..total as u32).collect();
        shuffle.shuffle(&mut perm);

        let num_test = test_size(total);
        log::debug!(
            "split assignment for ndigit={}: {} test / {} train",
            ndigit,
            num_test,
            total - num_test
        );

        Ok(Self {
            ndigit,
            perm: perm.into(),
            num_test,
        })
    }

    pub fn seeded(ndigit: usize, seed: u64) -> Result<Self> {
        Self::new(ndigit, &SeededShuffle::new(seed))
    }

    pub fn ndigit(&self) -> usize {
        self.ndigit
    }

    /// Raw problem indices assigned to `split`, in permutation order.
    pub fn indices(&self, split: Split) -> &[u32] {
        match split {
            Split::Test => &self.perm[..self.num_test],
            Split::Train => &self.perm[self.num_test..],
        }
    }

    pub fn len(&self, split: Split) -> usize {
        self.indices(split).len()
    }

    pub fn total(&self) -> usize {
        self.perm.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_split_size_is_capped() {
        assert_eq!(test_size(100), 20);
        assert_eq!(test_size(10_000), 1000);
        assert_eq!(test_size(1_000_000), 1000);

        let one = SplitAssignment::seeded(1, DEFAULT_SEED).unwrap();
        assert_eq!(one.len(Split::Test), 20);
        assert_eq!(one.len(Split::Train), 80);

        let two = SplitAssignment::seeded(2, DEFAULT_SEED).unwrap();
        assert_eq!(two.len(Split::Test), 1000);
        assert_eq!(two.len(Split::Train), 9000);
    }

    #[test]
    fn splits_are_disjoint_and_exhaustive() {
        for ndigit in 1..=3 {
            let assignment = SplitAssignment::seeded(ndigit, DEFAULT_SEED).unwrap();
            let train: HashSet<u32> = assignment.indices(Split::Train).iter().copied().collect();
            let test: HashSet<u32> = assignment.indices(Split::Test).iter().copied().collect();

            assert!(train.is_disjoint(&test));
            assert_eq!(train.len() + test.len(), problem_count(ndigit));
            assert!(train.union(&test).all(|&i| (i as usize) < problem_count(ndigit)));
        }
    }

    #[test]
    fn same_seed_same_assignment() {
        let first = SplitAssignment::seeded(2, 7).unwrap();
        let second = SplitAssignment::seeded(2, 7).unwrap();
        assert_eq!(first.indices(Split::Test), second.indices(Split::Test));
        assert_eq!(first.indices(Split::Train), second.indices(Split::Train));

        let other = SplitAssignment::seeded(2, 8).unwrap();
        assert_ne!(first.indices(Split::Test), other.indices(Split::Test));
    }

    #[test]
    fn accepts_injected_shuffle_function() {
        let reverse = |indices: &mut [u32]| indices.reverse();
        let assignment = SplitAssignment::new(1, &reverse).unwrap();
        assert_eq!(&assignment.indices(Split::Test)[..3], &[99, 98, 97]);
        assert_eq!(*assignment.indices(Split::Train).last().unwrap(), 0);
    }

    #[test]
    fn rejects_zero_digits() {
        assert!(matches!(
            SplitAssignment::seeded(0, DEFAULT_SEED),
            Err(AdditionError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn parses_split_names() {
        assert_eq!("train".parse::<Split>().unwrap(), Split::Train);
        assert_eq!("test".parse::<Split>().unwrap(), Split::Test);
        assert!("valid".parse::<Split>().is_err());
        assert_eq!(Split::Test.to_string(), "test");
    }
}
