use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{AdditionError, Result};

/// Widest operand supported. `(10^4)^2` indices is the largest permutation table we build.
pub const MAX_NDIGIT: usize = 4;

/// Number of distinct tokens: the ten decimal digits.
pub const VOCAB_SIZE: usize = 10;

pub fn check_ndigit(ndigit: usize) -> Result<()> {
    if ndigit == 0 {
        return Err(AdditionError::InvalidConfiguration(
            "ndigit must be at least 1".to_string(),
        ));
    }
    if ndigit > MAX_NDIGIT {
        return Err(AdditionError::InvalidConfiguration(format!(
            "ndigit must be at most {}, got {}",
            MAX_NDIGIT, ndigit
        )));
    }
    Ok(())
}

pub(crate) fn pow10(exp: usize) -> u32 {
    10u32.pow(exp as u32)
}

/// Length of a fully encoded problem: `a`, `b` and the `ndigit + 1` digit sum.
pub fn sequence_len(ndigit: usize) -> usize {
    3 * ndigit + 1
}

/// Total number of problems for the given operand width.
pub fn problem_count(ndigit: usize) -> usize {
    let nd = pow10(ndigit) as usize;
    nd * nd
}

/// A single addition instance `a + b` with both operands at most `ndigit` digits wide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Problem {
    ndigit: usize,
    a: u32,
    b: u32,
}

impl Problem {
    pub fn new(ndigit: usize, a: u32, b: u32) -> Result<Self> {
        check_ndigit(ndigit)?;
        let limit = pow10(ndigit);
        for value in [a, b] {
            if value >= limit {
                return Err(AdditionError::OperandOutOfRange { value, ndigit });
            }
        }
        Ok(Self { ndigit, a, b })
    }

    /// Decodes a raw problem index: `a = index / 10^ndigit`, `b = index % 10^ndigit`.
    pub fn from_index(ndigit: usize, index: u32) -> Result<Self> {
        check_ndigit(ndigit)?;
        let total = problem_count(ndigit);
        if index as usize >= total {
            return Err(AdditionError::IndexOutOfRange {
                index: index as usize,
                len: total,
            });
        }
        let nd = pow10(ndigit);
        Ok(Self {
            ndigit,
            a: index / nd,
            b: index % nd,
        })
    }

    pub fn index(&self) -> u32 {
        self.a * pow10(self.ndigit) + self.b
    }

    pub fn ndigit(&self) -> usize {
        self.ndigit
    }

    pub fn a(&self) -> u32 {
        self.a
    }

    pub fn b(&self) -> u32 {
        self.b
    }

    pub fn sum(&self) -> u32 {
        self.a + self.b
    }

    /// Zero-padded digits of `a`, `b` and `a + b`, most significant first.
    pub fn encode(&self) -> Vec<u8> {
        let mut digits = Vec::with_capacity(sequence_len(self.ndigit));
        push_digits(&mut digits, self.a, self.ndigit);
        push_digits(&mut digits, self.b, self.ndigit);
        push_digits(&mut digits, self.sum(), self.ndigit + 1);
        digits
    }

    /// Inverse of [`Problem::encode`]. The trailing sum must agree with the operands.
    pub fn decode(ndigit: usize, digits: &[u8]) -> Result<Self> {
        check_ndigit(ndigit)?;
        let expected = sequence_len(ndigit);
        if digits.len() != expected {
            return Err(AdditionError::MalformedSequence(format!(
                "expected {} digits, found {}",
                expected,
                digits.len()
            )));
        }
        if let Some(&bad) = digits.iter().find(|&&d| d > 9) {
            return Err(AdditionError::MalformedSequence(format!(
                "{} is not a decimal digit",
                bad
            )));
        }

        let a = digits_to_value(&digits[..ndigit]);
        let b = digits_to_value(&digits[ndigit..2 * ndigit]);
        let c = digits_to_value(&digits[2 * ndigit..]);
        if a + b != c {
            return Err(AdditionError::MalformedSequence(format!(
                "{} + {} does not equal encoded sum {}",
                a, b, c
            )));
        }
        Ok(Self { ndigit, a, b })
    }
}

impl fmt::Display for Problem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let w = self.ndigit;
        write!(
            f,
            "{:0w$} + {:0w$} = {:0w1$}",
            self.a,
            self.b,
            self.sum(),
            w = w,
            w1 = w + 1
        )
    }
}

fn push_digits(out: &mut Vec<u8>, value: u32, width: usize) {
    let start = out.len();
    let mut rest = value;
    for _ in 0..width {
        out.push((rest % 10) as u8);
        rest /= 10;
    }
    out[start..].reverse();
}

fn digits_to_value(digits: &[u8]) -> u32 {
    digits.iter().fold(0, |acc, &d| acc * 10 + d as u32)
}
