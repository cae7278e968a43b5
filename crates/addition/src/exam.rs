use serde::Serialize;

use crate::dataset::{AdditionDataset, Sample};
use crate::error::{AdditionError, Result};
use crate::problem::{check_ndigit, Problem};

/// An autoregressive model that continues digit prompts.
///
/// `complete` must return, for every prompt, exactly the `steps` tokens it generated
/// after the prompt. Callers treat any other length as a malformed prediction.
pub trait SequenceModel {
    type Error: std::error::Error + Send + Sync + 'static;

    fn complete(
        &self,
        prompts: &[Vec<u8>],
        steps: usize,
    ) -> std::result::Result<Vec<Vec<i64>>, Self::Error>;
}

/// Reads `ndigit + 1` predicted digits as a base-10 number, most significant first.
pub fn decode_prediction(ndigit: usize, digits: &[i64]) -> Result<u32> {
    check_ndigit(ndigit)?;
    let expected = ndigit + 1;
    if digits.len() != expected {
        return Err(AdditionError::MalformedPrediction {
            expected,
            found: digits.len(),
        });
    }
    digits.iter().try_fold(0u32, |acc, &d| {
        if !(0..=9).contains(&d) {
            return Err(AdditionError::InvalidDigit(d));
        }
        Ok(acc * 10 + d as u32)
    })
}

/// A wrong answer, kept for inspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Mistake {
    pub a: u32,
    pub b: u32,
    pub predicted: u32,
    pub expected: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExamReport {
    pub correct: usize,
    pub total: usize,
    pub mistakes: Vec<Mistake>,
}

impl ExamReport {
    /// Fraction of correct answers; an empty exam scores 0.
    pub fn score(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.correct as f64 / self.total as f64
        }
    }
}

/// Grades predicted sums against ground truth and accumulates a report.
#[derive(Debug, Clone)]
pub struct Exam {
    ndigit: usize,
    report: ExamReport,
}

impl Exam {
    pub fn new(ndigit: usize) -> Result<Self> {
        check_ndigit(ndigit)?;
        Ok(Self {
            ndigit,
            report: ExamReport::default(),
        })
    }

    /// Grades one answer. Returns whether it was correct.
    pub fn grade(&mut self, problem: &Problem, predicted: &[i64]) -> Result<bool> {
        if problem.ndigit() != self.ndigit {
            return Err(AdditionError::InvalidConfiguration(format!(
                "exam is for {}-digit problems, got a {}-digit problem",
                self.ndigit,
                problem.ndigit()
            )));
        }
        let value = decode_prediction(self.ndigit, predicted)?;
        let expected = problem.sum();
        let correct = value == expected;

        self.report.total += 1;
        if correct {
            self.report.correct += 1;
        } else {
            let w = self.ndigit;
            log::info!(
                "GPT claims that {:0w$} + {:0w$} = {:0w1$} (gt is {:0w1$}; NOPE)",
                problem.a(),
                problem.b(),
                value,
                expected,
                w = w,
                w1 = w + 1
            );
            self.report.mistakes.push(Mistake {
                a: problem.a(),
                b: problem.b(),
                predicted: value,
                expected,
            });
        }
        Ok(correct)
    }

    pub fn report(&self) -> &ExamReport {
        &self.report
    }

    pub fn finish(self) -> ExamReport {
        self.report
    }

    /// Sends every problem of `dataset` to `model` in batches and grades the completions.
    ///
    /// `max_batches = None` grades the whole split.
    pub fn run<M: SequenceModel + ?Sized>(
        dataset: &AdditionDataset,
        model: &M,
        batch_size: usize,
        max_batches: Option<usize>,
    ) -> Result<ExamReport> {
        if batch_size == 0 {
            return Err(AdditionError::InvalidConfiguration(
                "batch_size must be at least 1".to_string(),
            ));
        }
        let ndigit = dataset.ndigit();
        let mut exam = Exam::new(ndigit)?;

        let mut batch: Vec<Sample> = Vec::with_capacity(batch_size);
        let mut graded_batches = 0;
        let mut samples = dataset.iter().peekable();

        while max_batches.map_or(true, |max| graded_batches < max) && samples.peek().is_some() {
            batch.clear();
            batch.extend(samples.by_ref().take(batch_size));

            let prompts: Vec<Vec<u8>> = batch.iter().map(|s| s.prompt().to_vec()).collect();
            let completions = model
                .complete(&prompts, ndigit + 1)
                .map_err(|e| AdditionError::Model(Box::new(e)))?;
            if completions.len() != prompts.len() {
                return Err(AdditionError::BatchMismatch {
                    expected: prompts.len(),
                    found: completions.len(),
                });
            }

            for (sample, predicted) in batch.iter().zip(&completions) {
                exam.grade(&sample.problem, predicted)?;
            }
            graded_batches += 1;
        }

        let report = exam.finish();
        log::info!(
            "final score on {} split: {}/{} = {:.2}% correct",
            dataset.split(),
            report.correct,
            report.total,
            100.0 * report.score()
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::DatasetConfig;
    use crate::problem::MAX_NDIGIT;
    use crate::split::Split;
    use std::cell::Cell;
    use std::fmt;

    #[derive(Debug)]
    struct Refused;

    impl fmt::Display for Refused {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("refused")
        }
    }

    impl std::error::Error for Refused {}

    /// Answers with the true sum, except for the problems listed in `wrong_on`.
    struct Oracle {
        ndigit: usize,
        wrong_on: Vec<(u32, u32)>,
        calls: Cell<usize>,
    }

    impl SequenceModel for Oracle {
        type Error = Refused;

        fn complete(
            &self,
            prompts: &[Vec<u8>],
            steps: usize,
        ) -> std::result::Result<Vec<Vec<i64>>, Refused> {
            self.calls.set(self.calls.get() + 1);
            Ok(prompts
                .iter()
                .map(|p| {
                    let read = |ds: &[u8]| ds.iter().fold(0u32, |acc, &d| acc * 10 + d as u32);
                    let a = read(&p[..self.ndigit]);
                    let b = read(&p[self.ndigit..]);
                    let mut sum = a + b;
                    if self.wrong_on.contains(&(a, b)) {
                        sum += 1;
                    }
                    let mut digits: Vec<i64> = (0..steps)
                        .map(|_| {
                            let d = (sum % 10) as i64;
                            sum /= 10;
                            d
                        })
                        .collect();
                    digits.reverse();
                    digits
                })
                .collect())
        }
    }

    struct Failing;

    impl SequenceModel for Failing {
        type Error = Refused;

        fn complete(&self, _: &[Vec<u8>], _: usize) -> std::result::Result<Vec<Vec<i64>>, Refused> {
            Err(Refused)
        }
    }

    struct Short;

    impl SequenceModel for Short {
        type Error = Refused;

        fn complete(
            &self,
            prompts: &[Vec<u8>],
            steps: usize,
        ) -> std::result::Result<Vec<Vec<i64>>, Refused> {
            Ok(prompts.iter().map(|_| vec![0; steps - 1]).collect())
        }
    }

    /// Answers every prompt but the last.
    struct DropsRow;

    impl SequenceModel for DropsRow {
        type Error = Refused;

        fn complete(
            &self,
            prompts: &[Vec<u8>],
            steps: usize,
        ) -> std::result::Result<Vec<Vec<i64>>, Refused> {
            Ok(prompts.iter().skip(1).map(|_| vec![0; steps]).collect())
        }
    }

    #[test]
    fn decodes_most_significant_first() {
        assert_eq!(decode_prediction(2, &[0, 4, 5]).unwrap(), 45);
        assert_eq!(decode_prediction(2, &[1, 9, 8]).unwrap(), 198);
        assert_eq!(decode_prediction(1, &[0, 0]).unwrap(), 0);
    }

    #[test]
    fn wrong_length_is_malformed() {
        assert!(matches!(
            decode_prediction(2, &[4, 5]),
            Err(AdditionError::MalformedPrediction { expected: 3, found: 2 })
        ));
        assert!(matches!(
            decode_prediction(2, &[0, 0, 4, 5]),
            Err(AdditionError::MalformedPrediction { expected: 3, found: 4 })
        ));
        assert!(matches!(
            decode_prediction(2, &[0, 10, 5]),
            Err(AdditionError::InvalidDigit(10))
        ));
    }

    #[test]
    fn decode_rejects_unsupported_widths() {
        assert!(matches!(
            decode_prediction(0, &[5]),
            Err(AdditionError::InvalidConfiguration(_))
        ));
        assert!(matches!(
            decode_prediction(9, &[9; 10]),
            Err(AdditionError::InvalidConfiguration(_))
        ));
        assert_eq!(
            decode_prediction(MAX_NDIGIT, &[9; MAX_NDIGIT + 1]).unwrap(),
            99_999
        );
    }

    #[test]
    fn grades_correct_and_incorrect_answers() {
        let problem = Problem::new(2, 6, 39).unwrap();
        let mut exam = Exam::new(2).unwrap();

        assert!(exam.grade(&problem, &[0, 4, 5]).unwrap());
        assert!(!exam.grade(&problem, &[0, 4, 6]).unwrap());

        let report = exam.finish();
        assert_eq!(report.correct, 1);
        assert_eq!(report.total, 2);
        assert_eq!(
            report.mistakes,
            vec![Mistake {
                a: 6,
                b: 39,
                predicted: 46,
                expected: 45
            }]
        );
        assert!((report.score() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn malformed_answer_is_not_counted() {
        let problem = Problem::new(2, 6, 39).unwrap();
        let mut exam = Exam::new(2).unwrap();
        assert!(exam.grade(&problem, &[4, 5]).is_err());
        assert_eq!(exam.report().total, 0);

        let wide = Problem::new(3, 6, 39).unwrap();
        assert!(matches!(
            exam.grade(&wide, &[0, 0, 4, 5]),
            Err(AdditionError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn empty_report_scores_zero() {
        assert_eq!(ExamReport::default().score(), 0.0);
    }

    #[test]
    fn run_grades_whole_split() {
        let test = AdditionDataset::new(&DatasetConfig::default(), Split::Test).unwrap();
        let wrong = test.problem(17).unwrap();
        let model = Oracle {
            ndigit: 2,
            wrong_on: vec![(wrong.a(), wrong.b())],
            calls: Cell::new(0),
        };

        let report = Exam::run(&test, &model, 64, None).unwrap();
        assert_eq!(report.total, 1000);
        assert_eq!(report.correct, 999);
        assert_eq!(report.mistakes.len(), 1);
        assert_eq!(report.mistakes[0].a, wrong.a());
        assert_eq!(report.mistakes[0].predicted, wrong.sum() + 1);
        assert_eq!(model.calls.get(), 16);
    }

    #[test]
    fn run_stops_after_max_batches() {
        let train = AdditionDataset::new(&DatasetConfig::default(), Split::Train).unwrap();
        let model = Oracle {
            ndigit: 2,
            wrong_on: Vec::new(),
            calls: Cell::new(0),
        };
        let report = Exam::run(&train, &model, 32, Some(10)).unwrap();
        assert_eq!(report.total, 320);
        assert_eq!(report.score(), 1.0);
        assert_eq!(model.calls.get(), 10);
    }

    #[test]
    fn run_surfaces_model_and_shape_errors() {
        let test = AdditionDataset::new(&DatasetConfig::default(), Split::Test).unwrap();
        assert!(matches!(
            Exam::run(&test, &Failing, 8, None),
            Err(AdditionError::Model(_))
        ));
        assert!(matches!(
            Exam::run(&test, &Short, 8, None),
            Err(AdditionError::MalformedPrediction { expected: 3, found: 2 })
        ));
        assert!(matches!(
            Exam::run(&test, &Short, 0, None),
            Err(AdditionError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn run_rejects_a_reply_missing_rows() {
        let test = AdditionDataset::new(&DatasetConfig::default(), Split::Test).unwrap();
        assert!(matches!(
            Exam::run(&test, &DropsRow, 8, None),
            Err(AdditionError::BatchMismatch { expected: 8, found: 7 })
        ));
    }
}
