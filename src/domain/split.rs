//! Chronological partitioning of time-ordered rows.
//!
//! Nothing in this module ever shuffles: every validation or test row is
//! strictly later than every row used to train against it. Shuffled splits
//! leak future information into training and are invalid for dated data.

use crate::domain::errors::PipelineError;
use std::ops::Range;

/// Train / validation / test partition over row indices, in date order.
/// The test partition is always the most recent segment.
#[derive(Debug, Clone, PartialEq)]
pub struct ChronoSplit {
    pub train: Range<usize>,
    pub valid: Range<usize>,
    pub test: Range<usize>,
}

/// One expanding-window fold: train on everything before the validation
/// segment, validate on the segment itself.
#[derive(Debug, Clone, PartialEq)]
pub struct Fold {
    pub train: Range<usize>,
    pub valid: Range<usize>,
}

/// Splits `n` rows into fixed proportions applied in date order.
pub fn chronological_split(
    n: usize,
    train_frac: f64,
    valid_frac: f64,
) -> Result<ChronoSplit, PipelineError> {
    if !(0.0..1.0).contains(&train_frac) || !(0.0..1.0).contains(&valid_frac) {
        return Err(PipelineError::fit(format!(
            "invalid split fractions train={} valid={}",
            train_frac, valid_frac
        )));
    }
    let train_end = (n as f64 * train_frac).floor() as usize;
    let valid_end = (n as f64 * (train_frac + valid_frac)).floor() as usize;
    if train_end == 0 || valid_end <= train_end || valid_end >= n {
        return Err(PipelineError::InsufficientData {
            context: "chronological split".to_string(),
            rows: n,
            required: 10,
        });
    }
    Ok(ChronoSplit {
        train: 0..train_end,
        valid: train_end..valid_end,
        test: valid_end..n,
    })
}

/// Divides `n` rows into `k` equal date-ordered segments and yields the
/// `k - 1` expanding-window folds between them: fold i trains on segments
/// `0..=i` and validates on segment `i + 1`.
///
/// For k = 3 over 300 rows the boundaries fall at 100 and 200, so fold 1
/// trains on rows 0..100 and validates on 100..200.
pub fn chronological_folds(n: usize, k: usize) -> Result<Vec<Fold>, PipelineError> {
    if k < 2 {
        return Err(PipelineError::fit(format!(
            "chronological folds require k >= 2, got {}",
            k
        )));
    }
    if n < k * 2 {
        return Err(PipelineError::InsufficientData {
            context: format!("{}-fold chronological split", k),
            rows: n,
            required: k * 2,
        });
    }
    let seg = n / k;
    let mut folds = Vec::with_capacity(k - 1);
    for i in 1..k {
        let valid_end = if i == k - 1 { n } else { (i + 1) * seg };
        folds.push(Fold {
            train: 0..i * seg,
            valid: i * seg..valid_end,
        });
    }
    Ok(folds)
}

/// Defensive invariant check: no tuning step may read rows at or past the
/// test boundary. A correct caller never trips this.
#[derive(Debug, Clone, Copy)]
pub struct LeakageGuard {
    test_start: usize,
}

impl LeakageGuard {
    pub fn new(test_start: usize) -> Self {
        Self { test_start }
    }

    /// Asserts that the given row range stays strictly before the test
    /// partition.
    pub fn assert_before_test(&self, rows: &Range<usize>) -> Result<(), PipelineError> {
        if rows.end > self.test_start {
            return Err(PipelineError::DataLeakageGuard {
                detail: format!(
                    "tuning step touched rows {}..{} but test partition starts at {}",
                    rows.start, rows.end, self.test_start
                ),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_proportions() {
        let split = chronological_split(1000, 0.7, 0.15).unwrap();
        assert_eq!(split.train, 0..700);
        assert_eq!(split.valid, 700..850);
        assert_eq!(split.test, 850..1000);
    }

    #[test]
    fn test_test_partition_is_most_recent() {
        let split = chronological_split(100, 0.6, 0.2).unwrap();
        assert_eq!(split.test.end, 100);
        assert!(split.valid.start >= split.train.end);
        assert!(split.test.start >= split.valid.end);
    }

    #[test]
    fn test_split_too_small() {
        assert!(chronological_split(3, 0.7, 0.15).is_err());
    }

    // 3-fold split of 300 rows: boundaries at 100/200, fold 1 trains on
    // rows 0..100 and validates on 100..200.
    #[test]
    fn test_three_fold_boundaries() {
        let folds = chronological_folds(300, 3).unwrap();
        assert_eq!(folds.len(), 2);
        assert_eq!(folds[0].train, 0..100);
        assert_eq!(folds[0].valid, 100..200);
        assert_eq!(folds[1].train, 0..200);
        assert_eq!(folds[1].valid, 200..300);
    }

    // Every training row precedes every validation row in every fold.
    #[test]
    fn test_no_look_ahead() {
        for k in 2..8 {
            for n in [50, 113, 300, 1001] {
                for fold in chronological_folds(n, k).unwrap() {
                    assert!(fold.train.end <= fold.valid.start);
                    assert!(!fold.train.is_empty());
                    assert!(!fold.valid.is_empty());
                }
            }
        }
    }

    #[test]
    fn test_last_fold_absorbs_remainder() {
        let folds = chronological_folds(305, 3).unwrap();
        assert_eq!(folds.last().unwrap().valid.end, 305);
    }

    #[test]
    fn test_leakage_guard() {
        let guard = LeakageGuard::new(850);
        assert!(guard.assert_before_test(&(0..700)).is_ok());
        assert!(guard.assert_before_test(&(700..850)).is_ok());
        let err = guard.assert_before_test(&(700..851)).unwrap_err();
        assert!(err.to_string().contains("leakage"));
    }
}
