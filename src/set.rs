//! Set-based metrics: Hamming loss and F1 under three averaging modes.
//!
//! Predictions are read as label sets. For dense and sparse matrices that is
//! the set of nonzero columns, for lists the distinct labels of the row; no
//! truncation to k happens here.
//!
//! | Metric | Value |
//! |--------|-------|
//! | Hamming loss | mean of \|P\| + \|T\| − 2\|P ∩ T\| |
//! | F1 micro | 2·ΣTP / (2·ΣTP + ΣFP + ΣFN), counts pooled over the dataset |
//! | F1 macro | per-label F1 averaged over the label universe |
//! | F1 samples | per-example F1, averaged over examples |

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::input::{Input, RowOrder};
use crate::label::{Label, TruthSet};
use crate::macro_avg::{ConfusionTally, F1Score, LabelCounts, MacroScore};
use crate::metric::{mean, Metric};
use crate::{Error, Result};

/// How per-label F1 statistics are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Average {
    /// Pool the counts of all labels and examples.
    #[default]
    Micro,
    /// Score each label, then average labels.
    Macro,
    /// Score each example, then average examples.
    Samples,
}

impl FromStr for Average {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "micro" => Ok(Average::Micro),
            "macro" => Ok(Average::Macro),
            "samples" => Ok(Average::Samples),
            other => Err(Error::InvalidAverage(other.to_string())),
        }
    }
}

impl fmt::Display for Average {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Average::Micro => "micro",
            Average::Macro => "macro",
            Average::Samples => "samples",
        };
        f.write_str(name)
    }
}

/// Counts of one example: `(|P|, |T|, |P ∩ T|)` with `P` de-duplicated.
fn overlap<L: Label>(truth: &TruthSet<L>, prediction: &[L]) -> (usize, usize, usize) {
    let predicted: HashSet<&L> = prediction.iter().collect();
    let common = predicted.iter().filter(|l| truth.contains(**l)).count();
    (predicted.len(), truth.len(), common)
}

/// Mean symmetric-difference size between predicted and true sets.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HammingLoss {
    sum: f64,
    count: usize,
}

impl HammingLoss {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<L: Label> Metric<L> for HammingLoss {
    type Output = f64;

    fn name(&self) -> &'static str {
        "hamming_loss"
    }

    fn prediction_order(&self) -> RowOrder {
        RowOrder::Present
    }

    fn accumulate(&mut self, truth: &TruthSet<L>, prediction: &[L]) {
        let (p, t, common) = overlap(truth, prediction);
        self.sum += (p + t - 2 * common) as f64;
        self.count += 1;
    }

    fn summarize(&self) -> f64 {
        mean(self.sum, self.count)
    }

    fn reset(&mut self) {
        *self = Self::default();
    }

    fn count(&self) -> usize {
        self.count
    }

    fn merge(&mut self, other: &Self) {
        self.sum += other.sum;
        self.count += other.count;
    }
}

/// F1 over counts pooled across every label and example.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MicroF1 {
    zero_division: f64,
    counts: LabelCounts,
    count: usize,
}

impl MicroF1 {
    pub fn new(zero_division: f64) -> Self {
        Self {
            zero_division,
            ..Self::default()
        }
    }

    /// Pooled counts so far.
    pub fn counts(&self) -> LabelCounts {
        self.counts
    }
}

impl<L: Label> Metric<L> for MicroF1 {
    type Output = f64;

    fn name(&self) -> &'static str {
        "f1_micro"
    }

    fn prediction_order(&self) -> RowOrder {
        RowOrder::Present
    }

    fn accumulate(&mut self, truth: &TruthSet<L>, prediction: &[L]) {
        let (p, t, common) = overlap(truth, prediction);
        self.counts += LabelCounts {
            true_pos: common,
            false_pos: p - common,
            false_neg: t - common,
        };
        self.count += 1;
    }

    fn summarize(&self) -> f64 {
        F1Score.score_or(&self.counts, self.zero_division)
    }

    fn reset(&mut self) {
        self.counts = LabelCounts::default();
        self.count = 0;
    }

    fn count(&self) -> usize {
        self.count
    }

    fn merge(&mut self, other: &Self) {
        self.counts += other.counts;
        self.count += other.count;
    }
}

/// Per-label F1 averaged over the label universe.
#[derive(Debug, Clone, PartialEq)]
pub struct MacroF1<L: Label> {
    zero_division: f64,
    tally: ConfusionTally<L>,
    count: usize,
}

impl<L: Label> MacroF1<L> {
    pub fn new(zero_division: f64) -> Self {
        Self {
            zero_division,
            tally: ConfusionTally::new(),
            count: 0,
        }
    }

    pub fn tally(&self) -> &ConfusionTally<L> {
        &self.tally
    }
}

impl<L: Label> Metric<L> for MacroF1<L> {
    type Output = f64;

    fn name(&self) -> &'static str {
        "f1_macro"
    }

    fn prediction_order(&self) -> RowOrder {
        RowOrder::Present
    }

    fn accumulate(&mut self, truth: &TruthSet<L>, prediction: &[L]) {
        self.tally.record(truth, prediction);
        self.count += 1;
    }

    fn summarize(&self) -> f64 {
        self.tally.average(&F1Score, self.zero_division)
    }

    fn reset(&mut self) {
        self.tally.clear();
        self.count = 0;
    }

    fn count(&self) -> usize {
        self.count
    }

    fn merge(&mut self, other: &Self) {
        self.tally.merge(&other.tally);
        self.count += other.count;
    }
}

/// Per-example F1 averaged over examples.
///
/// An example with an empty prediction has precision 0; an example with an
/// empty truth has recall `zero_division`. When recall is 0 the example
/// scores `zero_division`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SamplesF1 {
    zero_division: f64,
    sum: f64,
    count: usize,
}

impl SamplesF1 {
    pub fn new(zero_division: f64) -> Self {
        Self {
            zero_division,
            ..Self::default()
        }
    }
}

impl<L: Label> Metric<L> for SamplesF1 {
    type Output = f64;

    fn name(&self) -> &'static str {
        "f1_samples"
    }

    fn prediction_order(&self) -> RowOrder {
        RowOrder::Present
    }

    fn accumulate(&mut self, truth: &TruthSet<L>, prediction: &[L]) {
        let (p, t, common) = overlap(truth, prediction);
        let precision = if p > 0 {
            common as f64 / p as f64
        } else {
            0.0
        };
        let recall = if t > 0 {
            common as f64 / t as f64
        } else {
            self.zero_division
        };
        self.sum += if recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            self.zero_division
        };
        self.count += 1;
    }

    fn summarize(&self) -> f64 {
        mean(self.sum, self.count)
    }

    fn reset(&mut self) {
        self.sum = 0.0;
        self.count = 0;
    }

    fn count(&self) -> usize {
        self.count
    }

    fn merge(&mut self, other: &Self) {
        self.sum += other.sum;
        self.count += other.count;
    }
}

/// Mean Hamming loss between predicted and true label sets.
///
/// # Example
///
/// ```rust
/// use xcmetrics::set::hamming_loss;
///
/// let truth = vec![vec![1u32, 2, 3], vec![3, 4, 7]];
/// let pred = vec![vec![1u32, 2, 4], vec![7, 6, 3]];
/// assert_eq!(hamming_loss(&truth, &pred).unwrap(), 2.0);
/// ```
pub fn hamming_loss<'t, 'p, L: Label + 't + 'p>(
    truth: impl Into<Input<'t, L>>,
    prediction: impl Into<Input<'p, L>>,
) -> Result<f64> {
    HammingLoss::new().calculate(&truth.into(), &prediction.into())
}

/// F1 under the requested averaging mode.
pub fn f1_measure<'t, 'p, L: Label + 't + 'p>(
    truth: impl Into<Input<'t, L>>,
    prediction: impl Into<Input<'p, L>>,
    average: Average,
    zero_division: f64,
) -> Result<f64> {
    let (truth, prediction) = (truth.into(), prediction.into());
    match average {
        Average::Micro => MicroF1::new(zero_division).calculate(&truth, &prediction),
        Average::Macro => MacroF1::new(zero_division).calculate(&truth, &prediction),
        Average::Samples => SamplesF1::new(zero_division).calculate(&truth, &prediction),
    }
}

pub fn micro_f1_measure<'t, 'p, L: Label + 't + 'p>(
    truth: impl Into<Input<'t, L>>,
    prediction: impl Into<Input<'p, L>>,
    zero_division: f64,
) -> Result<f64> {
    f1_measure(truth, prediction, Average::Micro, zero_division)
}

pub fn macro_f1_measure<'t, 'p, L: Label + 't + 'p>(
    truth: impl Into<Input<'t, L>>,
    prediction: impl Into<Input<'p, L>>,
    zero_division: f64,
) -> Result<f64> {
    f1_measure(truth, prediction, Average::Macro, zero_division)
}

pub fn samples_f1_measure<'t, 'p, L: Label + 't + 'p>(
    truth: impl Into<Input<'t, L>>,
    prediction: impl Into<Input<'p, L>>,
    zero_division: f64,
) -> Result<f64> {
    f1_measure(truth, prediction, Average::Samples, zero_division)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::{CsrMatrix, LabelEntry};
    use approx::assert_relative_eq;
    use ndarray::array;

    fn t1() -> Vec<Vec<u32>> {
        vec![vec![1, 2, 3], vec![3, 4, 7]]
    }

    fn l1() -> Vec<Vec<u32>> {
        vec![vec![1, 2, 4], vec![7, 6, 3]]
    }

    /// Binary predictions {1, 2, 4} and {3, 6, 7}.
    fn l2_binary() -> ndarray::Array2<f64> {
        array![
            [0.0, 1.0, 1.0, 0.0, 1.0, 0.0, 0.0, 0.0],
            [0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 1.0],
        ]
    }

    fn t2() -> ndarray::Array2<f64> {
        array![
            [0.0, 1.0, 1.0, 1.0, 0.0, 0.0, 0.0, 0.0],
            [0.0, 0.0, 0.0, 1.0, 1.0, 0.0, 0.0, 1.0],
        ]
    }

    #[test]
    fn test_average_parse_and_display() {
        for avg in [Average::Micro, Average::Macro, Average::Samples] {
            assert_eq!(avg.to_string().parse::<Average>().unwrap(), avg);
        }
        assert!(matches!(
            "weighted".parse::<Average>(),
            Err(Error::InvalidAverage(s)) if s == "weighted"
        ));
    }

    #[test]
    fn test_hamming_loss() {
        assert_relative_eq!(hamming_loss(&t1(), &l1()).unwrap(), 2.0);

        let (t, l) = (t2(), l2_binary());
        assert_relative_eq!(hamming_loss::<u32>(&t, &l).unwrap(), 2.0);
    }

    #[test]
    fn test_hamming_loss_ignores_duplicates() {
        let truth = vec![vec![1u32]];
        let pred = vec![vec![1u32, 1, 2]];
        assert_relative_eq!(hamming_loss(&truth, &pred).unwrap(), 1.0);
    }

    #[test]
    fn test_f1_dense_fixture() {
        let (t, l) = (t2(), l2_binary());

        let macro0 = f1_measure::<u32>(&t, &l, Average::Macro, 0.0).unwrap();
        let macro1 = f1_measure::<u32>(&t, &l, Average::Macro, 1.0).unwrap();
        assert_relative_eq!(macro0, 0.458333, epsilon = 1e-6);
        assert_relative_eq!(macro1, 0.708333, epsilon = 1e-6);

        let micro = f1_measure::<u32>(&t, &l, Average::Micro, 0.0).unwrap();
        assert_relative_eq!(micro, 8.0 / 12.0, epsilon = 1e-12);

        let samples = f1_measure::<u32>(&t, &l, Average::Samples, 0.0).unwrap();
        assert_relative_eq!(samples, 2.0 / 3.0, epsilon = 1e-12);
    }

    #[test]
    fn test_f1_representations_agree() {
        let (t_dense, l_dense) = (t2(), l2_binary());
        let t_csr = CsrMatrix::from_rows(&[
            vec![(1, 1.0), (2, 1.0), (3, 1.0)],
            vec![(3, 1.0), (4, 1.0), (7, 1.0)],
        ])
        .unwrap();
        let l_list = vec![vec![1u32, 2, 4], vec![3, 6, 7]];

        for avg in [Average::Micro, Average::Macro, Average::Samples] {
            let dense = f1_measure::<u32>(&t_dense, &l_dense, avg, 0.0).unwrap();
            let mixed = f1_measure(&t_csr, &l_list, avg, 0.0).unwrap();
            assert_relative_eq!(dense, mixed, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_f1_entries_rows_match_lists() {
        let (t, l) = (t1(), l1());
        let truth: Vec<Vec<LabelEntry<u32>>> = t
            .iter()
            .map(|row| row.iter().map(|&label| LabelEntry::Plain(label)).collect())
            .collect();
        let pred: Vec<Vec<LabelEntry<u32>>> = l
            .iter()
            .map(|row| row.iter().map(|&label| LabelEntry::Scored(label, 0.5)).collect())
            .collect();

        for avg in [Average::Micro, Average::Macro, Average::Samples] {
            let entries =
                f1_measure(Input::Entries(&truth), Input::Entries(&pred), avg, 0.0).unwrap();
            let lists = f1_measure(&t, &l, avg, 0.0).unwrap();
            assert_relative_eq!(entries, lists, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_f1_shortcuts() {
        let (t, l) = (t1(), l1());
        assert_relative_eq!(
            micro_f1_measure(&t, &l, 0.0).unwrap(),
            f1_measure(&t, &l, Average::Micro, 0.0).unwrap()
        );
        assert_relative_eq!(
            macro_f1_measure(&t, &l, 0.0).unwrap(),
            f1_measure(&t, &l, Average::Macro, 0.0).unwrap()
        );
        assert_relative_eq!(
            samples_f1_measure(&t, &l, 0.0).unwrap(),
            f1_measure(&t, &l, Average::Samples, 0.0).unwrap()
        );
    }

    #[test]
    fn test_token_labels_macro_uses_observed_only() {
        let truth = vec![vec!["cat", "dog", "tiger"], vec!["tiger", "wolf", "kitty"]];
        let pred = vec![vec!["cat", "dog", "wolf"], vec!["kitty", "puppy", "tiger"]];

        // cat 1, dog 1, kitty 1, tiger 2/3, wolf 0, puppy 0.
        let f1 = macro_f1_measure(&truth, &pred, 0.0).unwrap();
        assert_relative_eq!(f1, (3.0 + 2.0 / 3.0) / 6.0, epsilon = 1e-12);
    }

    #[test]
    fn test_micro_f1_zero_division() {
        let truth: Vec<Vec<u32>> = vec![vec![], vec![]];
        let pred: Vec<Vec<u32>> = vec![vec![], vec![]];
        assert_relative_eq!(micro_f1_measure(&truth, &pred, 0.0).unwrap(), 0.0);
        assert_relative_eq!(micro_f1_measure(&truth, &pred, 1.0).unwrap(), 1.0);
        assert_relative_eq!(macro_f1_measure(&truth, &pred, 1.0).unwrap(), 1.0);
    }

    #[test]
    fn test_samples_f1_edge_cases() {
        let mut m = SamplesF1::new(1.0);
        // Empty truth: recall is zero_division, precision 0.
        Metric::<u32>::accumulate(&mut m, &TruthSet::new(), &[1]);
        assert_relative_eq!(Metric::<u32>::summarize(&m), 0.0);

        // No overlap at all: recall 0 -> zero_division.
        Metric::<u32>::reset(&mut m);
        Metric::<u32>::accumulate(&mut m, &[1].into_iter().collect(), &[2]);
        assert_relative_eq!(Metric::<u32>::summarize(&m), 1.0);
    }

    #[test]
    fn test_merge_matches_single_pass() {
        let (t, l) = (t1(), l1());
        let (ti, li) = (Input::from(&t), Input::from(&l));

        let mut whole = MacroF1::new(0.0);
        let expected = whole.calculate(&ti, &li).unwrap();

        let mut left = MacroF1::new(0.0);
        let mut right = MacroF1::new(0.0);
        left.accumulate_batch(&Input::from(&t[..1]), &Input::from(&l[..1]))
            .unwrap();
        right
            .accumulate_batch(&Input::from(&t[1..]), &Input::from(&l[1..]))
            .unwrap();
        left.merge(&right);
        assert_relative_eq!(left.summarize(), expected, epsilon = 1e-12);
        assert_eq!(left.tally(), whole.tally());

        let mut micro = MicroF1::new(0.0);
        Metric::<u32>::accumulate_batch(&mut micro, &ti, &li).unwrap();
        let mut half = MicroF1::new(0.0);
        Metric::<u32>::accumulate_batch(&mut half, &Input::from(&t[..1]), &Input::from(&l[..1]))
            .unwrap();
        let mut other = MicroF1::new(0.0);
        Metric::<u32>::accumulate_batch(&mut other, &Input::from(&t[1..]), &Input::from(&l[1..]))
            .unwrap();
        Metric::<u32>::merge(&mut half, &other);
        assert_eq!(half.counts(), micro.counts());
    }
}
