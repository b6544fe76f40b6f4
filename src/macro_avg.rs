//! Per-label confusion bookkeeping and macro-averaged metrics at k.
//!
//! Macro averaging scores every label on its own and averages the per-label
//! scores with equal weight, so rare labels count as much as frequent ones.
//! Micro averaging (see [`crate::set`]) pools the counts first.
//!
//! | Score | Per-label value | Defined when |
//! |-------|-----------------|--------------|
//! | precision | TP / (TP + FP) | TP + FP > 0 |
//! | recall | TP / (TP + FN) | TP + FN > 0 |
//! | F1 | 2·TP / (2·TP + FP + FN) | 2·TP + FP + FN > 0 |
//!
//! A label whose score is undefined contributes `zero_division`. Which labels
//! are averaged over is decided by [`LabelUniverse::detect`].
//!
//! # Cutoffs
//!
//! The tallies at cutoff `i` describe predictions truncated to their top
//! `i + 1` labels. Rather than keeping `k` full tallies, the accumulator
//! records per position which labels were hit or missed, plus how often each
//! label was true. A cutoff's tally is then rebuilt by a running sum:
//!
//! ```text
//! TP_i(l) = Σ_{j ≤ i} hits_j(l)
//! FP_i(l) = Σ_{j ≤ i} misses_j(l)
//! FN_i(l) = truth(l) − TP_i(l)
//! ```
//!
//! so one example costs O(k + |T|) regardless of the label space size.

use std::collections::{HashMap, HashSet};
use std::ops::AddAssign;

use crate::input::{Input, RowOrder};
use crate::label::{Label, LabelUniverse, TruthSet};
use crate::metric::{check_k, Metric};
use crate::Result;

/// True positive, false positive and false negative counts of one label.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LabelCounts {
    pub true_pos: usize,
    pub false_pos: usize,
    pub false_neg: usize,
}

impl AddAssign for LabelCounts {
    fn add_assign(&mut self, other: Self) {
        self.true_pos += other.true_pos;
        self.false_pos += other.false_pos;
        self.false_neg += other.false_neg;
    }
}

/// A per-label statistic computed from confusion counts.
pub trait MacroScore {
    const NAME: &'static str;

    /// `None` when the statistic is undefined for these counts.
    fn score(&self, counts: &LabelCounts) -> Option<f64>;

    fn score_or(&self, counts: &LabelCounts, zero_division: f64) -> f64 {
        self.score(counts).unwrap_or(zero_division)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PrecisionScore;

impl MacroScore for PrecisionScore {
    const NAME: &'static str = "macro_precision@k";

    fn score(&self, c: &LabelCounts) -> Option<f64> {
        let denom = c.true_pos + c.false_pos;
        (denom > 0).then(|| c.true_pos as f64 / denom as f64)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecallScore;

impl MacroScore for RecallScore {
    const NAME: &'static str = "macro_recall@k";

    fn score(&self, c: &LabelCounts) -> Option<f64> {
        let denom = c.true_pos + c.false_neg;
        (denom > 0).then(|| c.true_pos as f64 / denom as f64)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct F1Score;

impl MacroScore for F1Score {
    const NAME: &'static str = "macro_f1@k";

    fn score(&self, c: &LabelCounts) -> Option<f64> {
        let denom = 2 * c.true_pos + c.false_pos + c.false_neg;
        (denom > 0).then(|| (2 * c.true_pos) as f64 / denom as f64)
    }
}

/// Per-label confusion counts over a dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfusionTally<L: Label> {
    counts: HashMap<L, LabelCounts>,
}

impl<L: Label> Default for ConfusionTally<L> {
    fn default() -> Self {
        Self {
            counts: HashMap::new(),
        }
    }
}

impl<L: Label> ConfusionTally<L> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tally one example. Duplicate predicted labels are counted once.
    pub fn record(&mut self, truth: &TruthSet<L>, prediction: &[L]) {
        let predicted: HashSet<&L> = prediction.iter().collect();
        for &label in &predicted {
            let counts = self.entry(label);
            if truth.contains(label) {
                counts.true_pos += 1;
            } else {
                counts.false_pos += 1;
            }
        }
        for label in truth {
            if !predicted.contains(label) {
                self.entry(label).false_neg += 1;
            }
        }
    }

    pub(crate) fn entry(&mut self, label: &L) -> &mut LabelCounts {
        self.counts.entry(label.clone()).or_default()
    }

    pub fn get(&self, label: &L) -> Option<&LabelCounts> {
        self.counts.get(label)
    }

    /// Number of labels with at least one count.
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Labels the average runs over.
    pub fn universe(&self) -> LabelUniverse<L> {
        LabelUniverse::detect(self.counts.keys())
    }

    /// Average `score` over the label universe. Labels with an undefined
    /// score, including labels of a dense range that were never seen,
    /// contribute `zero_division`; so does an empty universe.
    pub fn average<S: MacroScore>(&self, score: &S, zero_division: f64) -> f64 {
        let universe = self.universe();
        if universe.is_empty() {
            return zero_division;
        }
        let mut total = 0.0;
        universe.for_each(|label| {
            total += self
                .counts
                .get(label)
                .map_or(zero_division, |c| score.score_or(c, zero_division));
        });
        total / universe.len() as f64
    }

    pub fn clear(&mut self) {
        self.counts.clear();
    }

    pub fn merge(&mut self, other: &Self) {
        for (label, &counts) in &other.counts {
            *self.entry(label) += counts;
        }
    }
}

/// Union-add of per-label counters.
fn merge_counter<L: Label>(into: &mut HashMap<L, usize>, from: &HashMap<L, usize>) {
    for (label, &n) in from {
        *into.entry(label.clone()).or_insert(0) += n;
    }
}

/// A macro-averaged metric at cutoffs `1..=k`.
#[derive(Debug, Clone)]
pub struct MacroMetricAtK<S, L: Label> {
    score: S,
    zero_division: f64,
    /// Per position: labels found in the truth.
    hits: Vec<HashMap<L, usize>>,
    /// Per position: labels not in the truth.
    misses: Vec<HashMap<L, usize>>,
    truth_counts: HashMap<L, usize>,
    count: usize,
}

impl<S: MacroScore, L: Label> MacroMetricAtK<S, L> {
    pub fn with_score(k: usize, score: S, zero_division: f64) -> Result<Self> {
        let k = check_k(k)?;
        Ok(Self {
            score,
            zero_division,
            hits: vec![HashMap::new(); k],
            misses: vec![HashMap::new(); k],
            truth_counts: HashMap::new(),
            count: 0,
        })
    }

    pub fn k(&self) -> usize {
        self.hits.len()
    }

    /// The confusion tally of predictions truncated to `cutoff` labels.
    ///
    /// `cutoff` is clamped to `1..=k`.
    pub fn tally_at(&self, cutoff: usize) -> ConfusionTally<L> {
        let mut tally = self.base_tally();
        let last = cutoff.clamp(1, self.k());
        for i in 0..last {
            self.advance(&mut tally, i);
        }
        tally
    }

    /// Every truth label as a false negative: the state before any position.
    fn base_tally(&self) -> ConfusionTally<L> {
        let mut tally = ConfusionTally::new();
        for (label, &n) in &self.truth_counts {
            tally.entry(label).false_neg += n;
        }
        tally
    }

    /// Move the tally from cutoff `i` to cutoff `i + 1`.
    fn advance(&self, tally: &mut ConfusionTally<L>, i: usize) {
        for (label, &n) in &self.hits[i] {
            let counts = tally.entry(label);
            counts.true_pos += n;
            counts.false_neg = counts.false_neg.saturating_sub(n);
        }
        for (label, &n) in &self.misses[i] {
            tally.entry(label).false_pos += n;
        }
    }
}

impl<S: MacroScore, L: Label> Metric<L> for MacroMetricAtK<S, L> {
    type Output = Vec<f64>;

    fn name(&self) -> &'static str {
        S::NAME
    }

    fn prediction_order(&self) -> RowOrder {
        RowOrder::Ranked
    }

    fn accumulate(&mut self, truth: &TruthSet<L>, prediction: &[L]) {
        self.count += 1;
        for label in truth {
            *self.truth_counts.entry(label.clone()).or_insert(0) += 1;
        }

        let mut seen: HashSet<&L> = HashSet::new();
        let ranked = prediction.iter().filter(|&l| seen.insert(l));
        for (i, label) in ranked.take(self.k()).enumerate() {
            let slot = if truth.contains(label) {
                &mut self.hits[i]
            } else {
                &mut self.misses[i]
            };
            *slot.entry(label.clone()).or_insert(0) += 1;
        }
    }

    fn summarize(&self) -> Vec<f64> {
        let mut tally = self.base_tally();
        (0..self.k())
            .map(|i| {
                self.advance(&mut tally, i);
                tally.average(&self.score, self.zero_division)
            })
            .collect()
    }

    fn reset(&mut self) {
        self.hits.iter_mut().for_each(HashMap::clear);
        self.misses.iter_mut().for_each(HashMap::clear);
        self.truth_counts.clear();
        self.count = 0;
    }

    fn count(&self) -> usize {
        self.count
    }

    fn merge(&mut self, other: &Self) {
        debug_assert_eq!(self.k(), other.k(), "merging tallies of different k");
        for (a, b) in self.hits.iter_mut().zip(&other.hits) {
            merge_counter(a, b);
        }
        for (a, b) in self.misses.iter_mut().zip(&other.misses) {
            merge_counter(a, b);
        }
        merge_counter(&mut self.truth_counts, &other.truth_counts);
        self.count += other.count;
    }
}

pub type MacroPrecisionAtK<L> = MacroMetricAtK<PrecisionScore, L>;
pub type MacroRecallAtK<L> = MacroMetricAtK<RecallScore, L>;
pub type MacroF1AtK<L> = MacroMetricAtK<F1Score, L>;

impl<L: Label> MacroMetricAtK<PrecisionScore, L> {
    pub fn new(k: usize, zero_division: f64) -> Result<Self> {
        Self::with_score(k, PrecisionScore, zero_division)
    }
}

impl<L: Label> MacroMetricAtK<RecallScore, L> {
    pub fn new(k: usize, zero_division: f64) -> Result<Self> {
        Self::with_score(k, RecallScore, zero_division)
    }
}

impl<L: Label> MacroMetricAtK<F1Score, L> {
    pub fn new(k: usize, zero_division: f64) -> Result<Self> {
        Self::with_score(k, F1Score, zero_division)
    }
}

/// Macro-averaged precision at cutoffs `1..=k`.
pub fn macro_precision_at_k<'t, 'p, L: Label + 't + 'p>(
    truth: impl Into<Input<'t, L>>,
    prediction: impl Into<Input<'p, L>>,
    k: usize,
    zero_division: f64,
) -> Result<Vec<f64>> {
    MacroPrecisionAtK::new(k, zero_division)?.calculate(&truth.into(), &prediction.into())
}

/// Macro-averaged recall at cutoffs `1..=k`.
pub fn macro_recall_at_k<'t, 'p, L: Label + 't + 'p>(
    truth: impl Into<Input<'t, L>>,
    prediction: impl Into<Input<'p, L>>,
    k: usize,
    zero_division: f64,
) -> Result<Vec<f64>> {
    MacroRecallAtK::new(k, zero_division)?.calculate(&truth.into(), &prediction.into())
}

/// Macro-averaged F1 at cutoffs `1..=k`.
///
/// # Example
///
/// ```rust
/// use xcmetrics::macro_avg::macro_f1_at_k;
///
/// let truth = vec![vec![0u32], vec![1]];
/// let pred = vec![vec![0u32, 1], vec![0, 1]];
///
/// let f1 = macro_f1_at_k(&truth, &pred, 2, 0.0).unwrap();
/// // @1: label 0 has F1 2/3, label 1 was never predicted.
/// assert!((f1[0] - 1.0 / 3.0).abs() < 1e-12);
/// ```
pub fn macro_f1_at_k<'t, 'p, L: Label + 't + 'p>(
    truth: impl Into<Input<'t, L>>,
    prediction: impl Into<Input<'p, L>>,
    k: usize,
    zero_division: f64,
) -> Result<Vec<f64>> {
    MacroF1AtK::new(k, zero_division)?.calculate(&truth.into(), &prediction.into())
}
