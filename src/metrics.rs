//! Rank-based evaluation metrics at cutoffs `1..=k`.
//!
//! Every function returns a vector whose entry `i` is the metric at cutoff
//! `i + 1`, computed in a single pass over each example's ranking.
//!
//! # Metrics Overview
//!
//! | Metric | Range | Interpretation |
//! |--------|-------|----------------|
//! | Precision@k | [0, 1] | Fraction of the top k predictions that are true |
//! | Recall@k | [0, 1] | Fraction of true labels found in the top k |
//! | DCG@k | [0, Σ 1/log₂(i+1)] | Position-discounted hit count |
//! | nDCG@k | [0, 1] | DCG divided by the best DCG for the example |
//! | Coverage@k | [0, 1] | Fraction of the dataset's true labels hit by some top-k |
//! | Abandonment@k | [0, 1] | Fraction of examples with at least one hit in the top k |
//!
//! # Example
//!
//! ```rust
//! use xcmetrics::metrics::{precision_at_k, recall_at_k};
//!
//! let truth = vec![vec![1u32, 2, 3], vec![3, 4, 7]];
//! let pred = vec![vec![1u32, 2, 4], vec![7, 6, 3]];
//!
//! let p = precision_at_k(&truth, &pred, 3).unwrap();
//! assert!((p[2] - 2.0 / 3.0).abs() < 1e-9);
//!
//! let r = recall_at_k(&truth, &pred, 3).unwrap();
//! assert!((r[0] - 1.0 / 3.0).abs() < 1e-9);
//! ```

use std::collections::{HashMap, HashSet};

use crate::input::{Input, RowOrder};
use crate::label::{Label, TruthSet};
use crate::metric::{check_k, discount, hits, CutoffSums, Metric, MetricAtK, RankGain};
use crate::Result;

/// Precision gain: running hits divided by the cutoff.
///
/// ```text
/// P@k = (1/k) Σᵢ₌₁ᵏ 𝟙[pᵢ ∈ T]
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Precision;

impl RankGain for Precision {
    const NAME: &'static str = "precision@k";

    fn gain<L: Label>(&self, truth: &TruthSet<L>, ranking: &[L], out: &mut [f64]) {
        let k = out.len();
        let mut hit_count = 0usize;
        for (i, (slot, hit)) in out.iter_mut().zip(hits(truth, ranking, k)).enumerate() {
            hit_count += usize::from(hit);
            *slot += hit_count as f64 / (i + 1) as f64;
        }
    }
}

/// Recall gain: running hits divided by the number of true labels.
///
/// ```text
/// R@k = (1/|T|) Σᵢ₌₁ᵏ 𝟙[pᵢ ∈ T]
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Recall {
    /// Added at every cutoff when the example has no true labels.
    pub zero_division: f64,
}

impl RankGain for Recall {
    const NAME: &'static str = "recall@k";

    fn gain<L: Label>(&self, truth: &TruthSet<L>, ranking: &[L], out: &mut [f64]) {
        if truth.is_empty() {
            CutoffSums::fill(out, self.zero_division);
            return;
        }
        let k = out.len();
        let n_true = truth.len() as f64;
        let mut hit_count = 0usize;
        for (slot, hit) in out.iter_mut().zip(hits(truth, ranking, k)) {
            hit_count += usize::from(hit);
            *slot += hit_count as f64 / n_true;
        }
    }
}

/// DCG gain with binary relevance.
///
/// ```text
/// DCG@k = Σᵢ₌₁ᵏ 𝟙[pᵢ ∈ T] / log₂(i + 1)
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Dcg;

impl RankGain for Dcg {
    const NAME: &'static str = "dcg@k";

    fn gain<L: Label>(&self, truth: &TruthSet<L>, ranking: &[L], out: &mut [f64]) {
        let k = out.len();
        let mut dcg = 0.0;
        for (i, (slot, hit)) in out.iter_mut().zip(hits(truth, ranking, k)).enumerate() {
            if hit {
                dcg += discount(i);
            }
            *slot += dcg;
        }
    }
}

/// nDCG gain: DCG over the ideal DCG of `min(k, |T|)` hits.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Ndcg {
    /// Added at every cutoff when the example has no true labels.
    pub zero_division: f64,
}

impl RankGain for Ndcg {
    const NAME: &'static str = "ndcg@k";

    fn gain<L: Label>(&self, truth: &TruthSet<L>, ranking: &[L], out: &mut [f64]) {
        if truth.is_empty() {
            CutoffSums::fill(out, self.zero_division);
            return;
        }
        let k = out.len();
        let mut dcg = 0.0;
        let mut ideal = 0.0;
        for (i, (slot, hit)) in out.iter_mut().zip(hits(truth, ranking, k)).enumerate() {
            let d = discount(i);
            if i < truth.len() {
                ideal += d;
            }
            if hit {
                dcg += d;
            }
            *slot += dcg / ideal;
        }
    }
}

/// Abandonment gain: 1 from the first hit onwards.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Abandonment;

impl RankGain for Abandonment {
    const NAME: &'static str = "abandonment@k";

    fn gain<L: Label>(&self, truth: &TruthSet<L>, ranking: &[L], out: &mut [f64]) {
        let k = out.len();
        let mut found = false;
        for (slot, hit) in out.iter_mut().zip(hits(truth, ranking, k)) {
            found |= hit;
            if found {
                *slot += 1.0;
            }
        }
    }
}

pub type PrecisionAtK = MetricAtK<Precision>;
pub type RecallAtK = MetricAtK<Recall>;
pub type DcgAtK = MetricAtK<Dcg>;
pub type NdcgAtK = MetricAtK<Ndcg>;
pub type AbandonmentAtK = MetricAtK<Abandonment>;

impl MetricAtK<Precision> {
    pub fn new(k: usize) -> Result<Self> {
        Self::with_gain(k, Precision)
    }
}

impl MetricAtK<Recall> {
    pub fn new(k: usize, zero_division: f64) -> Result<Self> {
        Self::with_gain(k, Recall { zero_division })
    }
}

impl MetricAtK<Dcg> {
    pub fn new(k: usize) -> Result<Self> {
        Self::with_gain(k, Dcg)
    }
}

impl MetricAtK<Ndcg> {
    pub fn new(k: usize, zero_division: f64) -> Result<Self> {
        Self::with_gain(k, Ndcg { zero_division })
    }
}

impl MetricAtK<Abandonment> {
    pub fn new(k: usize) -> Result<Self> {
        Self::with_gain(k, Abandonment)
    }
}

/// Coverage@k: share of the dataset's distinct true labels that appear in
/// the top k predictions of at least one example where they are true.
///
/// Unlike the other at-k metrics this is not a per-example average. The state
/// is the set of all true labels seen plus, for every covered label, the
/// earliest cutoff at which it was covered; the covered set at cutoff `j`
/// therefore always contains the covered set at cutoff `j - 1`.
#[derive(Debug, Clone, PartialEq)]
pub struct CoverageAtK<L: Label> {
    k: usize,
    true_labels: HashSet<L>,
    first_hit: HashMap<L, usize>,
    count: usize,
}

impl<L: Label> CoverageAtK<L> {
    pub fn new(k: usize) -> Result<Self> {
        Ok(Self {
            k: check_k(k)?,
            true_labels: HashSet::new(),
            first_hit: HashMap::new(),
            count: 0,
        })
    }

    pub fn k(&self) -> usize {
        self.k
    }
}

impl<L: Label> Metric<L> for CoverageAtK<L> {
    type Output = Vec<f64>;

    fn name(&self) -> &'static str {
        "coverage@k"
    }

    fn prediction_order(&self) -> RowOrder {
        RowOrder::Ranked
    }

    fn accumulate(&mut self, truth: &TruthSet<L>, prediction: &[L]) {
        self.count += 1;
        self.true_labels.extend(truth.iter().cloned());
        for (i, label) in prediction.iter().take(self.k).enumerate() {
            if truth.contains(label) {
                self.first_hit
                    .entry(label.clone())
                    .and_modify(|r| *r = (*r).min(i))
                    .or_insert(i);
            }
        }
    }

    fn summarize(&self) -> Vec<f64> {
        let mut covered = vec![0usize; self.k];
        for &rank in self.first_hit.values() {
            if let Some(c) = covered.get_mut(rank) {
                *c += 1;
            }
        }
        let total = self.true_labels.len();
        let mut running = 0usize;
        covered
            .into_iter()
            .map(|c| {
                running += c;
                if total == 0 {
                    0.0
                } else {
                    running as f64 / total as f64
                }
            })
            .collect()
    }

    fn reset(&mut self) {
        self.true_labels.clear();
        self.first_hit.clear();
        self.count = 0;
    }

    fn count(&self) -> usize {
        self.count
    }

    fn merge(&mut self, other: &Self) {
        debug_assert_eq!(self.k, other.k, "merging coverage of different k");
        self.true_labels.extend(other.true_labels.iter().cloned());
        for (label, &rank) in &other.first_hit {
            self.first_hit
                .entry(label.clone())
                .and_modify(|r| *r = (*r).min(rank))
                .or_insert(rank);
        }
        self.count += other.count;
    }
}

/// Precision at cutoffs `1..=k`.
///
/// # Example
///
/// ```rust
/// use xcmetrics::metrics::precision_at_k;
///
/// let truth = vec![vec![1u32, 2, 3]];
/// let pred = vec![vec![1u32, 2, 4]];
/// let p = precision_at_k(&truth, &pred, 3).unwrap();
/// assert_eq!(p[0], 1.0);
/// assert_eq!(p[1], 1.0);
/// assert!((p[2] - 2.0 / 3.0).abs() < 1e-12);
/// ```
pub fn precision_at_k<'t, 'p, L: Label + 't + 'p>(
    truth: impl Into<Input<'t, L>>,
    prediction: impl Into<Input<'p, L>>,
    k: usize,
) -> Result<Vec<f64>> {
    PrecisionAtK::new(k)?.calculate(&truth.into(), &prediction.into())
}

/// Recall at cutoffs `1..=k`; examples without true labels add `zero_division`.
pub fn recall_at_k<'t, 'p, L: Label + 't + 'p>(
    truth: impl Into<Input<'t, L>>,
    prediction: impl Into<Input<'p, L>>,
    k: usize,
) -> Result<Vec<f64>> {
    recall_at_k_with(truth, prediction, k, 0.0)
}

/// [`recall_at_k`] with an explicit `zero_division` value.
pub fn recall_at_k_with<'t, 'p, L: Label + 't + 'p>(
    truth: impl Into<Input<'t, L>>,
    prediction: impl Into<Input<'p, L>>,
    k: usize,
    zero_division: f64,
) -> Result<Vec<f64>> {
    RecallAtK::new(k, zero_division)?.calculate(&truth.into(), &prediction.into())
}

/// Discounted cumulative gain at cutoffs `1..=k`.
pub fn dcg_at_k<'t, 'p, L: Label + 't + 'p>(
    truth: impl Into<Input<'t, L>>,
    prediction: impl Into<Input<'p, L>>,
    k: usize,
) -> Result<Vec<f64>> {
    DcgAtK::new(k)?.calculate(&truth.into(), &prediction.into())
}

/// Normalized DCG at cutoffs `1..=k`; examples without true labels add 0.
///
/// # Example
///
/// ```rust
/// use xcmetrics::metrics::ndcg_at_k;
///
/// let truth = vec![vec![1u32, 2, 3], vec![3, 4, 7]];
/// let pred = vec![vec![1u32, 2, 4], vec![7, 6, 3]];
/// let n = ndcg_at_k(&truth, &pred, 3).unwrap();
/// assert!((n[1] - 0.8065736).abs() < 1e-6);
/// ```
pub fn ndcg_at_k<'t, 'p, L: Label + 't + 'p>(
    truth: impl Into<Input<'t, L>>,
    prediction: impl Into<Input<'p, L>>,
    k: usize,
) -> Result<Vec<f64>> {
    ndcg_at_k_with(truth, prediction, k, 0.0)
}

/// [`ndcg_at_k`] with an explicit `zero_division` value.
pub fn ndcg_at_k_with<'t, 'p, L: Label + 't + 'p>(
    truth: impl Into<Input<'t, L>>,
    prediction: impl Into<Input<'p, L>>,
    k: usize,
    zero_division: f64,
) -> Result<Vec<f64>> {
    NdcgAtK::new(k, zero_division)?.calculate(&truth.into(), &prediction.into())
}

/// Coverage at cutoffs `1..=k`.
pub fn coverage_at_k<'t, 'p, L: Label + 't + 'p>(
    truth: impl Into<Input<'t, L>>,
    prediction: impl Into<Input<'p, L>>,
    k: usize,
) -> Result<Vec<f64>> {
    CoverageAtK::new(k)?.calculate(&truth.into(), &prediction.into())
}

/// Abandonment at cutoffs `1..=k`.
pub fn abandonment_at_k<'t, 'p, L: Label + 't + 'p>(
    truth: impl Into<Input<'t, L>>,
    prediction: impl Into<Input<'p, L>>,
    k: usize,
) -> Result<Vec<f64>> {
    AbandonmentAtK::new(k)?.calculate(&truth.into(), &prediction.into())
}
