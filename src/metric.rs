//! Streaming accumulator framework.
//!
//! Every metric is an accumulator: it is fed one `(truth, prediction)` pair
//! at a time through [`Metric::accumulate`], drained with
//! [`Metric::summarize`], and zeroed with [`Metric::reset`].
//!
//! At-k metrics compute a value for every cutoff `1..=k` in a single pass
//! over the prediction: the statistic at prefix length `i + 1` reuses the
//! running value of prefix `i`, so one example costs O(k).
//!
//! ```text
//! Input ──rows()──▶ (TruthSet, Ranking) ──accumulate──▶ state ──summarize──▶ [f64; k]
//! ```
//!
//! Accumulator state is a commutative monoid, so a dataset can be sharded
//! over independent accumulators and recombined with [`Metric::merge`].

use tracing::{debug, warn};

use crate::input::{Input, RowOrder};
use crate::label::{Label, TruthSet};
use crate::{Error, Result};

/// A streaming evaluation metric.
pub trait Metric<L: Label> {
    /// Scalar (`f64`) or per-cutoff (`Vec<f64>`) result.
    type Output;

    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// How predictions are read: rankings for at-k metrics, sets otherwise.
    fn prediction_order(&self) -> RowOrder;

    /// Update the running state with one example.
    fn accumulate(&mut self, truth: &TruthSet<L>, prediction: &[L]);

    /// Current value of the metric. Does not change the state.
    fn summarize(&self) -> Self::Output;

    /// Return to the zeroed state.
    fn reset(&mut self);

    /// Number of examples accumulated so far.
    fn count(&self) -> usize;

    /// Fold another accumulator's state into this one.
    ///
    /// Both accumulators must be configured alike (same `k`, same
    /// `zero_division`); at-k metrics check `k` in debug builds.
    fn merge(&mut self, other: &Self)
    where
        Self: Sized;

    /// Accumulate every example of a batch, without resetting.
    ///
    /// Truth and prediction are zipped: when one batch is shorter, iteration
    /// stops at the shorter one.
    fn accumulate_batch(&mut self, truth: &Input<'_, L>, prediction: &Input<'_, L>) -> Result<()> {
        if truth.len() != prediction.len() {
            warn!(
                metric = self.name(),
                truth = truth.len(),
                prediction = prediction.len(),
                "truth and prediction batches differ in length, zipping to the shorter"
            );
        }

        let truths = truth.truth_sets()?;
        let predictions = prediction.rows(self.prediction_order())?;
        for (t, p) in truths.zip(predictions) {
            self.accumulate(&t, &p);
        }
        Ok(())
    }

    /// Reset, accumulate a whole batch, then summarize.
    fn calculate(&mut self, truth: &Input<'_, L>, prediction: &Input<'_, L>) -> Result<Self::Output> {
        self.reset();
        self.accumulate_batch(truth, prediction)?;
        debug!(metric = self.name(), examples = self.count(), "metric calculated");
        Ok(self.summarize())
    }
}

/// Reject a cutoff of zero.
pub fn check_k(k: usize) -> Result<usize> {
    if k == 0 {
        return Err(Error::InvalidK(k));
    }
    Ok(k)
}

/// Mean that stays finite for an empty dataset.
#[inline]
pub(crate) fn mean(sum: f64, count: usize) -> f64 {
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

/// Discount applied at 0-based position `i` of a ranking: `1 / log2(i + 2)`.
#[inline]
pub(crate) fn discount(i: usize) -> f64 {
    1.0 / ((i + 2) as f64).log2()
}

/// Hit indicator for the first `k` positions; positions past the end of the
/// ranking are misses.
pub(crate) fn hits<'a, L: Label>(
    truth: &'a TruthSet<L>,
    ranking: &'a [L],
    k: usize,
) -> impl Iterator<Item = bool> + 'a {
    (0..k).map(move |i| ranking.get(i).is_some_and(|l| truth.contains(l)))
}

/// Per-cutoff running sums plus the example count.
#[derive(Debug, Clone, PartialEq)]
pub struct CutoffSums {
    sum: Vec<f64>,
    count: usize,
}

impl CutoffSums {
    pub fn new(k: usize) -> Self {
        Self {
            sum: vec![0.0; k],
            count: 0,
        }
    }

    pub fn k(&self) -> usize {
        self.sum.len()
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn sum(&self) -> &[f64] {
        &self.sum
    }

    /// Slots to add this example's partial values into; counts the example.
    pub fn next_example(&mut self) -> &mut [f64] {
        self.count += 1;
        &mut self.sum
    }

    /// Add `value` to every cutoff of the current example.
    pub fn fill(out: &mut [f64], value: f64) {
        out.iter_mut().for_each(|s| *s += value);
    }

    /// Average over examples, per cutoff.
    pub fn means(&self) -> Vec<f64> {
        self.sum.iter().map(|&s| mean(s, self.count)).collect()
    }

    pub fn reset(&mut self) {
        self.sum.iter_mut().for_each(|s| *s = 0.0);
        self.count = 0;
    }

    pub fn merge(&mut self, other: &Self) {
        debug_assert_eq!(self.k(), other.k(), "merging sums of different k");
        for (a, b) in self.sum.iter_mut().zip(&other.sum) {
            *a += b;
        }
        self.count += other.count;
    }
}

/// Per-example statistic of a rank-based at-k metric.
///
/// `out` has one slot per cutoff; implementations add the statistic of the
/// example at prefix lengths `1..=out.len()` into it.
pub trait RankGain {
    const NAME: &'static str;

    fn gain<L: Label>(&self, truth: &TruthSet<L>, ranking: &[L], out: &mut [f64]);
}

/// An at-k metric averaged over examples, parameterized by its gain.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricAtK<G> {
    gain: G,
    sums: CutoffSums,
}

impl<G: RankGain> MetricAtK<G> {
    pub fn with_gain(k: usize, gain: G) -> Result<Self> {
        Ok(Self {
            gain,
            sums: CutoffSums::new(check_k(k)?),
        })
    }

    pub fn k(&self) -> usize {
        self.sums.k()
    }

    pub fn gain(&self) -> &G {
        &self.gain
    }
}

impl<G: RankGain, L: Label> Metric<L> for MetricAtK<G> {
    type Output = Vec<f64>;

    fn name(&self) -> &'static str {
        G::NAME
    }

    fn prediction_order(&self) -> RowOrder {
        RowOrder::Ranked
    }

    fn accumulate(&mut self, truth: &TruthSet<L>, prediction: &[L]) {
        let out = self.sums.next_example();
        self.gain.gain(truth, prediction, out);
    }

    fn summarize(&self) -> Vec<f64> {
        self.sums.means()
    }

    fn reset(&mut self) {
        self.sums.reset();
    }

    fn count(&self) -> usize {
        self.sums.count()
    }

    fn merge(&mut self, other: &Self) {
        self.sums.merge(&other.sums);
    }
}
