//! Propensity-scored (unbiased) variants of the rank-based metrics.
//!
//! Each hit is weighted by the inverse propensity of the hit label. Besides
//! the weighted sum, every metric tracks the best achievable weighted sum for
//! the example: the truth labels ordered by descending weight, truncated to
//! `min(k, |T|)`. With `normalize` the result is `sum / best_sum` per cutoff,
//! which lands in [0, 1]; without it the plain per-example mean is reported.
//!
//! | Metric | Per-example numerator at cutoff k |
//! |--------|-----------------------------------|
//! | PSP@k | (1/k) Σᵢ q(pᵢ)·𝟙[pᵢ ∈ T] |
//! | PSR@k | (1/\|T\|) Σᵢ q(pᵢ)·𝟙[pᵢ ∈ T] |
//! | PSDCG@k | Σᵢ q(pᵢ)·𝟙[pᵢ ∈ T] / log₂(i + 1) |
//! | PSnDCG@k | PSDCG@k / Σᵢ₌₁^min(k,\|T\|) 1 / log₂(i + 1) |

use crate::input::{Input, RowOrder};
use crate::label::{Label, TruthSet};
use crate::metric::{check_k, discount, hits, mean, CutoffSums, Metric};
use crate::propensity::Propensity;
use crate::Result;

/// Per-example statistic of a propensity-scored at-k metric.
pub trait PsGain {
    const NAME: &'static str;

    /// Add the example's weighted value into `sum` and its best achievable
    /// value into `best`. `top` holds the weights of the truth labels,
    /// largest first.
    fn gain<L: Label>(
        &self,
        truth: &TruthSet<L>,
        ranking: &[L],
        propensity: &Propensity<L>,
        top: &[f64],
        sum: &mut [f64],
        best: &mut [f64],
    );
}

/// Walk cutoffs `0..k`, yielding `(i, weighted hit, best weight)` where the
/// best weight is the `i`-th largest truth weight (0 past the truth size).
fn weighted_hits<'a, L: Label>(
    truth: &'a TruthSet<L>,
    ranking: &'a [L],
    propensity: &'a Propensity<L>,
    top: &'a [f64],
    k: usize,
) -> impl Iterator<Item = (usize, f64, f64)> + 'a {
    hits(truth, ranking, k).enumerate().map(move |(i, hit)| {
        let w = if hit { propensity.get(&ranking[i]) } else { 0.0 };
        (i, w, top.get(i).copied().unwrap_or(0.0))
    })
}

/// Propensity-scored precision.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PsPrecision;

impl PsGain for PsPrecision {
    const NAME: &'static str = "psprecision@k";

    fn gain<L: Label>(
        &self,
        truth: &TruthSet<L>,
        ranking: &[L],
        propensity: &Propensity<L>,
        top: &[f64],
        sum: &mut [f64],
        best: &mut [f64],
    ) {
        let (mut psp, mut best_psp) = (0.0, 0.0);
        for (i, w, b) in weighted_hits(truth, ranking, propensity, top, sum.len()) {
            psp += w;
            best_psp += b;
            sum[i] += psp / (i + 1) as f64;
            best[i] += best_psp / (i + 1) as f64;
        }
    }
}

/// Propensity-scored recall.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PsRecall {
    pub zero_division: f64,
}

impl PsGain for PsRecall {
    const NAME: &'static str = "psrecall@k";

    fn gain<L: Label>(
        &self,
        truth: &TruthSet<L>,
        ranking: &[L],
        propensity: &Propensity<L>,
        top: &[f64],
        sum: &mut [f64],
        best: &mut [f64],
    ) {
        if truth.is_empty() {
            CutoffSums::fill(sum, self.zero_division);
            CutoffSums::fill(best, self.zero_division);
            return;
        }
        let n_true = truth.len() as f64;
        let (mut psr, mut best_psr) = (0.0, 0.0);
        for (i, w, b) in weighted_hits(truth, ranking, propensity, top, sum.len()) {
            psr += w;
            best_psr += b;
            sum[i] += psr / n_true;
            best[i] += best_psr / n_true;
        }
    }
}

/// Propensity-scored DCG.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PsDcg;

impl PsGain for PsDcg {
    const NAME: &'static str = "psdcg@k";

    fn gain<L: Label>(
        &self,
        truth: &TruthSet<L>,
        ranking: &[L],
        propensity: &Propensity<L>,
        top: &[f64],
        sum: &mut [f64],
        best: &mut [f64],
    ) {
        let (mut dcg, mut best_dcg) = (0.0, 0.0);
        for (i, w, b) in weighted_hits(truth, ranking, propensity, top, sum.len()) {
            let d = discount(i);
            dcg += w * d;
            best_dcg += b * d;
            sum[i] += dcg;
            best[i] += best_dcg;
        }
    }
}

/// Propensity-scored nDCG. The log-discount normalization of nDCG applies on
/// top of (and independently from) the propensity normalization.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PsNdcg {
    pub zero_division: f64,
}

impl PsGain for PsNdcg {
    const NAME: &'static str = "psndcg@k";

    fn gain<L: Label>(
        &self,
        truth: &TruthSet<L>,
        ranking: &[L],
        propensity: &Propensity<L>,
        top: &[f64],
        sum: &mut [f64],
        best: &mut [f64],
    ) {
        if truth.is_empty() {
            CutoffSums::fill(sum, self.zero_division);
            CutoffSums::fill(best, self.zero_division);
            return;
        }
        let (mut dcg, mut best_dcg, mut norm) = (0.0, 0.0, 0.0);
        for (i, w, b) in weighted_hits(truth, ranking, propensity, top, sum.len()) {
            let d = discount(i);
            if i < truth.len() {
                norm += d;
            }
            dcg += w * d;
            best_dcg += b * d;
            sum[i] += dcg / norm;
            best[i] += best_dcg / norm;
        }
    }
}

/// A propensity-scored at-k metric, parameterized by its gain.
///
/// Borrows the propensity vector for the duration of the evaluation.
#[derive(Debug, Clone)]
pub struct PsMetricAtK<'p, G, L: Label> {
    gain: G,
    propensity: &'p Propensity<L>,
    normalize: bool,
    sums: CutoffSums,
    best: CutoffSums,
}

impl<'p, G: PsGain, L: Label> PsMetricAtK<'p, G, L> {
    pub fn with_gain(
        k: usize,
        gain: G,
        propensity: &'p Propensity<L>,
        normalize: bool,
    ) -> Result<Self> {
        let k = check_k(k)?;
        Ok(Self {
            gain,
            propensity,
            normalize,
            sums: CutoffSums::new(k),
            best: CutoffSums::new(k),
        })
    }

    pub fn k(&self) -> usize {
        self.sums.k()
    }

    /// Accumulated best achievable values, per cutoff.
    pub fn best_sum(&self) -> &[f64] {
        self.best.sum()
    }
}

impl<G: PsGain, L: Label> Metric<L> for PsMetricAtK<'_, G, L> {
    type Output = Vec<f64>;

    fn name(&self) -> &'static str {
        G::NAME
    }

    fn prediction_order(&self) -> RowOrder {
        RowOrder::Ranked
    }

    fn accumulate(&mut self, truth: &TruthSet<L>, prediction: &[L]) {
        let top = self.propensity.sorted_desc(truth);
        let best = self.best.next_example();
        let sum = self.sums.next_example();
        self.gain
            .gain(truth, prediction, self.propensity, &top, sum, best);
    }

    fn summarize(&self) -> Vec<f64> {
        if self.normalize {
            self.sums
                .sum()
                .iter()
                .zip(self.best.sum())
                .map(|(&s, &b)| if b == 0.0 { 0.0 } else { s / b })
                .collect()
        } else {
            let count = self.sums.count();
            self.sums.sum().iter().map(|&s| mean(s, count)).collect()
        }
    }

    fn reset(&mut self) {
        self.sums.reset();
        self.best.reset();
    }

    fn count(&self) -> usize {
        self.sums.count()
    }

    fn merge(&mut self, other: &Self) {
        self.sums.merge(&other.sums);
        self.best.merge(&other.best);
    }
}

pub type PsPrecisionAtK<'p, L> = PsMetricAtK<'p, PsPrecision, L>;
pub type PsRecallAtK<'p, L> = PsMetricAtK<'p, PsRecall, L>;
pub type PsDcgAtK<'p, L> = PsMetricAtK<'p, PsDcg, L>;
pub type PsNdcgAtK<'p, L> = PsMetricAtK<'p, PsNdcg, L>;

impl<'p, L: Label> PsMetricAtK<'p, PsPrecision, L> {
    pub fn new(k: usize, propensity: &'p Propensity<L>, normalize: bool) -> Result<Self> {
        Self::with_gain(k, PsPrecision, propensity, normalize)
    }
}

impl<'p, L: Label> PsMetricAtK<'p, PsRecall, L> {
    pub fn new(
        k: usize,
        propensity: &'p Propensity<L>,
        normalize: bool,
        zero_division: f64,
    ) -> Result<Self> {
        Self::with_gain(k, PsRecall { zero_division }, propensity, normalize)
    }
}

impl<'p, L: Label> PsMetricAtK<'p, PsDcg, L> {
    pub fn new(k: usize, propensity: &'p Propensity<L>, normalize: bool) -> Result<Self> {
        Self::with_gain(k, PsDcg, propensity, normalize)
    }
}

impl<'p, L: Label> PsMetricAtK<'p, PsNdcg, L> {
    pub fn new(
        k: usize,
        propensity: &'p Propensity<L>,
        normalize: bool,
        zero_division: f64,
    ) -> Result<Self> {
        Self::with_gain(k, PsNdcg { zero_division }, propensity, normalize)
    }
}

/// Propensity-scored precision at cutoffs `1..=k`.
///
/// # Example
///
/// ```rust
/// use xcmetrics::propensity::LabelWeights;
/// use xcmetrics::ps::ps_precision_at_k;
///
/// let truth = vec![vec![1u32, 2]];
/// let pred = vec![vec![2u32, 5]];
/// let inv_ps = LabelWeights::Dense(vec![1.0, 4.0, 2.0]);
///
/// // Best ranking would put label 1 (weight 4) first.
/// let psp = ps_precision_at_k(&truth, &pred, &inv_ps, 2, true).unwrap();
/// assert!((psp[0] - 0.5).abs() < 1e-12);
/// ```
pub fn ps_precision_at_k<'t, 'p, L: Label + 't + 'p>(
    truth: impl Into<Input<'t, L>>,
    prediction: impl Into<Input<'p, L>>,
    propensity: &Propensity<L>,
    k: usize,
    normalize: bool,
) -> Result<Vec<f64>> {
    PsPrecisionAtK::new(k, propensity, normalize)?.calculate(&truth.into(), &prediction.into())
}

/// Propensity-scored recall at cutoffs `1..=k`.
pub fn ps_recall_at_k<'t, 'p, L: Label + 't + 'p>(
    truth: impl Into<Input<'t, L>>,
    prediction: impl Into<Input<'p, L>>,
    propensity: &Propensity<L>,
    k: usize,
    normalize: bool,
) -> Result<Vec<f64>> {
    PsRecallAtK::new(k, propensity, normalize, 0.0)?.calculate(&truth.into(), &prediction.into())
}

/// Propensity-scored DCG at cutoffs `1..=k`.
pub fn ps_dcg_at_k<'t, 'p, L: Label + 't + 'p>(
    truth: impl Into<Input<'t, L>>,
    prediction: impl Into<Input<'p, L>>,
    propensity: &Propensity<L>,
    k: usize,
    normalize: bool,
) -> Result<Vec<f64>> {
    PsDcgAtK::new(k, propensity, normalize)?.calculate(&truth.into(), &prediction.into())
}

/// Propensity-scored nDCG at cutoffs `1..=k`.
pub fn ps_ndcg_at_k<'t, 'p, L: Label + 't + 'p>(
    truth: impl Into<Input<'t, L>>,
    prediction: impl Into<Input<'p, L>>,
    propensity: &Propensity<L>,
    k: usize,
    normalize: bool,
) -> Result<Vec<f64>> {
    PsNdcgAtK::new(k, propensity, normalize, 0.0)?.calculate(&truth.into(), &prediction.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::LabelEntry;
    use crate::metrics::{dcg_at_k, ndcg_at_k, precision_at_k, recall_at_k};
    use crate::propensity::{estimate_inverse_propensity, LabelWeights, PropensityParams};
    use approx::assert_relative_eq;
    use std::collections::HashMap;

    fn t1() -> Vec<Vec<u32>> {
        vec![vec![1, 2, 3], vec![3, 4, 7]]
    }

    fn l1() -> Vec<Vec<u32>> {
        vec![vec![1, 2, 4], vec![7, 6, 3]]
    }

    fn assert_all_close(actual: &[f64], expected: &[f64]) {
        assert_eq!(actual.len(), expected.len());
        for (a, e) in actual.iter().zip(expected) {
            assert!((a - e).abs() < 1e-9, "{:?} != {:?}", actual, expected);
        }
    }

    #[test]
    fn test_unit_weights_reduce_to_plain_metrics() {
        let ones = LabelWeights::<u32>::Dense(vec![1.0; 8]);
        let (t, l) = (t1(), l1());

        assert_all_close(
            &ps_precision_at_k(&t, &l, &ones, 3, false).unwrap(),
            &precision_at_k(&t, &l, 3).unwrap(),
        );
        assert_all_close(
            &ps_recall_at_k(&t, &l, &ones, 3, false).unwrap(),
            &recall_at_k(&t, &l, 3).unwrap(),
        );
        assert_all_close(
            &ps_dcg_at_k(&t, &l, &ones, 3, false).unwrap(),
            &dcg_at_k(&t, &l, 3).unwrap(),
        );
        assert_all_close(
            &ps_ndcg_at_k(&t, &l, &ones, 3, false).unwrap(),
            &ndcg_at_k(&t, &l, 3).unwrap(),
        );
    }

    #[test]
    fn test_psp_hand_computed() {
        let inv_ps = LabelWeights::<u32>::Dense(vec![0.0, 2.0, 1.0, 3.0, 1.0, 0.0, 1.0, 4.0]);
        let (t, l) = (t1(), l1());

        // Example 1: hits 1 (2.0), 2 (1.0); best order 3, 1, 2 -> 3, 2, 1.
        // Example 2: hits 7 (4.0) at 1, 3 (3.0) at 3; best order 7, 3, 4 -> 4, 3, 1.
        let sum = [(2.0 + 4.0) / 1.0, (3.0 + 4.0) / 2.0, (3.0 + 7.0) / 3.0];
        let best = [(3.0 + 4.0) / 1.0, (5.0 + 7.0) / 2.0, (6.0 + 8.0) / 3.0];

        let raw = ps_precision_at_k(&t, &l, &inv_ps, 3, false).unwrap();
        assert_all_close(&raw, &sum.map(|s| s / 2.0));

        let normalized = ps_precision_at_k(&t, &l, &inv_ps, 3, true).unwrap();
        let expected: Vec<f64> = sum.iter().zip(&best).map(|(s, b)| s / b).collect();
        assert_all_close(&normalized, &expected);
    }

    #[test]
    fn test_normalized_recall_and_dcg_hand_computed() {
        let inv_ps = LabelWeights::<u32>::Dense(vec![0.0, 2.0, 1.0, 3.0, 1.0, 0.0, 1.0, 4.0]);
        let (t, l) = (t1(), l1());

        // Same hits as PSP; both examples have |T| = 3, so recall divides
        // sum and best alike.
        let psr = ps_recall_at_k(&t, &l, &inv_ps, 3, true).unwrap();
        assert_all_close(&psr, &[6.0 / 7.0, 7.0 / 12.0, 10.0 / 14.0]);

        // Hits: example 1 at ranks 1, 2 (weights 2, 1); example 2 at 1, 3 (4, 3).
        let d1 = 1.0 / 3f64.log2();
        let sum = [6.0, 6.0 + d1, 7.5 + d1];
        let best = [7.0, 7.0 + 5.0 * d1, 8.0 + 5.0 * d1];
        let expected: Vec<f64> = sum.iter().zip(&best).map(|(s, b)| s / b).collect();

        let psdcg = ps_dcg_at_k(&t, &l, &inv_ps, 3, true).unwrap();
        assert_all_close(&psdcg, &expected);

        // The nDCG norm is shared by sum and best of each example here.
        let psndcg = ps_ndcg_at_k(&t, &l, &inv_ps, 3, true).unwrap();
        assert_all_close(&psndcg, &expected);
    }

    #[test]
    fn test_entries_rows_match_lists() {
        let inv_ps = LabelWeights::<u32>::Dense(vec![0.0, 2.0, 1.0, 3.0, 1.0, 0.0, 1.0, 4.0]);
        let (t, l) = (t1(), l1());
        let entries: Vec<Vec<LabelEntry<u32>>> = l
            .iter()
            .map(|row| {
                row.iter()
                    .enumerate()
                    .map(|(pos, &label)| LabelEntry::Scored(label, 1.0 - pos as f64 * 0.1))
                    .collect()
            })
            .collect();

        let from_entries =
            ps_precision_at_k(&t, Input::Entries(&entries), &inv_ps, 3, true).unwrap();
        let from_lists = ps_precision_at_k(&t, &l, &inv_ps, 3, true).unwrap();
        assert_all_close(&from_entries, &from_lists);
    }

    #[test]
    fn test_token_propensity_mapping() {
        let truth = vec![vec!["cat", "dog"], vec!["wolf"]];
        let pred = vec![vec!["dog", "cat"], vec!["wolf", "cat"]];
        let inv_ps: LabelWeights<&str> =
            HashMap::from([("cat", 1.0), ("dog", 3.0), ("wolf", 2.0)]).into();

        let psp = ps_precision_at_k(&truth, &pred, &inv_ps, 2, true).unwrap();
        assert_relative_eq!(psp[0], 1.0, epsilon = 1e-12);
        assert_relative_eq!(psp[1], 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_unseen_labels_weigh_nothing() {
        let truth = vec![vec![1u32, 50]];
        let pred = vec![vec![50u32, 1]];
        let inv_ps = LabelWeights::<u32>::Dense(vec![0.0, 2.0]);

        let psp = ps_precision_at_k(&truth, &pred, &inv_ps, 2, false).unwrap();
        assert_all_close(&psp, &[0.0, 1.0]);
    }

    #[test]
    fn test_empty_truth_zero_division() {
        let truth = vec![vec![], vec![1u32]];
        let pred = vec![vec![1u32], vec![1]];
        let inv_ps = LabelWeights::<u32>::Dense(vec![1.0, 2.0]);

        let psr = PsRecallAtK::new(1, &inv_ps, false, 1.0)
            .unwrap()
            .calculate(&Input::from(&truth), &Input::from(&pred))
            .unwrap();
        assert_all_close(&psr, &[(1.0 + 2.0) / 2.0]);

        let psn = ps_ndcg_at_k(&truth, &pred, &inv_ps, 1, true).unwrap();
        assert_all_close(&psn, &[1.0]);
    }

    #[test]
    fn test_perfect_predictions_score_one() {
        let corpus = vec![
            vec![0u32, 1, 2],
            vec![1, 3],
            vec![1],
            vec![2, 4, 5, 1],
            vec![5],
            vec![1, 2],
        ];
        let inv_ps = estimate_inverse_propensity(&corpus, PropensityParams::default()).unwrap();

        // Perfect rankings: every truth label, rarest (heaviest) first.
        let pred: Vec<Vec<u32>> = corpus
            .iter()
            .map(|row| {
                let mut row = row.clone();
                row.sort_by(|a, b| inv_ps.get(b).total_cmp(&inv_ps.get(a)));
                row
            })
            .collect();

        for v in ps_precision_at_k(&corpus, &pred, &inv_ps, 5, true).unwrap() {
            assert_relative_eq!(v, 1.0, epsilon = 1e-12);
        }
        for v in ps_ndcg_at_k(&corpus, &pred, &inv_ps, 5, true).unwrap() {
            assert_relative_eq!(v, 1.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_merge_keeps_best_sums() {
        let inv_ps = LabelWeights::<u32>::Dense(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0]);
        let (t, l) = (t1(), l1());

        let mut whole = PsPrecisionAtK::new(3, &inv_ps, true).unwrap();
        let expected = whole.calculate(&Input::from(&t), &Input::from(&l)).unwrap();

        let mut left = PsPrecisionAtK::new(3, &inv_ps, true).unwrap();
        let mut right = PsPrecisionAtK::new(3, &inv_ps, true).unwrap();
        left.accumulate_batch(&Input::from(&t[..1]), &Input::from(&l[..1]))
            .unwrap();
        right
            .accumulate_batch(&Input::from(&t[1..]), &Input::from(&l[1..]))
            .unwrap();
        left.merge(&right);

        assert_all_close(&left.summarize(), &expected);
        assert_eq!(left.best_sum(), whole.best_sum());
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn prop_normalized_psp_in_unit_interval(
                rows in prop::collection::vec(
                    (
                        prop::collection::hash_set(0u32..20, 0..5),
                        prop::collection::vec(0u32..20, 0..6),
                    ),
                    1..10,
                ),
                weights in prop::collection::vec(0.0f64..10.0, 20),
                k in 1usize..6,
            ) {
                let truth: Vec<Vec<u32>> = rows.iter().map(|(t, _)| t.iter().copied().collect()).collect();
                let pred: Vec<Vec<u32>> = rows
                    .iter()
                    .map(|(_, p)| {
                        let mut seen = std::collections::HashSet::new();
                        p.iter().copied().filter(|l| seen.insert(*l)).collect()
                    })
                    .collect();
                let inv_ps = LabelWeights::Dense(weights);

                for v in ps_precision_at_k(&truth, &pred, &inv_ps, k, true).unwrap() {
                    prop_assert!((0.0..=1.0 + 1e-9).contains(&v));
                }
            }
        }
    }
}
