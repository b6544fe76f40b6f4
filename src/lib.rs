//! # xcmetrics
//!
//! Evaluation metrics for multi-label and extreme classification.
//!
//! Every example pairs a set of true labels with a prediction: either a
//! ranking (for metrics at k) or a label set. Label spaces can be huge, so
//! metrics are streaming accumulators whose cost per example depends on `k`
//! and on the example's own labels, never on the size of the label space.
//!
//! ## Metrics
//!
//! | Family | Metrics | Module |
//! |--------|---------|--------|
//! | Rank-based @k | precision, recall, DCG, nDCG, coverage, abandonment | [`metrics`] |
//! | Propensity-scored @k | PSP, PSR, PSDCG, PSnDCG | [`ps`] |
//! | Set-based | Hamming loss, F1 micro / macro / samples | [`set`] |
//! | Macro @k | macro precision, recall, F1 | [`macro_avg`] |
//!
//! At-k metrics report a value for **every** cutoff `1..=k` from one pass:
//! element `i` of the result is the metric at cutoff `i + 1`.
//!
//! ## Inputs
//!
//! Truth and predictions are passed as an [`Input`], which wraps any of:
//!
//! | Representation | Label type | Ranking order |
//! |----------------|------------|---------------|
//! | dense `ndarray` matrix | integer column index | by value, descending |
//! | [`CsrMatrix`] | integer column index | stored entries by value, descending |
//! | list of labels per row | any [`Label`] (ids or tokens) | as given |
//! | list of `(label, score)` per row | any [`Label`] | as given |
//!
//! A truth matrix marks a label true by any nonzero entry. Lists are never
//! re-sorted: the caller's order is the ranking.
//!
//! ## Quick Start
//!
//! ### Rank-based metrics
//!
//! ```rust
//! use xcmetrics::{ndcg_at_k, precision_at_k};
//!
//! let truth = vec![vec![1u32, 2, 3], vec![3, 4, 7]];
//! let pred = vec![vec![1u32, 2, 4], vec![7, 6, 3]];
//!
//! let p = precision_at_k(&truth, &pred, 3).unwrap();
//! assert_eq!(p[0], 1.0);
//! assert_eq!(p[1], 0.75);
//!
//! let n = ndcg_at_k(&truth, &pred, 3).unwrap();
//! assert!((n[1] - 0.8065736).abs() < 1e-6);
//! ```
//!
//! ### Propensity-scored metrics
//!
//! Propensities come from the label frequencies of a corpus, usually the
//! training truth, and are computed before any scoring:
//!
//! ```rust
//! use xcmetrics::propensity::{estimate_inverse_propensity, PropensityParams};
//! use xcmetrics::ps::ps_precision_at_k;
//!
//! let train = vec![vec![0u32, 1], vec![1], vec![1, 2], vec![1, 3]];
//! let inv_ps = estimate_inverse_propensity(&train, PropensityParams::default()).unwrap();
//!
//! let truth = vec![vec![0u32, 1]];
//! let pred = vec![vec![0u32, 1]];
//! let psp = ps_precision_at_k(&truth, &pred, &inv_ps, 2, true).unwrap();
//! assert!((psp[1] - 1.0).abs() < 1e-12);
//! ```
//!
//! ### Matrices and streaming
//!
//! ```rust
//! use ndarray::array;
//! use xcmetrics::{Input, Metric, PrecisionAtK};
//!
//! let truth = array![[0.0, 1.0, 1.0], [1.0, 0.0, 0.0]];
//! let scores = array![[0.1, 0.7, 0.2], [0.3, 0.9, 0.0]];
//!
//! let mut p = PrecisionAtK::new(1).unwrap();
//! for (t, s) in truth.outer_iter().zip(scores.outer_iter()) {
//!     let (t, s) = (t.insert_axis(ndarray::Axis(0)), s.insert_axis(ndarray::Axis(0)));
//!     Metric::<u32>::accumulate_batch(&mut p, &Input::from(t), &Input::from(s)).unwrap();
//! }
//! assert_eq!(Metric::<u32>::summarize(&p), vec![0.5]);
//! ```
//!
//! ## Modules
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`label`] | [`Label`] trait, truth sets, label universe |
//! | [`input`] | [`Input`] adapter, [`CsrMatrix`] |
//! | [`metric`] | [`Metric`] accumulator trait, at-k machinery |
//! | [`metrics`] | Rank-based metrics at k |
//! | [`propensity`] | Label frequencies, priors, inverse propensities |
//! | [`ps`] | Propensity-scored metrics at k |
//! | [`set`] | Hamming loss, F1 |
//! | [`macro_avg`] | Confusion tallies, macro metrics at k |
//!
//! ## What Can Go Wrong
//!
//! 1. **Truth and prediction of different length**: they are zipped to the
//!    shorter one and a warning is logged, nothing fails.
//! 2. **Token labels in a matrix**: matrix columns are integer ids, so
//!    `Input<String>` over a matrix is rejected.
//! 3. **Macro averages over integer ids**: every id from 0 to the largest
//!    observed one is averaged, including ids never seen.
//! 4. **Unknown labels in propensity lookups**: they weigh 0.
//!
//! ## References
//!
//! - Jain, Prabhu, Varma (2016). "Extreme Multi-label Loss Functions for
//!   Recommendation, Tagging, Ranking & Other Missing Label Applications" (KDD)
//! - Bhatia et al. "The Extreme Classification Repository"

pub mod input;
pub mod label;
pub mod macro_avg;
pub mod metric;
pub mod metrics;
pub mod propensity;
pub mod ps;
pub mod set;

use thiserror::Error;

pub use input::{CsrMatrix, Input, LabelEntry, RowOrder};
pub use label::{Label, LabelUniverse, Ranking, TruthSet};
pub use macro_avg::{
    macro_f1_at_k, macro_precision_at_k, macro_recall_at_k, ConfusionTally, MacroF1AtK,
    MacroPrecisionAtK, MacroRecallAtK,
};
pub use metric::{Metric, MetricAtK};
pub use metrics::{
    abandonment_at_k, coverage_at_k, dcg_at_k, ndcg_at_k, precision_at_k, recall_at_k,
    AbandonmentAtK, CoverageAtK, DcgAtK, NdcgAtK, PrecisionAtK, RecallAtK,
};
pub use propensity::{estimate_inverse_propensity, LabelWeights, PropensityParams};
pub use ps::{ps_dcg_at_k, ps_ndcg_at_k, ps_precision_at_k, ps_recall_at_k};
pub use set::{f1_measure, hamming_loss, Average};

#[derive(Debug, Error)]
pub enum Error {
    #[error("k must be at least 1, got {0}")]
    InvalidK(usize),

    #[error("unsupported input: {0}")]
    UnsupportedInputKind(String),

    #[error("invalid sparse matrix: {0}")]
    InvalidSparseMatrix(String),

    #[error("unknown average {0:?}, expected micro, macro or samples")]
    InvalidAverage(String),

    #[error("empty input")]
    EmptyInput,

    #[error("invalid propensity parameters: A = {a}, B = {b}")]
    InvalidPropensityParams { a: f64, b: f64 },
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        assert_eq!(Error::InvalidK(0).to_string(), "k must be at least 1, got 0");
        assert_eq!(
            Error::InvalidAverage("weighted".into()).to_string(),
            "unknown average \"weighted\", expected micro, macro or samples"
        );
    }

    #[test]
    fn test_reexports_cover_each_family() {
        let truth = vec![vec![1u32, 2, 3], vec![3, 4, 7]];
        let pred = vec![vec![1u32, 2, 4], vec![7, 6, 3]];

        assert_eq!(precision_at_k(&truth, &pred, 2).unwrap().len(), 2);
        assert_eq!(hamming_loss(&truth, &pred).unwrap(), 2.0);
        assert_eq!(macro_f1_at_k(&truth, &pred, 3, 0.0).unwrap().len(), 3);
        assert!(f1_measure(&truth, &pred, Average::Samples, 0.0).unwrap() > 0.0);

        let inv_ps = estimate_inverse_propensity(&truth, PropensityParams::default()).unwrap();
        assert_eq!(ps_precision_at_k(&truth, &pred, &inv_ps, 3, true).unwrap().len(), 3);
    }
}
