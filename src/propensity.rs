//! Label frequency statistics and inverse-propensity estimation.
//!
//! Propensity models how likely a relevant label is to be observed in the
//! (incomplete) ground truth. Rare labels are under-sampled, so their hits
//! are up-weighted by the inverse propensity.
//!
//! Estimation is two-pass: count label occurrences over a corpus (usually the
//! training truth), then map every count through a closed-form model. The
//! result is passed to the metrics in [`crate::ps`] and never depends on
//! predictions.
//!
//! # Formula (Jain et al., 2016)
//!
//! ```text
//! C   = (ln N − 1) · (B + 1)^A
//! q_l = 1 + C · (N_l + B)^(−A)
//! ```
//!
//! where `N` is the number of examples and `N_l` the number of examples in
//! which label `l` is true.
//!
//! # References
//!
//! - Jain, Prabhu, Varma (2016). "Extreme Multi-label Loss Functions for
//!   Recommendation, Tagging, Ranking & Other Missing Label Applications" (KDD)

use std::collections::HashMap;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::input::Input;
use crate::label::Label;
use crate::{Error, Result};

/// A non-negative weight per label, stored densely for integer label spaces
/// and as a mapping for token labels.
///
/// Labels outside a dense vector and labels missing from a mapping resolve
/// to weight `0.0`, so unseen labels contribute nothing rather than failing.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum LabelWeights<L: Label> {
    /// `weights[i]` belongs to the label with index `i`.
    Dense(Vec<f64>),
    /// Explicit weight per label.
    Map(HashMap<L, f64>),
}

impl<L: Label> LabelWeights<L> {
    /// Weight of `label`, `0.0` when it has none.
    pub fn get(&self, label: &L) -> f64 {
        match self {
            LabelWeights::Dense(weights) => label
                .index()
                .and_then(|i| weights.get(i))
                .copied()
                .unwrap_or(0.0),
            LabelWeights::Map(weights) => weights.get(label).copied().unwrap_or(0.0),
        }
    }

    /// Number of stored weights.
    pub fn len(&self) -> usize {
        match self {
            LabelWeights::Dense(weights) => weights.len(),
            LabelWeights::Map(weights) => weights.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Apply `f` to every stored weight.
    pub fn map(self, f: impl Fn(f64) -> f64) -> Self {
        match self {
            LabelWeights::Dense(weights) => {
                LabelWeights::Dense(weights.into_iter().map(f).collect())
            }
            LabelWeights::Map(weights) => {
                LabelWeights::Map(weights.into_iter().map(|(l, w)| (l, f(w))).collect())
            }
        }
    }

    /// Weights of `labels`, largest first.
    pub fn sorted_desc<'a>(&self, labels: impl IntoIterator<Item = &'a L>) -> Vec<f64>
    where
        L: 'a,
    {
        let mut weights: Vec<f64> = labels.into_iter().map(|l| self.get(l)).collect();
        weights.sort_by(|a, b| b.total_cmp(a));
        weights
    }
}

impl<L: Label> From<Vec<f64>> for LabelWeights<L> {
    fn from(weights: Vec<f64>) -> Self {
        LabelWeights::Dense(weights)
    }
}

impl<L: Label> From<HashMap<L, f64>> for LabelWeights<L> {
    fn from(weights: HashMap<L, f64>) -> Self {
        LabelWeights::Map(weights)
    }
}

/// Inverse propensity weights.
pub type Propensity<L> = LabelWeights<L>;

/// Parameters of the propensity model.
///
/// The defaults suit most corpora; the values that fit a particular dataset
/// are the caller's choice.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PropensityParams {
    /// Exponent `A`.
    pub a: f64,
    /// Offset `B`.
    pub b: f64,
}

impl Default for PropensityParams {
    fn default() -> Self {
        Self { a: 0.55, b: 1.5 }
    }
}

impl PropensityParams {
    pub fn new(a: f64, b: f64) -> Result<Self> {
        let params = Self { a, b };
        params.validate()?;
        Ok(params)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.a.is_finite() || !self.b.is_finite() || self.b <= -1.0 {
            return Err(Error::InvalidPropensityParams {
                a: self.a,
                b: self.b,
            });
        }
        Ok(())
    }
}

/// Number of examples in which each label is true.
///
/// Matrix corpora yield a dense vector as wide as the matrix. List corpora
/// yield a dense vector of length `max + 1` when every label has an index,
/// and a mapping otherwise. A label repeated within one row counts once.
///
/// # Example
///
/// ```rust
/// use xcmetrics::propensity::{count_label_frequencies, LabelWeights};
///
/// let corpus = vec![vec![0u32, 2], vec![2], vec![2, 2]];
/// let counts = count_label_frequencies(&corpus).unwrap();
/// assert_eq!(counts, LabelWeights::Dense(vec![1.0, 0.0, 3.0]));
/// ```
pub fn count_label_frequencies<'a, L: Label + 'a>(corpus: impl Into<Input<'a, L>>) -> Result<LabelWeights<L>> {
    let corpus = corpus.into();
    Ok(count_rows(&corpus)?.0)
}

/// Counts plus the number of examples they were taken over.
fn count_rows<L: Label>(corpus: &Input<'_, L>) -> Result<(LabelWeights<L>, usize)> {
    let mut counts: HashMap<L, f64> = HashMap::new();
    let mut n = 0usize;
    for truth in corpus.truth_sets()? {
        n += 1;
        for label in truth {
            *counts.entry(label).or_insert(0.0) += 1.0;
        }
    }

    let indexed: Option<Vec<(usize, f64)>> = counts
        .iter()
        .map(|(l, &c)| l.index().map(|i| (i, c)))
        .collect();

    // An index of usize::MAX has no dense width; such corpora stay a mapping.
    let width = indexed.as_ref().and_then(|indexed| {
        indexed
            .iter()
            .try_fold(corpus.n_labels().unwrap_or(0), |w, &(i, _)| {
                Some(w.max(i.checked_add(1)?))
            })
    });

    let weights = match (indexed, width) {
        (Some(indexed), Some(width)) if !indexed.is_empty() || corpus.n_labels().is_some() => {
            let mut dense = vec![0.0; width];
            for (i, c) in indexed {
                dense[i] = c;
            }
            LabelWeights::Dense(dense)
        }
        _ => LabelWeights::Map(counts),
    };
    Ok((weights, n))
}

fn non_empty<L: Label>(corpus: &Input<'_, L>) -> Result<(LabelWeights<L>, usize)> {
    let (counts, n) = count_rows(corpus)?;
    if n == 0 {
        return Err(Error::EmptyInput);
    }
    Ok((counts, n))
}

/// Prior probability of each label: `N_l / N`.
pub fn label_priors<'a, L: Label + 'a>(corpus: impl Into<Input<'a, L>>) -> Result<LabelWeights<L>> {
    let (counts, n) = non_empty(&corpus.into())?;
    debug!(examples = n, labels = counts.len(), "estimated label priors");
    Ok(counts.map(|c| c / n as f64))
}

/// Inverse prior of each label: `N / N_l`.
///
/// Labels stored with a zero count (gaps in a dense vector) get `+inf`.
pub fn inverse_label_priors<'a, L: Label + 'a>(
    corpus: impl Into<Input<'a, L>>,
) -> Result<LabelWeights<L>> {
    Ok(label_priors(corpus)?.map(|p| 1.0 / p))
}

/// Inverse propensity of each label under the Jain et al. model.
///
/// # Example
///
/// ```rust
/// use xcmetrics::propensity::{estimate_inverse_propensity, PropensityParams};
///
/// let corpus = vec![vec![0u32, 1], vec![1], vec![1, 2], vec![1]];
/// let inv_ps = estimate_inverse_propensity(&corpus, PropensityParams::default()).unwrap();
///
/// // Rare labels weigh more than frequent ones.
/// assert!(inv_ps.get(&0) > inv_ps.get(&1));
/// // Labels never seen weigh nothing.
/// assert_eq!(inv_ps.get(&10), 0.0);
/// ```
pub fn estimate_inverse_propensity<'a, L: Label + 'a>(
    corpus: impl Into<Input<'a, L>>,
    params: PropensityParams,
) -> Result<Propensity<L>> {
    params.validate()?;
    let (counts, n) = non_empty(&corpus.into())?;

    let PropensityParams { a, b } = params;
    let c = ((n as f64).ln() - 1.0) * (b + 1.0).powf(a);
    debug!(examples = n, labels = counts.len(), a, b, "estimated inverse propensities");
    Ok(counts.map(|count| 1.0 + c * (count + b).powf(-a)))
}

/// Propensity of each label: the reciprocal of [`estimate_inverse_propensity`].
pub fn jain_et_al_propensity<'a, L: Label + 'a>(
    corpus: impl Into<Input<'a, L>>,
    params: PropensityParams,
) -> Result<LabelWeights<L>> {
    Ok(estimate_inverse_propensity(corpus, params)?.map(|q| 1.0 / q))
}
