//! Label identifiers and the canonical per-example label forms.
//!
//! A dataset uses exactly one label kind throughout: either integer ids
//! (which double as column indices of dense/sparse matrices) or opaque
//! string tokens. The [`Label`] trait captures the difference through
//! [`Label::index`]: integer labels map to a position, tokens do not.
//!
//! | Form | Type | Produced from |
//! |------|------|---------------|
//! | Ground truth | [`TruthSet`] | nonzero columns, stored CSR indices, list rows |
//! | Prediction | [`Ranking`] | columns by descending score, list rows in given order |

use std::collections::HashSet;
use std::fmt::Debug;
use std::hash::Hash;

/// Unordered set of true labels for one example.
pub type TruthSet<L> = HashSet<L>;

/// Predicted labels for one example, most confident first.
pub type Ranking<L> = Vec<L>;

/// A label identifier.
///
/// Implemented for the unsigned and signed integer types (negative values
/// have no index) and for `String` / `&str` tokens.
pub trait Label: Clone + Eq + Hash + Debug {
    /// Position of this label in a dense label space, if it has one.
    fn index(&self) -> Option<usize>;

    /// Label occupying column `index` of a dense/sparse matrix.
    ///
    /// Returns `None` for token labels, which cannot be read from matrices.
    fn from_index(index: usize) -> Option<Self>;
}

macro_rules! impl_integer_label {
    ($($t:ty),*) => {
        $(
            impl Label for $t {
                #[inline]
                fn index(&self) -> Option<usize> {
                    usize::try_from(*self).ok()
                }

                #[inline]
                fn from_index(index: usize) -> Option<Self> {
                    <$t>::try_from(index).ok()
                }
            }
        )*
    };
}

impl_integer_label!(u16, u32, u64, usize, i32, i64);

impl Label for String {
    fn index(&self) -> Option<usize> {
        None
    }

    fn from_index(_index: usize) -> Option<Self> {
        None
    }
}

impl Label for &str {
    fn index(&self) -> Option<usize> {
        None
    }

    fn from_index(_index: usize) -> Option<Self> {
        None
    }
}

/// The set of labels a macro average runs over.
///
/// Integer label spaces are averaged over the dense range `0..=max`, so a
/// label that was never predicted and never true still contributes a
/// `zero_division` term. Token label spaces have no such range and only the
/// labels actually observed are averaged. Macro scores therefore depend on
/// the label kind: the same data scores differently as ids and as tokens.
#[derive(Debug, Clone, PartialEq)]
pub enum LabelUniverse<L> {
    /// Only the labels that were observed.
    Observed(Vec<L>),
    /// Every index from `0` to `max` inclusive.
    DenseRange { max: usize },
}

impl<L: Label> LabelUniverse<L> {
    /// Decide the universe from the labels that were observed.
    ///
    /// Falls back to [`LabelUniverse::Observed`] when any label lacks an
    /// index, when nothing was observed, or when the largest index is
    /// `usize::MAX` (the range `0..=max` would not have a `usize` length).
    pub fn detect<'a, I>(observed: I) -> Self
    where
        I: IntoIterator<Item = &'a L>,
        L: 'a,
    {
        let mut labels: Vec<L> = Vec::new();
        let mut max: Option<usize> = None;
        let mut all_indexed = true;

        for label in observed {
            match label.index() {
                Some(i) if all_indexed => max = Some(max.map_or(i, |m| m.max(i))),
                Some(_) => {}
                None => all_indexed = false,
            }
            labels.push(label.clone());
        }

        match max {
            Some(max) if all_indexed && max < usize::MAX => LabelUniverse::DenseRange { max },
            _ => {
                let unique: HashSet<L> = labels.into_iter().collect();
                LabelUniverse::Observed(unique.into_iter().collect())
            }
        }
    }

    /// Number of labels averaged over.
    pub fn len(&self) -> usize {
        match self {
            LabelUniverse::Observed(labels) => labels.len(),
            LabelUniverse::DenseRange { max } => max.saturating_add(1),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Visit every label of the universe.
    ///
    /// Dense-range indices that cannot be represented as `L` are skipped.
    pub fn for_each(&self, mut f: impl FnMut(&L)) {
        match self {
            LabelUniverse::Observed(labels) => labels.iter().for_each(f),
            LabelUniverse::DenseRange { max } => {
                for label in (0..=*max).filter_map(L::from_index) {
                    f(&label);
                }
            }
        }
    }
}
