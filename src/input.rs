//! Input representations and their adaptation to canonical label forms.
//!
//! Truth and predictions arrive as one of three shapes:
//!
//! | Variant | Truth | Ranking |
//! |---------|-------|---------|
//! | [`Input::Dense`] | columns with a nonzero value | columns by descending value |
//! | [`Input::Sparse`] | stored column indices (any stored value) | stored indices by descending value |
//! | [`Input::Labels`] / [`Input::Scored`] / [`Input::Entries`] | the row as a set | the row in the order given |
//!
//! List rows are never re-sorted, even when they carry scores: callers that
//! pass `(label, score)` pairs are expected to have produced a valid ranking
//! already. So the three representations only agree on orderings when the
//! list order agrees with the scores.
//!
//! The shape is inspected once when iteration starts ([`Input::rows`]), not
//! per example.

use ndarray::{Array2, ArrayView2};

use crate::label::{Label, Ranking, TruthSet};
use crate::{Error, Result};

/// Compressed sparse row matrix of label scores.
///
/// Row `i` holds `indices[indptr[i]..indptr[i + 1]]` with matching `data`.
#[derive(Debug, Clone, PartialEq)]
pub struct CsrMatrix {
    indptr: Vec<usize>,
    indices: Vec<usize>,
    data: Vec<f64>,
    n_cols: usize,
}

impl CsrMatrix {
    /// Build from a CSR triplet; the width is inferred from the largest index.
    ///
    /// ```rust
    /// use xcmetrics::CsrMatrix;
    ///
    /// let m = CsrMatrix::new(vec![0, 2, 3], vec![1, 4, 0], vec![1.0, 0.5, 1.0]).unwrap();
    /// assert_eq!(m.n_rows(), 2);
    /// assert_eq!(m.n_cols(), 5);
    /// ```
    pub fn new(indptr: Vec<usize>, indices: Vec<usize>, data: Vec<f64>) -> Result<Self> {
        let n_cols = indices.iter().max().map_or(0, |&m| m + 1);
        Self::with_width(indptr, indices, data, n_cols)
    }

    /// Build from a CSR triplet with an explicit number of columns.
    pub fn with_width(
        indptr: Vec<usize>,
        indices: Vec<usize>,
        data: Vec<f64>,
        n_cols: usize,
    ) -> Result<Self> {
        if indptr.first().is_some_and(|&p| p != 0) {
            return Err(Error::InvalidSparseMatrix(
                "indptr must start at 0".to_string(),
            ));
        }
        if indptr.windows(2).any(|w| w[0] > w[1]) {
            return Err(Error::InvalidSparseMatrix(
                "indptr must be non-decreasing".to_string(),
            ));
        }
        if indices.len() != data.len() {
            return Err(Error::InvalidSparseMatrix(format!(
                "indices and data differ in length: {} vs {}",
                indices.len(),
                data.len()
            )));
        }
        let nnz = indptr.last().copied().unwrap_or(0);
        if nnz != indices.len() {
            return Err(Error::InvalidSparseMatrix(format!(
                "indptr ends at {} but {} entries are stored",
                nnz,
                indices.len()
            )));
        }
        if let Some(&bad) = indices.iter().find(|&&i| i >= n_cols) {
            return Err(Error::InvalidSparseMatrix(format!(
                "column index {} out of range for width {}",
                bad, n_cols
            )));
        }

        Ok(Self {
            indptr,
            indices,
            data,
            n_cols,
        })
    }

    /// Build from per-row `(column, value)` entries.
    pub fn from_rows(rows: &[Vec<(usize, f64)>]) -> Result<Self> {
        let mut indptr = Vec::with_capacity(rows.len() + 1);
        let mut indices = Vec::new();
        let mut data = Vec::new();
        indptr.push(0);
        for row in rows {
            for &(col, value) in row {
                indices.push(col);
                data.push(value);
            }
            indptr.push(indices.len());
        }
        Self::new(indptr, indices, data)
    }

    pub fn n_rows(&self) -> usize {
        self.indptr.len().saturating_sub(1)
    }

    pub fn n_cols(&self) -> usize {
        self.n_cols
    }

    /// Stored column indices and values of row `i`, `None` past the last row.
    pub fn row(&self, i: usize) -> Option<(&[usize], &[f64])> {
        let (&start, &end) = (self.indptr.get(i)?, self.indptr.get(i.checked_add(1)?)?);
        Some((&self.indices[start..end], &self.data[start..end]))
    }
}

/// One element of a dynamically-typed list row.
#[derive(Debug, Clone, PartialEq)]
pub enum LabelEntry<L> {
    Plain(L),
    Scored(L, f64),
}

impl<L> LabelEntry<L> {
    pub fn label(&self) -> &L {
        match self {
            LabelEntry::Plain(l) | LabelEntry::Scored(l, _) => l,
        }
    }

    fn is_scored(&self) -> bool {
        matches!(self, LabelEntry::Scored(..))
    }
}

/// A batch of examples in one of the supported representations.
#[derive(Debug)]
pub enum Input<'a, L> {
    /// Dense `examples × labels` score (or 0/1) matrix.
    Dense(ArrayView2<'a, f64>),
    /// Sparse `examples × labels` matrix.
    Sparse(&'a CsrMatrix),
    /// Rows of bare labels.
    Labels(&'a [Vec<L>]),
    /// Rows of `(label, score)` pairs, already in ranking order.
    Scored(&'a [Vec<(L, f64)>]),
    /// Rows whose element kind is only known at runtime.
    Entries(&'a [Vec<LabelEntry<L>>]),
}

impl<L> Clone for Input<'_, L> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<L> Copy for Input<'_, L> {}

impl<'a, L> From<ArrayView2<'a, f64>> for Input<'a, L> {
    fn from(view: ArrayView2<'a, f64>) -> Self {
        Input::Dense(view)
    }
}

impl<'a, L> From<&'a Array2<f64>> for Input<'a, L> {
    fn from(matrix: &'a Array2<f64>) -> Self {
        Input::Dense(matrix.view())
    }
}

impl<'a, L> From<&'a CsrMatrix> for Input<'a, L> {
    fn from(matrix: &'a CsrMatrix) -> Self {
        Input::Sparse(matrix)
    }
}

impl<'a, L> From<&'a [Vec<L>]> for Input<'a, L> {
    fn from(rows: &'a [Vec<L>]) -> Self {
        Input::Labels(rows)
    }
}

impl<'a, L> From<&'a Vec<Vec<L>>> for Input<'a, L> {
    fn from(rows: &'a Vec<Vec<L>>) -> Self {
        Input::Labels(rows.as_slice())
    }
}

/// How a row is read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowOrder {
    /// Labels present in the row, in storage order (truth, or predictions as a set).
    Present,
    /// Labels ordered most confident first.
    Ranked,
}

impl<'a, L: Label> Input<'a, L> {
    /// Number of examples.
    pub fn len(&self) -> usize {
        match self {
            Input::Dense(view) => view.nrows(),
            Input::Sparse(matrix) => matrix.n_rows(),
            Input::Labels(rows) => rows.len(),
            Input::Scored(rows) => rows.len(),
            Input::Entries(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Width of the label space for matrix inputs.
    pub fn n_labels(&self) -> Option<usize> {
        match self {
            Input::Dense(view) => Some(view.ncols()),
            Input::Sparse(matrix) => Some(matrix.n_cols()),
            _ => None,
        }
    }

    /// Lazily read every row, validating the representation first.
    pub fn rows(&self, order: RowOrder) -> Result<Rows<'a, L>> {
        self.validate()?;
        Ok(Rows {
            input: *self,
            order,
            next: 0,
            len: self.len(),
        })
    }

    /// Ground-truth sets, one per example.
    pub fn truth_sets(&self) -> Result<impl Iterator<Item = TruthSet<L>> + 'a> {
        Ok(self
            .rows(RowOrder::Present)?
            .map(|row| row.into_iter().collect()))
    }

    /// Prediction rankings, one per example.
    pub fn rankings(&self) -> Result<Rows<'a, L>> {
        self.rows(RowOrder::Ranked)
    }

    fn validate(&self) -> Result<()> {
        match self {
            Input::Dense(_) | Input::Sparse(_) => {
                let width = self.n_labels().unwrap_or(0);
                if width > 0 && L::from_index(width - 1).is_none() {
                    return Err(Error::UnsupportedInputKind(format!(
                        "matrix columns 0..{} cannot be read as {} labels",
                        width,
                        std::any::type_name::<L>()
                    )));
                }
                Ok(())
            }
            Input::Labels(_) | Input::Scored(_) => Ok(()),
            Input::Entries(rows) => {
                for (i, row) in rows.iter().enumerate() {
                    if let Some(first) = row.first() {
                        let scored = first.is_scored();
                        if row.iter().any(|e| e.is_scored() != scored) {
                            return Err(Error::UnsupportedInputKind(format!(
                                "example {} mixes plain and scored labels",
                                i
                            )));
                        }
                    }
                }
                Ok(())
            }
        }
    }

    fn row_labels(&self, i: usize, order: RowOrder) -> Vec<L> {
        match self {
            Input::Dense(view) => {
                let row = view.row(i);
                match order {
                    RowOrder::Present => row
                        .iter()
                        .enumerate()
                        .filter(|&(_, &v)| v != 0.0)
                        .filter_map(|(col, _)| L::from_index(col))
                        .collect(),
                    RowOrder::Ranked => {
                        let mut cols: Vec<usize> = (0..row.len()).collect();
                        cols.sort_by(|&a, &b| row[b].total_cmp(&row[a]));
                        cols.into_iter().filter_map(L::from_index).collect()
                    }
                }
            }
            Input::Sparse(matrix) => {
                let Some((indices, data)) = matrix.row(i) else {
                    return Vec::new();
                };
                match order {
                    RowOrder::Present => indices.iter().filter_map(|&c| L::from_index(c)).collect(),
                    RowOrder::Ranked => {
                        let mut entries: Vec<(usize, f64)> =
                            indices.iter().copied().zip(data.iter().copied()).collect();
                        entries.sort_by(|a, b| b.1.total_cmp(&a.1));
                        entries
                            .into_iter()
                            .filter_map(|(c, _)| L::from_index(c))
                            .collect()
                    }
                }
            }
            Input::Labels(rows) => rows[i].clone(),
            Input::Scored(rows) => rows[i].iter().map(|(l, _)| l.clone()).collect(),
            Input::Entries(rows) => rows[i].iter().map(|e| e.label().clone()).collect(),
        }
    }
}

/// Single-pass iterator over the rows of an [`Input`].
#[derive(Debug)]
pub struct Rows<'a, L> {
    input: Input<'a, L>,
    order: RowOrder,
    next: usize,
    len: usize,
}

impl<L: Label> Iterator for Rows<'_, L> {
    type Item = Ranking<L>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.len {
            return None;
        }
        let row = self.input.row_labels(self.next, self.order);
        self.next += 1;
        Some(row)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.len - self.next;
        (remaining, Some(remaining))
    }
}

impl<L: Label> ExactSizeIterator for Rows<'_, L> {}
