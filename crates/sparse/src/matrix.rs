//! Concrete sparse storage layouts.

use crate::error::{SparseError, SparseResult};
use crate::format::FormatId;
use ndarray::Array2;

/// Maximum ratio of padded DIA slots to `max(nnz, rows)`.
pub const DIA_FILL_LIMIT: usize = 20;

/// Column index marking an unused ELL slot.
pub const ELL_PADDING: usize = usize::MAX;

/// Coordinate storage, kept sorted row-major with duplicates summed.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CooMatrix {
    rows: usize,
    cols: usize,
    row_indices: Vec<usize>,
    col_indices: Vec<usize>,
    values: Vec<f64>,
}

impl CooMatrix {
    pub fn new(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            ..Self::default()
        }
    }

    /// Builds a matrix from `(row, col, value)` triplets in any order.
    pub fn from_triplets(
        rows: usize,
        cols: usize,
        triplets: &[(usize, usize, f64)],
    ) -> SparseResult<Self> {
        if let Some(&(row, col, _)) = triplets.iter().find(|(r, c, _)| *r >= rows || *c >= cols) {
            return Err(SparseError::IndexOutOfBounds {
                row,
                col,
                rows,
                cols,
            });
        }

        let mut sorted = triplets.to_vec();
        sorted.sort_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));

        let mut matrix = Self::new(rows, cols);
        for (row, col, value) in sorted {
            let duplicate = matrix.row_indices.last() == Some(&row)
                && matrix.col_indices.last() == Some(&col);
            if duplicate {
                if let Some(last) = matrix.values.last_mut() {
                    *last += value;
                }
            } else {
                matrix.row_indices.push(row);
                matrix.col_indices.push(col);
                matrix.values.push(value);
            }
        }
        Ok(matrix)
    }

    pub fn nrows(&self) -> usize {
        self.rows
    }

    pub fn ncols(&self) -> usize {
        self.cols
    }

    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    pub fn row_indices(&self) -> &[usize] {
        &self.row_indices
    }

    pub fn col_indices(&self) -> &[usize] {
        &self.col_indices
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn for_each_entry(&self, mut f: impl FnMut(usize, usize, f64)) {
        for ((&row, &col), &value) in self
            .row_indices
            .iter()
            .zip(&self.col_indices)
            .zip(&self.values)
        {
            f(row, col, value);
        }
    }
}

/// Compressed sparse row storage.
#[derive(Debug, Clone, PartialEq)]
pub struct CsrMatrix {
    rows: usize,
    cols: usize,
    row_offsets: Vec<usize>,
    col_indices: Vec<usize>,
    values: Vec<f64>,
}

impl CsrMatrix {
    pub fn nrows(&self) -> usize {
        self.rows
    }

    pub fn ncols(&self) -> usize {
        self.cols
    }

    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    pub fn row_offsets(&self) -> &[usize] {
        &self.row_offsets
    }

    pub fn col_indices(&self) -> &[usize] {
        &self.col_indices
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn for_each_entry(&self, mut f: impl FnMut(usize, usize, f64)) {
        for row in 0..self.rows {
            for idx in self.row_offsets[row]..self.row_offsets[row + 1] {
                f(row, self.col_indices[idx], self.values[idx]);
            }
        }
    }
}

impl From<&CooMatrix> for CsrMatrix {
    fn from(coo: &CooMatrix) -> Self {
        let mut row_offsets = vec![0usize; coo.rows + 1];
        for &row in &coo.row_indices {
            row_offsets[row + 1] += 1;
        }
        for row in 0..coo.rows {
            row_offsets[row + 1] += row_offsets[row];
        }

        Self {
            rows: coo.rows,
            cols: coo.cols,
            row_offsets,
            col_indices: coo.col_indices.clone(),
            values: coo.values.clone(),
        }
    }
}

/// Diagonal storage for square matrices.
///
/// `values[(d, row)]` holds `A[row, row + offsets[d]]`. Padding slots hold zero
/// and are told apart from stored zeros by `stored`.
#[derive(Debug, Clone, PartialEq)]
pub struct DiaMatrix {
    rows: usize,
    cols: usize,
    nnz: usize,
    offsets: Vec<isize>,
    values: Array2<f64>,
    stored: Array2<bool>,
}

impl DiaMatrix {
    pub fn try_from_coo(coo: &CooMatrix) -> SparseResult<Self> {
        if coo.rows != coo.cols {
            return Err(SparseError::NotSquare {
                format: FormatId::Dia,
                rows: coo.rows,
                cols: coo.cols,
            });
        }

        let rows = coo.rows;
        let diagonal_count = (rows + coo.cols).saturating_sub(1);
        let mut slot_of = vec![usize::MAX; diagonal_count];
        coo.for_each_entry(|row, col, _| slot_of[col + rows - 1 - row] = 0);

        let mut offsets = Vec::new();
        for (diag, slot) in slot_of.iter_mut().enumerate() {
            if *slot != usize::MAX {
                *slot = offsets.len();
                offsets.push(diag as isize - (rows as isize - 1));
            }
        }

        let padded = offsets.len() * rows;
        if padded > DIA_FILL_LIMIT * coo.nnz().max(rows) {
            return Err(SparseError::TooManyDiagonals {
                diagonals: offsets.len(),
                rows,
                nnz: coo.nnz(),
            });
        }

        let mut values = Array2::<f64>::zeros((offsets.len(), rows));
        let mut stored = Array2::from_elem((offsets.len(), rows), false);
        coo.for_each_entry(|row, col, value| {
            let slot = slot_of[col + rows - 1 - row];
            values[(slot, row)] += value;
            stored[(slot, row)] = true;
        });

        Ok(Self {
            rows,
            cols: coo.cols,
            nnz: coo.nnz(),
            offsets,
            values,
            stored,
        })
    }

    pub fn nrows(&self) -> usize {
        self.rows
    }

    pub fn ncols(&self) -> usize {
        self.cols
    }

    pub fn nnz(&self) -> usize {
        self.nnz
    }

    pub fn offsets(&self) -> &[isize] {
        &self.offsets
    }

    pub fn values(&self) -> &Array2<f64> {
        &self.values
    }

    /// Visits stored entries row-major, explicit zeros included; padding is
    /// skipped.
    pub fn for_each_entry(&self, mut f: impl FnMut(usize, usize, f64)) {
        for row in 0..self.rows {
            for (slot, &offset) in self.offsets.iter().enumerate() {
                if self.stored[(slot, row)] {
                    f(row, (row as isize + offset) as usize, self.values[(slot, row)]);
                }
            }
        }
    }
}

/// ELLPACK storage: every row padded to the widest row.
#[derive(Debug, Clone, PartialEq)]
pub struct EllMatrix {
    rows: usize,
    cols: usize,
    nnz: usize,
    col_indices: Array2<usize>,
    values: Array2<f64>,
}

impl EllMatrix {
    pub fn nrows(&self) -> usize {
        self.rows
    }

    pub fn ncols(&self) -> usize {
        self.cols
    }

    pub fn nnz(&self) -> usize {
        self.nnz
    }

    pub fn width(&self) -> usize {
        self.col_indices.ncols()
    }

    pub fn col_indices(&self) -> &Array2<usize> {
        &self.col_indices
    }

    pub fn values(&self) -> &Array2<f64> {
        &self.values
    }

    pub fn for_each_entry(&self, mut f: impl FnMut(usize, usize, f64)) {
        for row in 0..self.rows {
            for slot in 0..self.width() {
                let col = self.col_indices[(row, slot)];
                if col != ELL_PADDING {
                    f(row, col, self.values[(row, slot)]);
                }
            }
        }
    }
}

impl From<&CooMatrix> for EllMatrix {
    fn from(coo: &CooMatrix) -> Self {
        let mut per_row = vec![0usize; coo.rows];
        for &row in &coo.row_indices {
            per_row[row] += 1;
        }
        let width = per_row.iter().copied().max().unwrap_or(0);

        let mut col_indices = Array2::from_elem((coo.rows, width), ELL_PADDING);
        let mut values = Array2::<f64>::zeros((coo.rows, width));
        let mut cursor = vec![0usize; coo.rows];
        coo.for_each_entry(|row, col, value| {
            let slot = cursor[row];
            col_indices[(row, slot)] = col;
            values[(row, slot)] = value;
            cursor[row] += 1;
        });

        Self {
            rows: coo.rows,
            cols: coo.cols,
            nnz: coo.nnz(),
            col_indices,
            values,
        }
    }
}
