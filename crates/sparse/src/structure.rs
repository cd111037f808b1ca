//! Sparsity-pattern counters used for feature extraction.

use crate::dynamic::DynamicMatrix;

impl DynamicMatrix {
    /// Non-zeros stored in each row.
    pub fn nnz_per_row(&self) -> Vec<usize> {
        let mut counts = vec![0usize; self.nrows()];
        self.for_each_entry(|row, _, _| counts[row] += 1);
        counts
    }

    /// Non-zeros on each of the `rows + cols - 1` diagonals.
    ///
    /// Slot `k` holds the diagonal with offset `k - (rows - 1)`, so the main
    /// diagonal sits at `rows - 1`.
    pub fn nnz_per_diagonal(&self) -> Vec<usize> {
        let rows = self.nrows();
        let mut counts = vec![0usize; (rows + self.ncols()).saturating_sub(1)];
        self.for_each_entry(|row, col, _| counts[col + rows - 1 - row] += 1);
        counts
    }
}
