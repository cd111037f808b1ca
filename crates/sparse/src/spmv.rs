//! Sparse matrix-vector multiplication, `y = A * x`.

use crate::dynamic::DynamicMatrix;
use crate::error::{SparseError, SparseResult};
use crate::matrix::{CooMatrix, CsrMatrix, DiaMatrix, EllMatrix, ELL_PADDING};
use ndarray::{ArrayView1, ArrayViewMut1, Zip};
use serde::{Deserialize, Serialize};

/// Where a multiply runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ExecutionSpace {
    #[default]
    Serial,
    /// Row-parallel on the rayon global pool.
    Threads,
}

impl DynamicMatrix {
    pub fn multiply(
        &self,
        x: ArrayView1<'_, f64>,
        y: ArrayViewMut1<'_, f64>,
        space: ExecutionSpace,
    ) -> SparseResult<()> {
        if x.len() != self.ncols() || y.len() != self.nrows() {
            return Err(SparseError::DimensionMismatch(format!(
                "{}x{} matrix with x of length {} and y of length {}",
                self.nrows(),
                self.ncols(),
                x.len(),
                y.len()
            )));
        }

        match self {
            DynamicMatrix::Coo(m) => coo_spmv(m, x, y),
            DynamicMatrix::Csr(m) => csr_spmv(m, x, y, space),
            DynamicMatrix::Dia(m) => dia_spmv(m, x, y, space),
            DynamicMatrix::Ell(m) => ell_spmv(m, x, y, space),
        }
        Ok(())
    }
}

// Coordinate storage has no row partition to split on, so it always runs serially.
fn coo_spmv(m: &CooMatrix, x: ArrayView1<'_, f64>, mut y: ArrayViewMut1<'_, f64>) {
    y.fill(0.0);
    m.for_each_entry(|row, col, value| y[row] += value * x[col]);
}

fn csr_spmv(
    m: &CsrMatrix,
    x: ArrayView1<'_, f64>,
    y: ArrayViewMut1<'_, f64>,
    space: ExecutionSpace,
) {
    let offsets = m.row_offsets();
    let cols = m.col_indices();
    let values = m.values();
    let row_dot = |row: usize| {
        (offsets[row]..offsets[row + 1])
            .map(|idx| values[idx] * x[cols[idx]])
            .sum::<f64>()
    };
    for_each_row(y, space, row_dot);
}

fn dia_spmv(
    m: &DiaMatrix,
    x: ArrayView1<'_, f64>,
    y: ArrayViewMut1<'_, f64>,
    space: ExecutionSpace,
) {
    let ncols = m.ncols() as isize;
    let values = m.values();
    let row_dot = |row: usize| {
        let mut acc = 0.0;
        for (slot, &offset) in m.offsets().iter().enumerate() {
            let col = row as isize + offset;
            if col >= 0 && col < ncols {
                acc += values[(slot, row)] * x[col as usize];
            }
        }
        acc
    };
    for_each_row(y, space, row_dot);
}

fn ell_spmv(
    m: &EllMatrix,
    x: ArrayView1<'_, f64>,
    y: ArrayViewMut1<'_, f64>,
    space: ExecutionSpace,
) {
    let cols = m.col_indices();
    let values = m.values();
    let width = m.width();
    let row_dot = |row: usize| {
        let mut acc = 0.0;
        for slot in 0..width {
            let col = cols[(row, slot)];
            if col != ELL_PADDING {
                acc += values[(row, slot)] * x[col];
            }
        }
        acc
    };
    for_each_row(y, space, row_dot);
}

fn for_each_row<F>(y: ArrayViewMut1<'_, f64>, space: ExecutionSpace, row_dot: F)
where
    F: Fn(usize) -> f64 + Sync + Send,
{
    match space {
        ExecutionSpace::Serial => Zip::indexed(y).for_each(|row, out| *out = row_dot(row)),
        ExecutionSpace::Threads => Zip::indexed(y).par_for_each(|row, out| *out = row_dot(row)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::FormatId;
    use approx::assert_abs_diff_eq;
    use ndarray::Array1;

    fn random_square(n: usize, density: f64, seed: u64) -> DynamicMatrix {
        fastrand::seed(seed);
        let mut triplets = Vec::new();
        for row in 0..n {
            // Keep the diagonal populated so DIA stays within its fill limit.
            triplets.push((row, row, 1.0 + fastrand::f64()));
            for col in row.saturating_sub(3)..(row + 4).min(n) {
                if fastrand::f64() < density {
                    triplets.push((row, col, fastrand::f64() - 0.5));
                }
            }
        }
        CooMatrix::from_triplets(n, n, &triplets).unwrap().into()
    }

    fn dense_reference(matrix: &DynamicMatrix, x: &Array1<f64>) -> Array1<f64> {
        let mut y = Array1::zeros(matrix.nrows());
        matrix.for_each_entry(|row, col, value| y[row] += value * x[col]);
        y
    }

    #[test]
    fn every_format_and_space_matches_reference() {
        let base = random_square(40, 0.4, 7);
        let x = Array1::from_shape_fn(40, |i| (i as f64 * 0.37).sin());
        let reference = dense_reference(&base, &x);

        for format in FormatId::ALL {
            let mut matrix = base.clone();
            matrix.convert(format).expect("banded matrix converts");
            for space in [ExecutionSpace::Serial, ExecutionSpace::Threads] {
                let mut y = Array1::from_elem(40, 99.0);
                matrix.multiply(x.view(), y.view_mut(), space).unwrap();
                for i in 0..40 {
                    assert_abs_diff_eq!(y[i], reference[i], epsilon = 1e-12);
                }
            }
        }
    }

    #[test]
    fn multiply_checks_vector_lengths() {
        let matrix = random_square(5, 0.5, 1);
        let x = Array1::zeros(4);
        let mut y = Array1::zeros(5);
        let err = matrix
            .multiply(x.view(), y.view_mut(), ExecutionSpace::Serial)
            .unwrap_err();
        assert!(matches!(err, SparseError::DimensionMismatch(_)));
    }
}
