//! A matrix that can switch its storage layout at runtime.

use crate::error::SparseResult;
use crate::format::FormatId;
use crate::matrix::{CooMatrix, CsrMatrix, DiaMatrix, EllMatrix};
use tracing::debug;

#[derive(Debug, Clone, PartialEq)]
pub enum DynamicMatrix {
    Coo(CooMatrix),
    Csr(CsrMatrix),
    Dia(DiaMatrix),
    Ell(EllMatrix),
}

impl DynamicMatrix {
    pub fn format(&self) -> FormatId {
        match self {
            DynamicMatrix::Coo(_) => FormatId::Coo,
            DynamicMatrix::Csr(_) => FormatId::Csr,
            DynamicMatrix::Dia(_) => FormatId::Dia,
            DynamicMatrix::Ell(_) => FormatId::Ell,
        }
    }

    pub fn nrows(&self) -> usize {
        match self {
            DynamicMatrix::Coo(m) => m.nrows(),
            DynamicMatrix::Csr(m) => m.nrows(),
            DynamicMatrix::Dia(m) => m.nrows(),
            DynamicMatrix::Ell(m) => m.nrows(),
        }
    }

    pub fn ncols(&self) -> usize {
        match self {
            DynamicMatrix::Coo(m) => m.ncols(),
            DynamicMatrix::Csr(m) => m.ncols(),
            DynamicMatrix::Dia(m) => m.ncols(),
            DynamicMatrix::Ell(m) => m.ncols(),
        }
    }

    pub fn nnz(&self) -> usize {
        match self {
            DynamicMatrix::Coo(m) => m.nnz(),
            DynamicMatrix::Csr(m) => m.nnz(),
            DynamicMatrix::Dia(m) => m.nnz(),
            DynamicMatrix::Ell(m) => m.nnz(),
        }
    }

    pub fn is_square(&self) -> bool {
        self.nrows() == self.ncols()
    }

    pub fn for_each_entry(&self, f: impl FnMut(usize, usize, f64)) {
        match self {
            DynamicMatrix::Coo(m) => m.for_each_entry(f),
            DynamicMatrix::Csr(m) => m.for_each_entry(f),
            DynamicMatrix::Dia(m) => m.for_each_entry(f),
            DynamicMatrix::Ell(m) => m.for_each_entry(f),
        }
    }

    pub fn to_coo(&self) -> CooMatrix {
        if let DynamicMatrix::Coo(coo) = self {
            return coo.clone();
        }
        let mut triplets = Vec::with_capacity(self.nnz());
        self.for_each_entry(|row, col, value| triplets.push((row, col, value)));
        // Entries come from a valid matrix of the same shape, so bounds hold.
        CooMatrix::from_triplets(self.nrows(), self.ncols(), &triplets)
            .unwrap_or_else(|_| CooMatrix::new(self.nrows(), self.ncols()))
    }

    /// Converts in place, pivoting through COO. On failure `self` is unchanged.
    pub fn convert(&mut self, target: FormatId) -> SparseResult<()> {
        if self.format() == target {
            return Ok(());
        }

        let coo = self.to_coo();
        let converted = match target {
            FormatId::Coo => DynamicMatrix::Coo(coo),
            FormatId::Csr => DynamicMatrix::Csr(CsrMatrix::from(&coo)),
            FormatId::Dia => DynamicMatrix::Dia(DiaMatrix::try_from_coo(&coo)?),
            FormatId::Ell => DynamicMatrix::Ell(EllMatrix::from(&coo)),
        };

        debug!(from = %self.format(), to = %target, "converted sparse matrix");
        *self = converted;
        Ok(())
    }
}

impl From<CooMatrix> for DynamicMatrix {
    fn from(value: CooMatrix) -> Self {
        DynamicMatrix::Coo(value)
    }
}

impl From<CsrMatrix> for DynamicMatrix {
    fn from(value: CsrMatrix) -> Self {
        DynamicMatrix::Csr(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SparseError;

    fn tridiagonal(n: usize) -> DynamicMatrix {
        let mut triplets = Vec::new();
        for i in 0..n {
            triplets.push((i, i, 2.0));
            if i > 0 {
                triplets.push((i, i - 1, -1.0));
            }
            if i + 1 < n {
                triplets.push((i, i + 1, -1.0));
            }
        }
        CooMatrix::from_triplets(n, n, &triplets).unwrap().into()
    }

    #[test]
    fn conversion_cycle_preserves_entries() {
        let original = tridiagonal(6);
        let mut matrix = original.clone();
        for format in [FormatId::Csr, FormatId::Dia, FormatId::Ell, FormatId::Coo] {
            matrix.convert(format).expect("tridiagonal converts everywhere");
            assert_eq!(matrix.format(), format);
            assert_eq!(matrix.nnz(), 16);
        }
        assert_eq!(matrix, original);
    }

    #[test]
    fn failed_conversion_leaves_matrix_untouched() {
        let coo = CooMatrix::from_triplets(3, 2, &[(0, 0, 1.0), (2, 1, 2.0)]).unwrap();
        let mut matrix = DynamicMatrix::from(coo);
        matrix.convert(FormatId::Csr).unwrap();
        let before = matrix.clone();

        let err = matrix.convert(FormatId::Dia).unwrap_err();
        assert!(matches!(err, SparseError::NotSquare { .. }));
        assert_eq!(matrix, before);
    }
}
