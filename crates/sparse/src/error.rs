//! Error types for sparse containers.

use crate::format::FormatId;
use std::path::PathBuf;
use thiserror::Error;

pub type SparseResult<T> = std::result::Result<T, SparseError>;

#[derive(Error, Debug)]
pub enum SparseError {
    /// The target format is only defined for square matrices.
    #[error("{format} requires a square matrix, got {rows}x{cols}")]
    NotSquare {
        format: FormatId,
        rows: usize,
        cols: usize,
    },

    /// Diagonal storage would pad far beyond the stored non-zeros.
    #[error("{diagonals} diagonals over {rows} rows exceed the fill limit for {nnz} non-zeros")]
    TooManyDiagonals {
        diagonals: usize,
        rows: usize,
        nnz: usize,
    },

    #[error("entry ({row}, {col}) out of bounds for a {rows}x{cols} matrix")]
    IndexOutOfBounds {
        row: usize,
        col: usize,
        rows: usize,
        cols: usize,
    },

    #[error("dimension mismatch: {0}")]
    DimensionMismatch(String),

    #[error("unknown format id {0}")]
    UnknownFormat(usize),

    #[error("matrix market line {line}: {reason}")]
    MatrixMarket { line: usize, reason: String },

    #[error("failed to read {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
