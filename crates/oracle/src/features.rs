//! Structural feature vector describing a sparse matrix.

use anyhow::Result;
use formtune_sparse::{DynamicMatrix, ExecutionSpace};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

pub const NUM_FEATURES: usize = 10;

/// Slot names, in slot order.
pub const FEATURE_NAMES: [&str; NUM_FEATURES] = [
    "rows",
    "cols",
    "nnz",
    "avg_nnz_per_row",
    "density",
    "max_nnz_per_row",
    "min_nnz_per_row",
    "std_nnz_per_row",
    "diagonals",
    "true_diagonals",
];

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector(pub [f64; NUM_FEATURES]);

impl FeatureVector {
    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    pub fn named(&self) -> impl Iterator<Item = (&'static str, f64)> + '_ {
        FEATURE_NAMES.iter().copied().zip(self.0.iter().copied())
    }
}

/// A diagonal is "true" when it holds more than `rows / 4` non-zeros.
pub fn true_diagonal_threshold(rows: usize) -> usize {
    rows / 4
}

pub fn extract_features(matrix: &DynamicMatrix) -> FeatureVector {
    extract_features_in(matrix, ExecutionSpace::Serial)
}

/// Same as [`extract_features`], with the count reductions run in `space`.
/// Integer reductions only, so the result does not depend on `space`.
pub fn extract_features_in(matrix: &DynamicMatrix, space: ExecutionSpace) -> FeatureVector {
    let rows = matrix.nrows();
    let cols = matrix.ncols();
    let nnz = matrix.nnz();
    let per_row = matrix.nnz_per_row();
    let per_diagonal = matrix.nnz_per_diagonal();
    let threshold = true_diagonal_threshold(rows);

    let counts = match space {
        ExecutionSpace::Serial => PatternCounts {
            max_row: per_row.iter().copied().max().unwrap_or(0),
            min_row: per_row.iter().copied().min().unwrap_or(0),
            diagonals: per_diagonal.iter().filter(|&&c| c > 0).count(),
            true_diagonals: per_diagonal.iter().filter(|&&c| c > threshold).count(),
        },
        ExecutionSpace::Threads => PatternCounts {
            max_row: per_row.par_iter().copied().max().unwrap_or(0),
            min_row: per_row.par_iter().copied().min().unwrap_or(0),
            diagonals: per_diagonal.par_iter().filter(|&&c| c > 0).count(),
            true_diagonals: per_diagonal.par_iter().filter(|&&c| c > threshold).count(),
        },
    };

    let avg = if rows == 0 { 0.0 } else { nnz as f64 / rows as f64 };
    let density = if rows == 0 || cols == 0 {
        0.0
    } else {
        nnz as f64 / (rows as f64 * cols as f64)
    };
    let std = if rows == 0 {
        0.0
    } else {
        let squares: f64 = per_row
            .iter()
            .map(|&count| {
                let delta = count as f64 - avg;
                delta * delta
            })
            .sum();
        (squares / rows as f64).sqrt()
    };

    FeatureVector([
        rows as f64,
        cols as f64,
        nnz as f64,
        avg,
        density,
        counts.max_row as f64,
        counts.min_row as f64,
        std,
        counts.diagonals as f64,
        counts.true_diagonals as f64,
    ])
}

struct PatternCounts {
    max_row: usize,
    min_row: usize,
    diagonals: usize,
    true_diagonals: usize,
}

/// Turns caller data into the sample an ML tuner classifies.
pub trait FeatureExtractor {
    type Data: ?Sized;

    fn extract(&mut self, data: &Self::Data) -> Result<Vec<f64>>;
}

/// [`extract_features_in`] as a [`FeatureExtractor`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SparseFeatures {
    pub space: ExecutionSpace,
}

impl FeatureExtractor for SparseFeatures {
    type Data = DynamicMatrix;

    fn extract(&mut self, data: &DynamicMatrix) -> Result<Vec<f64>> {
        Ok(extract_features_in(data, self.space).0.to_vec())
    }
}
