//! Tuning session: options, the on-disk selection cache and the run-first
//! flow the CLI drives.

use anyhow::{Context, Result};
use formtune_autotune::{RunFirstReport, RunFirstTuner, TunedSelection, TuningCache};
use formtune_oracle::{extract_features_in, FeatureVector, TuneMultiply};
use formtune_sparse::{DynamicMatrix, ExecutionSpace, FormatId};
use serde::Serialize;
use std::fs;
use std::path::PathBuf;
use tracing::{info, warn};

const RUN_FIRST: &str = "run-first";

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub tuning_cache: Option<PathBuf>,
    pub clear_tuning_cache: bool,
    pub repetitions: usize,
    pub space: ExecutionSpace,
    pub verbose: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            tuning_cache: None,
            clear_tuning_cache: false,
            repetitions: 10,
            space: ExecutionSpace::Serial,
            verbose: false,
        }
    }
}

/// Cache key: everything that can change which format wins.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatrixSignature {
    pub rows: usize,
    pub cols: usize,
    pub nnz: usize,
    pub features: FeatureVector,
    /// FNV-1a digest of the row-major `(row, col)` pattern.
    pub pattern: u64,
    pub space: ExecutionSpace,
    pub repetitions: usize,
}

impl MatrixSignature {
    pub fn new(matrix: &DynamicMatrix, space: ExecutionSpace, repetitions: usize) -> Self {
        Self {
            rows: matrix.nrows(),
            cols: matrix.ncols(),
            nnz: matrix.nnz(),
            features: extract_features_in(matrix, space),
            pattern: pattern_digest(matrix),
            space,
            repetitions,
        }
    }
}

fn pattern_digest(matrix: &DynamicMatrix) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0100_0000_01b3;
    let coo = matrix.to_coo();
    let mut hash = OFFSET;
    for (&row, &col) in coo.row_indices().iter().zip(coo.col_indices()) {
        for byte in (row as u64).to_le_bytes().into_iter().chain((col as u64).to_le_bytes()) {
            hash = (hash ^ u64::from(byte)).wrapping_mul(PRIME);
        }
    }
    hash
}

#[derive(Debug, Clone)]
pub struct RunFirstOutcome {
    pub state: usize,
    pub from_cache: bool,
    /// Present when the tuner actually ran.
    pub report: Option<RunFirstReport>,
    pub summary: String,
}

impl RunFirstOutcome {
    pub fn format(&self) -> Option<FormatId> {
        FormatId::try_from(self.state).ok()
    }
}

pub struct TuningSession {
    options: SessionOptions,
    cache: TuningCache,
}

impl TuningSession {
    pub fn new(options: SessionOptions) -> Result<Self> {
        if let Some(path) = &options.tuning_cache {
            if options.clear_tuning_cache && path.exists() {
                fs::remove_file(path)?;
            }
        }

        let cache = if let Some(path) = &options.tuning_cache {
            TuningCache::load_from_file(path)?
        } else {
            TuningCache::new()
        };
        Ok(Self { options, cache })
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    /// Times every storage format on `matrix`, or reuses a cached selection
    /// for the same signature when `matrix` still converts to it.
    pub fn run_first(&mut self, matrix: &DynamicMatrix) -> Result<RunFirstOutcome> {
        let mut tuner =
            RunFirstTuner::new(FormatId::COUNT, self.options.repetitions, self.options.verbose);
        let signature =
            MatrixSignature::new(matrix, self.options.space, tuner.repetitions_per_state());
        let cached = self
            .cache
            .get(&signature)
            .filter(|hit| hit.tuner == RUN_FIRST)
            .map(|hit| hit.state);
        if let Some(state) = cached {
            if converts_to(matrix, state) {
                info!(state, "reusing cached run-first selection");
                return Ok(RunFirstOutcome {
                    state,
                    from_cache: true,
                    report: None,
                    summary: format!("Optimum State ID: {state} (cached)\n"),
                });
            }
            warn!(state, "cached selection does not convert, re-tuning");
        }

        let state = tuner
            .tune_multiply(matrix, self.options.space)
            .context("run-first tuning failed")?;
        let report = tuner.report()?;

        let mut summary = Vec::new();
        tuner.print(&mut summary)?;

        self.cache.insert(
            &signature,
            TunedSelection {
                tuner: RUN_FIRST.to_string(),
                state,
                average_seconds: report.states.get(state).and_then(|s| s.avg_s),
            },
        );
        Ok(RunFirstOutcome {
            state,
            from_cache: false,
            report: Some(report),
            summary: String::from_utf8_lossy(&summary).into_owned(),
        })
    }

    pub fn cache(&self) -> &TuningCache {
        &self.cache
    }

    /// Persists the cache when one is configured.
    pub fn shutdown(&mut self) -> Result<()> {
        if let Some(path) = &self.options.tuning_cache {
            self.cache.save_to_file(path)?;
            info!(path = %path.display(), entries = self.cache.len(), "saved tuning cache");
        }
        Ok(())
    }
}

fn converts_to(matrix: &DynamicMatrix, state: usize) -> bool {
    let Ok(format) = FormatId::try_from(state) else {
        return false;
    };
    if matrix.format() == format {
        return true;
    }
    matrix.clone().convert(format).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use formtune_sparse::CooMatrix;

    fn tridiagonal(rows: usize) -> DynamicMatrix {
        let mut triplets = Vec::new();
        for i in 0..rows {
            triplets.push((i, i, 4.0));
            if i > 0 {
                triplets.push((i, i - 1, -1.0));
            }
        }
        CooMatrix::from_triplets(rows, rows, &triplets).unwrap().into()
    }

    #[test]
    fn second_run_hits_the_cache() -> Result<()> {
        let path = std::env::temp_dir().join(format!("formtune-session-{}.json", std::process::id()));
        let options = SessionOptions {
            tuning_cache: Some(path.clone()),
            clear_tuning_cache: true,
            repetitions: 2,
            ..SessionOptions::default()
        };
        let matrix = tridiagonal(32);

        let mut session = TuningSession::new(options.clone())?;
        let first = session.run_first(&matrix)?;
        assert!(!first.from_cache);
        assert!(first.report.is_some());
        assert!(first.summary.contains("Optimum State ID"));
        session.shutdown()?;

        let mut reopened = TuningSession::new(SessionOptions {
            clear_tuning_cache: false,
            ..options
        })?;
        let second = reopened.run_first(&matrix)?;
        fs::remove_file(&path)?;
        assert!(second.from_cache);
        assert_eq!(second.state, first.state);
        assert!(second.format().is_some());
        Ok(())
    }

    fn identity(n: usize) -> DynamicMatrix {
        let triplets: Vec<_> = (0..n).map(|i| (i, i, 1.0)).collect();
        CooMatrix::from_triplets(n, n, &triplets).unwrap().into()
    }

    fn anti_diagonal(n: usize) -> DynamicMatrix {
        let triplets: Vec<_> = (0..n).map(|i| (i, n - 1 - i, 1.0)).collect();
        CooMatrix::from_triplets(n, n, &triplets).unwrap().into()
    }

    #[test]
    fn same_shape_different_pattern_is_tuned_again() -> Result<()> {
        let mut session = TuningSession::new(SessionOptions {
            repetitions: 2,
            ..SessionOptions::default()
        })?;
        let (eye, flipped) = (identity(64), anti_diagonal(64));
        assert_eq!((eye.nrows(), eye.nnz()), (flipped.nrows(), flipped.nnz()));

        let first = session.run_first(&eye)?;
        assert!(!first.from_cache);
        let second = session.run_first(&flipped)?;
        assert!(!second.from_cache);
        assert_ne!(second.format(), Some(FormatId::Dia));
        assert_eq!(session.cache().len(), 2);

        assert!(session.run_first(&flipped)?.from_cache);
        Ok(())
    }

    #[test]
    fn cached_state_that_no_longer_converts_is_retuned() -> Result<()> {
        let flipped = anti_diagonal(64);
        let mut session = TuningSession::new(SessionOptions {
            repetitions: 1,
            ..SessionOptions::default()
        })?;
        let signature = MatrixSignature::new(&flipped, ExecutionSpace::Serial, 1);
        session.cache.insert(
            &signature,
            TunedSelection {
                tuner: RUN_FIRST.to_string(),
                state: FormatId::Dia.index(),
                average_seconds: None,
            },
        );

        let outcome = session.run_first(&flipped)?;
        assert!(!outcome.from_cache);
        assert_ne!(outcome.format(), Some(FormatId::Dia));
        Ok(())
    }

    #[test]
    fn repetitions_below_one_share_a_key_with_one() -> Result<()> {
        let matrix = tridiagonal(16);
        let mut session = TuningSession::new(SessionOptions {
            repetitions: 1,
            ..SessionOptions::default()
        })?;
        assert!(!session.run_first(&matrix)?.from_cache);

        session.options.repetitions = 0;
        assert!(session.run_first(&matrix)?.from_cache);
        Ok(())
    }
}
