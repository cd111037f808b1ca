//! CLI wiring for formtune.

use crate::session::{SessionOptions, TuningSession};
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use formtune_models::{LoadError, LoadOptions, RandomForest};
use formtune_oracle::{
    extract_features_in, Classifier, DecisionTreeTuner, ModelTuner, RandomForestTuner,
    TuneMultiply, FEATURE_NAMES, NUM_FEATURES,
};
use formtune_sparse::{read_matrix_market, DynamicMatrix, ExecutionSpace, SparseError};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "formtune", about = "Pick the fastest sparse storage format for SpMV")]
pub struct Cli {
    /// Log every tuning step and print model metadata.
    #[arg(long, global = true, default_value_t = false)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Args, Debug, Clone)]
pub struct MatrixArgs {
    /// Matrix Market file to tune for.
    #[arg(long)]
    pub matrix: PathBuf,

    /// Run the multiply and feature counting on the rayon pool.
    #[arg(long, default_value_t = false)]
    pub threads: bool,
}

impl MatrixArgs {
    fn space(&self) -> ExecutionSpace {
        if self.threads {
            ExecutionSpace::Threads
        } else {
            ExecutionSpace::Serial
        }
    }

    fn load(&self) -> Result<DynamicMatrix> {
        let coo = read_matrix_market(&self.matrix)
            .with_context(|| format!("failed to load matrix {}", self.matrix.display()))?;
        Ok(DynamicMatrix::from(coo))
    }
}

#[derive(Args, Debug, Clone)]
pub struct ModelArgs {
    /// Models are in the text format instead of binary.
    #[arg(long, default_value_t = false)]
    pub text: bool,

    /// Models carry no feature-name block.
    #[arg(long, default_value_t = false)]
    pub no_feature_names: bool,
}

impl ModelArgs {
    pub fn load_options(&self) -> LoadOptions {
        let options = if self.text {
            LoadOptions::text()
        } else {
            LoadOptions::binary()
        };
        options.with_feature_names(!self.no_feature_names)
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Time SpMV in every storage format and keep the fastest.
    RunFirst {
        #[command(flatten)]
        matrix: MatrixArgs,
        #[arg(long, default_value_t = 10)]
        repetitions: usize,
        #[arg(long)]
        cache: Option<PathBuf>,
        #[arg(long, default_value_t = false)]
        clear_cache: bool,
        /// Write the timing report as JSON.
        #[arg(long)]
        report: Option<PathBuf>,
    },
    /// Predict the format with a decision tree.
    DecisionTree {
        #[command(flatten)]
        matrix: MatrixArgs,
        #[arg(long)]
        model: PathBuf,
        #[command(flatten)]
        model_args: ModelArgs,
    },
    /// Predict the format with a random forest, from one combined file or a
    /// directory holding metadata plus one file per estimator.
    RandomForest {
        #[command(flatten)]
        matrix: MatrixArgs,
        #[arg(long, conflicts_with = "model_dir", required_unless_present = "model_dir")]
        model: Option<PathBuf>,
        #[arg(long)]
        model_dir: Option<PathBuf>,
        #[command(flatten)]
        model_args: ModelArgs,
    },
    /// Print the structural feature vector as JSON.
    Features {
        #[command(flatten)]
        matrix: MatrixArgs,
    },
}

#[derive(Serialize)]
struct FeatureReport<'a> {
    matrix: &'a Path,
    names: [&'static str; NUM_FEATURES],
    values: &'a [f64],
}

pub fn run_cli(cli: Cli) -> Result<()> {
    let Cli { verbose, command } = cli;
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { "info" }));
    // A subscriber may already be installed when embedded or under test.
    let _ = tracing_subscriber::fmt::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();

    match command {
        Command::RunFirst {
            matrix,
            repetitions,
            cache,
            clear_cache,
            report,
        } => {
            let options = SessionOptions {
                tuning_cache: cache,
                clear_tuning_cache: clear_cache,
                repetitions,
                space: matrix.space(),
                verbose,
            };
            let data = matrix.load()?;
            let mut session = TuningSession::new(options)?;
            let outcome = session.run_first(&data)?;
            print!("{}", outcome.summary);
            info!(
                state = outcome.state,
                format = ?outcome.format(),
                cached = outcome.from_cache,
                "run-first selection"
            );

            if let (Some(path), Some(report)) = (report, &outcome.report) {
                fs::write(&path, serde_json::to_string_pretty(report)?)
                    .with_context(|| format!("failed to write report {}", path.display()))?;
            }
            session.shutdown()?;
        }
        Command::DecisionTree {
            matrix,
            model,
            model_args,
        } => {
            let data = matrix.load()?;
            let mut tuner = DecisionTreeTuner::load(&model, model_args.load_options(), verbose)?;
            predict(&data, matrix.space(), &mut tuner)?;
        }
        Command::RandomForest {
            matrix,
            model,
            model_dir,
            model_args,
        } => {
            let data = matrix.load()?;
            let options = model_args.load_options();
            let forest = match (model, model_dir) {
                (Some(path), _) => RandomForest::load(&path, options)?,
                (None, Some(dir)) => RandomForest::load_dir(&dir, options)?,
                (None, None) => anyhow::bail!("either --model or --model-dir is required"),
            };
            let mut tuner = RandomForestTuner::new(forest, verbose);
            predict(&data, matrix.space(), &mut tuner)?;
        }
        Command::Features { matrix } => {
            let data = matrix.load()?;
            let features = extract_features_in(&data, matrix.space());
            let report = FeatureReport {
                matrix: &matrix.matrix,
                names: FEATURE_NAMES,
                values: features.as_slice(),
            };
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }
    Ok(())
}

fn predict<M: Classifier>(
    data: &DynamicMatrix,
    space: ExecutionSpace,
    tuner: &mut ModelTuner<M>,
) -> Result<()> {
    let state = tuner.tune_multiply(data, space)?;
    let mut out = std::io::stdout().lock();
    tuner.print(&mut out)?;
    info!(state, kind = M::KIND, "model selection");
    Ok(())
}

/// Process exit status for a failed run: 2 when an input could not be
/// loaded, 1 otherwise.
pub fn exit_status(err: &anyhow::Error) -> u8 {
    let load_failure = err.chain().any(|cause| {
        cause.is::<LoadError>()
            || matches!(
                cause.downcast_ref::<SparseError>(),
                Some(SparseError::Io { .. } | SparseError::MatrixMarket { .. })
            )
    });
    if load_failure {
        2
    } else {
        1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_random_forest_directory_flags() {
        let cli = Cli::try_parse_from([
            "formtune",
            "--verbose",
            "random-forest",
            "--matrix",
            "a.mtx",
            "--model-dir",
            "forest",
            "--text",
            "--no-feature-names",
        ])
        .unwrap();
        assert!(cli.verbose);
        match cli.command {
            Command::RandomForest {
                model,
                model_dir,
                model_args,
                ..
            } => {
                assert!(model.is_none());
                assert_eq!(model_dir, Some(PathBuf::from("forest")));
                assert_eq!(
                    model_args.load_options(),
                    LoadOptions::text().with_feature_names(false)
                );
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn random_forest_needs_a_model_source() {
        assert!(Cli::try_parse_from(["formtune", "random-forest", "--matrix", "a.mtx"]).is_err());
        assert!(Cli::try_parse_from([
            "formtune",
            "random-forest",
            "--matrix",
            "a.mtx",
            "--model",
            "f.bin",
            "--model-dir",
            "forest",
        ])
        .is_err());
    }

    #[test]
    fn load_failures_exit_with_two() {
        let missing = std::env::temp_dir().join("formtune-cli-missing.mtx");
        let cli = Cli::try_parse_from([
            "formtune",
            "features",
            "--matrix",
            missing.to_str().unwrap(),
        ])
        .unwrap();
        let err = run_cli(cli).unwrap_err();
        assert_eq!(exit_status(&err), 2);

        let other = anyhow::anyhow!("tuning failed");
        assert_eq!(exit_status(&other), 1);
    }
}
