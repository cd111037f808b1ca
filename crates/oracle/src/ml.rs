//! Tuners that pick a state with a single classifier inference.

use crate::features::FeatureExtractor;
use anyhow::{Context, Result};
use formtune_autotune::{TunerError, TunerResult};
use formtune_models::{DecisionTree, LoadOptions, LoadResult, ModelError, RandomForest};
use serde::Serialize;
use std::io::Write;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info};

/// Seconds spent in each phase of the last model-driven tuning.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct TuneTimings {
    pub feature_extraction: f64,
    pub inference: f64,
}

/// A model the ML tuners can classify with.
pub trait Classifier {
    /// Human readable model kind for reports.
    const KIND: &'static str;

    fn load(path: &Path, options: LoadOptions) -> LoadResult<Self>
    where
        Self: Sized;

    fn classify(&self, sample: &[f64]) -> Result<usize, ModelError>;

    fn source(&self) -> Option<&Path>;

    fn write_summary(&self, writer: &mut dyn Write) -> std::io::Result<()>;
}

impl Classifier for DecisionTree {
    const KIND: &'static str = "DecisionTree";

    fn load(path: &Path, options: LoadOptions) -> LoadResult<Self> {
        DecisionTree::load(path, options)
    }

    fn classify(&self, sample: &[f64]) -> Result<usize, ModelError> {
        self.evaluate(sample)
    }

    fn source(&self) -> Option<&Path> {
        DecisionTree::source(self)
    }

    fn write_summary(&self, writer: &mut dyn Write) -> std::io::Result<()> {
        DecisionTree::write_summary(self, writer)
    }
}

impl Classifier for RandomForest {
    const KIND: &'static str = "RandomForest";

    fn load(path: &Path, options: LoadOptions) -> LoadResult<Self> {
        RandomForest::load(path, options)
    }

    fn classify(&self, sample: &[f64]) -> Result<usize, ModelError> {
        self.evaluate(sample)
    }

    fn source(&self) -> Option<&Path> {
        RandomForest::source(self)
    }

    fn write_summary(&self, writer: &mut dyn Write) -> std::io::Result<()> {
        RandomForest::write_summary(self, writer)
    }
}

/// Single-shot tuner protocol: one `run` per sample, no state iteration.
pub trait MlTuner {
    fn run(&mut self, sample: &[f64]) -> Result<usize, ModelError>;

    /// Clears the elected state.
    fn reset(&mut self);

    fn state_id(&self) -> Option<usize>;

    fn timings(&self) -> TuneTimings;

    fn record_timings(&mut self, timings: TuneTimings);
}

/// Tuner electing the state a [`Classifier`] predicts.
#[derive(Debug, Clone)]
pub struct ModelTuner<M> {
    model: M,
    state_id: Option<usize>,
    timings: TuneTimings,
    verbose: bool,
}

pub type DecisionTreeTuner = ModelTuner<DecisionTree>;
pub type RandomForestTuner = ModelTuner<RandomForest>;

impl<M: Classifier> ModelTuner<M> {
    pub fn new(model: M, verbose: bool) -> Self {
        Self {
            model,
            state_id: None,
            timings: TuneTimings::default(),
            verbose,
        }
    }

    pub fn load(path: impl AsRef<Path>, options: LoadOptions, verbose: bool) -> LoadResult<Self> {
        Ok(Self::new(M::load(path.as_ref(), options)?, verbose))
    }

    /// Swaps in the model at `path` and resets. The current model is kept if
    /// loading fails.
    pub fn reload(&mut self, path: impl AsRef<Path>, options: LoadOptions) -> LoadResult<()> {
        self.model = M::load(path.as_ref(), options)?;
        self.reset();
        self.timings = TuneTimings::default();
        Ok(())
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn is_verbose(&self) -> bool {
        self.verbose
    }

    pub fn set_verbose(&mut self, verbose: bool) {
        self.verbose = verbose;
    }

    /// Writes the model source, its metadata when verbose, the phase timings
    /// and the elected state.
    pub fn print<W: Write>(&self, out: &mut W) -> TunerResult<()> {
        let state = self
            .state_id
            .ok_or(TunerError::Inconsistent("no state elected yet; run the tuner first"))?;

        let source = self
            .model
            .source()
            .map_or_else(|| "<memory>".to_string(), |path| path.display().to_string());
        writeln!(out, "Tuner executed using a {} loaded from: {source}", M::KIND)?;
        writeln!(out)?;
        if self.verbose {
            writeln!(out, "Metadata:")?;
            writeln!(out, "---------")?;
            self.model.write_summary(out)?;
            writeln!(out)?;
        }
        writeln!(out, "Tuner timing statistics:")?;
        writeln!(out, "------------------------")?;
        writeln!(
            out,
            "{:>20}{:.6e} (s)",
            "Feature Extraction: ", self.timings.feature_extraction
        )?;
        writeln!(out, "{:>20}{:.6e} (s)", "Inference: ", self.timings.inference)?;
        writeln!(out)?;
        writeln!(out, "Optimum State ID: {state}")?;
        Ok(())
    }
}

impl<M: Classifier> MlTuner for ModelTuner<M> {
    fn run(&mut self, sample: &[f64]) -> Result<usize, ModelError> {
        let state = self.model.classify(sample)?;
        if self.verbose {
            debug!(kind = M::KIND, state, "model inference");
        }
        self.state_id = Some(state);
        Ok(state)
    }

    fn reset(&mut self) {
        self.state_id = None;
    }

    fn state_id(&self) -> Option<usize> {
        self.state_id
    }

    fn timings(&self) -> TuneTimings {
        self.timings
    }

    fn record_timings(&mut self, timings: TuneTimings) {
        self.timings = timings;
    }
}

/// Extracts features from `data`, classifies them and records how long each
/// phase took.
pub fn tune_ml<E, T>(data: &E::Data, extractor: &mut E, tuner: &mut T) -> Result<usize>
where
    E: FeatureExtractor,
    T: MlTuner,
{
    let start = Instant::now();
    let sample = extractor
        .extract(data)
        .context("feature extraction failed")?;
    let feature_extraction = start.elapsed().as_secs_f64();

    let start = Instant::now();
    let state = tuner.run(&sample).context("model inference failed")?;
    let inference = start.elapsed().as_secs_f64();

    tuner.record_timings(TuneTimings {
        feature_extraction,
        inference,
    });
    info!(state, feature_extraction, inference, "model tuning complete");
    Ok(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use formtune_models::{TreeParts, LEAF, NO_CHILD};
    use ndarray::array;

    /// Splits on slot 0 (rows) at 100: small matrices map to label 1 (CSR),
    /// large ones to label 2 (DIA).
    fn rows_stump() -> DecisionTree {
        DecisionTree::new(TreeParts {
            num_features: 1,
            max_depth: 1,
            classes: vec![1, 2],
            feature_names: vec!["rows".into()],
            left_child: vec![1, NO_CHILD, NO_CHILD],
            right_child: vec![2, NO_CHILD, NO_CHILD],
            threshold: vec![100.0, LEAF, LEAF],
            split_feature: vec![0, -2, -2],
            values: array![[0.0, 0.0], [5.0, 1.0], [1.0, 5.0]],
        })
        .unwrap()
    }

    struct Fixed(Vec<f64>);

    impl FeatureExtractor for Fixed {
        type Data = ();

        fn extract(&mut self, _: &()) -> Result<Vec<f64>> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn run_is_single_shot_and_reset_clears() {
        let mut tuner = DecisionTreeTuner::new(rows_stump(), false);
        assert_eq!(tuner.state_id(), None);
        assert_eq!(tuner.run(&[10.0]).unwrap(), 1);
        assert_eq!(tuner.state_id(), Some(1));
        assert_eq!(tuner.run(&[1000.0]).unwrap(), 2);
        tuner.reset();
        assert_eq!(tuner.state_id(), None);
    }

    #[test]
    fn tune_ml_records_both_phases() {
        let mut tuner = DecisionTreeTuner::new(rows_stump(), false);
        let state = tune_ml(&(), &mut Fixed(vec![500.0]), &mut tuner).unwrap();
        assert_eq!(state, 2);
        let timings = tuner.timings();
        assert!(timings.feature_extraction >= 0.0);
        assert!(timings.inference >= 0.0);
    }

    #[test]
    fn tune_ml_surfaces_short_samples() {
        let mut tuner = DecisionTreeTuner::new(rows_stump(), false);
        let err = tune_ml(&(), &mut Fixed(Vec::new()), &mut tuner).unwrap_err();
        assert!(err.downcast_ref::<ModelError>().is_some());
        assert_eq!(tuner.state_id(), None);
    }

    #[test]
    fn print_requires_an_elected_state() {
        let mut tuner = DecisionTreeTuner::new(rows_stump(), true);
        let mut out = Vec::new();
        assert!(matches!(
            tuner.print(&mut out),
            Err(TunerError::Inconsistent(_))
        ));

        tuner.run(&[3.0]).unwrap();
        tuner.print(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("DecisionTree loaded from: <memory>"));
        assert!(text.contains("Number of Nodes: 3"));
        assert!(text.contains("Optimum State ID: 1"));
    }

    #[test]
    fn forest_tuner_votes() {
        let forest = RandomForest::new(
            1,
            1,
            vec![1, 2],
            Vec::new(),
            vec![rows_stump(), rows_stump(), rows_stump()],
        )
        .unwrap();
        let mut tuner = RandomForestTuner::new(forest, false);
        // Forests report the winning slot.
        assert_eq!(tuner.run(&[1000.0]).unwrap(), 1);
        assert_eq!(tuner.run(&[1.0]).unwrap(), 0);
    }

    #[test]
    fn reload_keeps_model_on_failure() {
        let mut tuner = DecisionTreeTuner::new(rows_stump(), false);
        tuner.run(&[1.0]).unwrap();
        let missing = std::env::temp_dir().join("formtune-missing-model.txt");
        assert!(tuner.reload(&missing, LoadOptions::text()).is_err());
        assert_eq!(tuner.state_id(), Some(1));
        assert_eq!(tuner.model().node_count(), 3);
    }
}
