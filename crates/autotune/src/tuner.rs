//! Run-first tuner: time every candidate state, elect the fastest.

use crate::error::{TunerError, TunerResult};
use crate::stats::TimingStatistics;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::io::Write;
use tracing::{debug, info};

/// Walks `num_states` candidate states, `repetitions_per_state` timed runs
/// each, state-major. Statistics and the winning state are computed once, on
/// the step that reaches the terminal state, and stay frozen until
/// [`RunFirstTuner::reset`].
///
/// ```
/// use formtune_autotune::RunFirstTuner;
///
/// let mut tuner = RunFirstTuner::new(3, 2, false);
/// while !tuner.is_finished() {
///     let seconds = 1.0 + tuner.current_state() as f64;
///     tuner.register_run(seconds).unwrap();
///     tuner.advance();
/// }
/// assert_eq!(tuner.best_state_id().unwrap(), 0);
/// ```
#[derive(Debug, Clone)]
pub struct RunFirstTuner {
    num_states: usize,
    repetitions: usize,
    current_state: usize,
    current_repetition: usize,
    best_state: Option<usize>,
    stats: TimingStatistics,
    verbose: bool,
}

impl RunFirstTuner {
    pub fn new(num_states: usize, repetitions_per_state: usize, verbose: bool) -> Self {
        let repetitions = repetitions_per_state.max(1);
        if verbose {
            info!(
                states = num_states,
                repetitions, "run-first tuner configured"
            );
        }
        Self {
            num_states,
            repetitions,
            current_state: 0,
            current_repetition: 0,
            best_state: None,
            stats: TimingStatistics::new(num_states, repetitions),
            verbose,
        }
    }

    /// Records the duration (seconds) of the current `(state, repetition)` cell.
    pub fn register_run(&mut self, seconds: f64) -> TunerResult<()> {
        if self.is_finished() {
            return Err(TunerError::Inconsistent(
                "cannot register a run after tuning finished",
            ));
        }
        self.stats
            .record(self.current_state, self.current_repetition, seconds);
        if self.verbose {
            debug!(
                state = self.current_state,
                repetition = self.current_repetition,
                seconds,
                "registered run"
            );
        }
        Ok(())
    }

    /// Steps to the next repetition, rolling over to the next state after the
    /// last one. A finished tuner stays where it is.
    pub fn advance(&mut self) {
        if self.is_finished() {
            return;
        }

        if self.current_repetition + 1 < self.repetitions {
            self.current_repetition += 1;
        } else {
            self.current_state += 1;
            self.current_repetition = 0;
        }

        if self.verbose {
            debug!(
                state = self.current_state,
                repetition = self.current_repetition,
                "tuner step"
            );
        }

        if self.is_finished() {
            self.complete();
        }
    }

    pub fn is_finished(&self) -> bool {
        self.current_state >= self.num_states
    }

    pub fn reset(&mut self) {
        self.current_state = 0;
        self.current_repetition = 0;
        self.best_state = None;
        self.stats.clear();
    }

    /// The elected state.
    ///
    /// Fails with [`TunerError::Inconsistent`] before tuning finished and with
    /// [`TunerError::NoViableState`] when no state produced a finite timing.
    pub fn best_state_id(&self) -> TunerResult<usize> {
        if !self.is_finished() {
            return Err(TunerError::Inconsistent(
                "the best state is only known once tuning finishes",
            ));
        }
        self.best_state.ok_or(TunerError::NoViableState)
    }

    pub fn num_states(&self) -> usize {
        self.num_states
    }

    pub fn repetitions_per_state(&self) -> usize {
        self.repetitions
    }

    pub fn current_state(&self) -> usize {
        self.current_state
    }

    pub fn current_repetition(&self) -> usize {
        self.current_repetition
    }

    pub fn timings(&self) -> &Array2<f64> {
        self.stats.samples()
    }

    pub fn min_timings(&self) -> &Array1<f64> {
        self.stats.min()
    }

    pub fn max_timings(&self) -> &Array1<f64> {
        self.stats.max()
    }

    pub fn avg_timings(&self) -> &Array1<f64> {
        self.stats.avg()
    }

    pub fn statistics(&self) -> &TimingStatistics {
        &self.stats
    }

    pub fn is_verbose(&self) -> bool {
        self.verbose
    }

    pub fn set_verbose(&mut self, verbose: bool) {
        self.verbose = verbose;
    }

    /// Writes the configuration banner before the first step, or the
    /// statistics table once tuning finished.
    pub fn print<W: Write>(&self, out: &mut W) -> TunerResult<()> {
        if self.current_state == 0 && self.current_repetition == 0 {
            writeln!(
                out,
                "Run-first tuner configured for {} states with {} repetitions each",
                self.num_states, self.repetitions
            )?;
            return Ok(());
        }

        if !self.is_finished() {
            return Err(TunerError::Inconsistent(
                "the summary can only be printed once tuning finishes",
            ));
        }

        writeln!(
            out,
            "Tuner executed {} repetitions and optimized for {} states!",
            self.repetitions, self.num_states
        )?;
        writeln!(out)?;
        writeln!(out, "Tuner statistics:")?;
        writeln!(out, "-----------------")?;
        writeln!(
            out,
            "{:>10} {:>14} {:>14} {:>14}",
            "State", "tmin", "tmax", "tavg"
        )?;
        for state in 0..self.num_states {
            writeln!(
                out,
                "{:>10} {:>14.7e} {:>14.7e} {:>14.7e}",
                state,
                self.stats.min()[state],
                self.stats.max()[state],
                self.stats.avg()[state]
            )?;
        }
        match self.best_state {
            Some(state) => writeln!(out, "Optimum State ID: {state}")?,
            None => writeln!(out, "Optimum State ID: none (every state failed)")?,
        }
        Ok(())
    }

    /// Serialisable summary of a finished run.
    pub fn report(&self) -> TunerResult<RunFirstReport> {
        if !self.is_finished() {
            return Err(TunerError::Inconsistent(
                "a report is only available once tuning finishes",
            ));
        }
        let finite = |value: f64| value.is_finite().then_some(value);
        let states = (0..self.num_states)
            .map(|state| StateTiming {
                state,
                min_s: finite(self.stats.min()[state]),
                max_s: finite(self.stats.max()[state]),
                avg_s: finite(self.stats.avg()[state]),
            })
            .collect();
        Ok(RunFirstReport {
            num_states: self.num_states,
            repetitions_per_state: self.repetitions,
            best_state: self.best_state,
            states,
        })
    }

    fn complete(&mut self) {
        self.stats.compute();
        self.best_state = self.stats.best_state();
        info!(
            best_state = ?self.best_state,
            states = self.num_states,
            repetitions = self.repetitions,
            "run-first tuning finished"
        );
    }
}

/// Timings of one state. `None` marks a state whose runs failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateTiming {
    pub state: usize,
    pub min_s: Option<f64>,
    pub max_s: Option<f64>,
    pub avg_s: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunFirstReport {
    pub num_states: usize,
    pub repetitions_per_state: usize,
    pub best_state: Option<usize>,
    pub states: Vec<StateTiming>,
}
