//! Per-state timing samples and their reductions.

use ndarray::{Array1, Array2, Axis};

/// A `[state x repetition]` matrix of durations in seconds plus per-state
/// min, max and average.
#[derive(Debug, Clone, PartialEq)]
pub struct TimingStatistics {
    samples: Array2<f64>,
    min: Array1<f64>,
    max: Array1<f64>,
    avg: Array1<f64>,
}

impl TimingStatistics {
    /// Value every cell holds after construction or [`TimingStatistics::clear`].
    pub const FILL: f64 = 0.0;

    pub fn new(num_states: usize, repetitions: usize) -> Self {
        Self {
            samples: Array2::from_elem((num_states, repetitions), Self::FILL),
            min: Array1::from_elem(num_states, Self::FILL),
            max: Array1::from_elem(num_states, Self::FILL),
            avg: Array1::from_elem(num_states, Self::FILL),
        }
    }

    pub fn num_states(&self) -> usize {
        self.samples.nrows()
    }

    pub fn repetitions(&self) -> usize {
        self.samples.ncols()
    }

    /// Stores one sample. Returns `false` if the cell does not exist.
    pub fn record(&mut self, state: usize, repetition: usize, seconds: f64) -> bool {
        match self.samples.get_mut((state, repetition)) {
            Some(cell) => {
                *cell = seconds;
                true
            }
            None => false,
        }
    }

    /// Reduces every state row. Only meaningful once every cell was recorded.
    pub fn compute(&mut self) {
        let repetitions = self.repetitions().max(1) as f64;
        for (state, row) in self.samples.axis_iter(Axis(0)).enumerate() {
            self.min[state] = row.iter().copied().fold(f64::INFINITY, f64::min);
            self.max[state] = row.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            self.avg[state] = row.sum() / repetitions;
        }
    }

    /// Lowest finite average; ties keep the lowest state index.
    pub fn best_state(&self) -> Option<usize> {
        let mut best: Option<(usize, f64)> = None;
        for (state, &avg) in self.avg.iter().enumerate() {
            if !avg.is_finite() {
                continue;
            }
            match best {
                Some((_, best_avg)) if avg >= best_avg => {}
                _ => best = Some((state, avg)),
            }
        }
        best.map(|(state, _)| state)
    }

    pub fn clear(&mut self) {
        self.samples.fill(Self::FILL);
        self.min.fill(Self::FILL);
        self.max.fill(Self::FILL);
        self.avg.fill(Self::FILL);
    }

    pub fn samples(&self) -> &Array2<f64> {
        &self.samples
    }

    pub fn min(&self) -> &Array1<f64> {
        &self.min
    }

    pub fn max(&self) -> &Array1<f64> {
        &self.max
    }

    pub fn avg(&self) -> &Array1<f64> {
        &self.avg
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn reduces_each_state_row() {
        let mut stats = TimingStatistics::new(2, 3);
        for (rep, value) in [3.0, 1.0, 2.0].into_iter().enumerate() {
            assert!(stats.record(0, rep, value));
        }
        for (rep, value) in [0.5, 0.25, 0.75].into_iter().enumerate() {
            assert!(stats.record(1, rep, value));
        }
        stats.compute();

        assert_eq!(stats.min().to_vec(), vec![1.0, 0.25]);
        assert_eq!(stats.max().to_vec(), vec![3.0, 0.75]);
        assert_abs_diff_eq!(stats.avg()[0], 2.0, epsilon = 1e-12);
        assert_abs_diff_eq!(stats.avg()[1], 0.5, epsilon = 1e-12);
        assert_eq!(stats.best_state(), Some(1));
    }

    #[test]
    fn ties_keep_lowest_state() {
        let mut stats = TimingStatistics::new(3, 1);
        stats.record(0, 0, 2.0);
        stats.record(1, 0, 1.0);
        stats.record(2, 0, 1.0);
        stats.compute();
        assert_eq!(stats.best_state(), Some(1));
    }

    #[test]
    fn infinite_states_are_never_elected() {
        let mut stats = TimingStatistics::new(3, 2);
        for rep in 0..2 {
            stats.record(0, rep, f64::INFINITY);
            stats.record(1, rep, 4.0);
            stats.record(2, rep, f64::INFINITY);
        }
        stats.compute();
        assert_eq!(stats.best_state(), Some(1));

        let mut failing = TimingStatistics::new(2, 1);
        failing.record(0, 0, f64::INFINITY);
        failing.record(1, 0, f64::INFINITY);
        failing.compute();
        assert_eq!(failing.best_state(), None);
    }

    #[test]
    fn record_outside_the_matrix_is_refused() {
        let mut stats = TimingStatistics::new(2, 2);
        assert!(!stats.record(2, 0, 1.0));
        assert!(!stats.record(0, 2, 1.0));
    }
}
