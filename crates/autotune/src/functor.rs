//! Run functor protocol and the generic run-first tuning loop.

use crate::tuner::RunFirstTuner;
use anyhow::{Context, Result};
use std::time::Instant;
use tracing::{debug, info};

/// Duration recorded for a state whose transition failed.
pub const FAILED_RUN_SECONDS: f64 = f64::INFINITY;

/// The unit of work a [`RunFirstTuner`] times for each candidate state.
///
/// `Device` is the copy that gets executed, `Host` the mirror that gets
/// converted into each candidate state before being copied back to `Device`.
pub trait RunFirstFunctor {
    type Data: ?Sized;
    type Device;
    type Host;

    fn clone_data(&mut self, data: &Self::Data) -> Result<Self::Device>;

    fn clone_host(&mut self, device: &Self::Device) -> Result<Self::Host>;

    /// Brings `device` into the tuner's current state.
    ///
    /// Implementations convert only when `current_state` differs from
    /// `tuner.current_state()` and update it on success. On failure they return
    /// `false` and leave `current_state` alone.
    fn state_transition(
        &mut self,
        tuner: &RunFirstTuner,
        device: &mut Self::Device,
        host: &mut Self::Host,
        current_state: &mut Option<usize>,
    ) -> bool;

    fn run(&mut self, device: &Self::Device) -> Result<()>;

    fn postprocess_runtime(&self, seconds: f64) -> f64 {
        seconds
    }
}

/// Drives `tuner` to completion over `data`.
///
/// Each cell times `tuner.repetitions_per_state()` back-to-back runs. A failed
/// state transition records [`FAILED_RUN_SECONDS`] instead of running.
pub fn tune<F>(data: &F::Data, functor: &mut F, tuner: &mut RunFirstTuner) -> Result<()>
where
    F: RunFirstFunctor,
{
    let mut device = functor
        .clone_data(data)
        .context("failed to clone tuning data")?;
    let mut host = functor
        .clone_host(&device)
        .context("failed to mirror tuning data")?;

    let mut current_state = None;
    while !tuner.is_finished() {
        let seconds = if functor.state_transition(tuner, &mut device, &mut host, &mut current_state)
        {
            let start = Instant::now();
            for _ in 0..tuner.repetitions_per_state() {
                functor.run(&device).with_context(|| {
                    format!("run failed in state {}", tuner.current_state())
                })?;
            }
            start.elapsed().as_secs_f64()
        } else {
            debug!(
                state = tuner.current_state(),
                "state transition failed, recording worst-case timing"
            );
            FAILED_RUN_SECONDS
        };

        tuner.register_run(functor.postprocess_runtime(seconds))?;
        tuner.advance();
    }

    info!(best_state = ?tuner.best_state_id().ok(), "run-first tuning complete");
    Ok(())
}
