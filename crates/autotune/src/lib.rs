//! Autotuning support for formtune: the run-first state machine, its timing
//! statistics and the functor protocol that drives it.

pub mod cache;
pub mod error;
pub mod functor;
pub mod stats;
pub mod tuner;

pub use cache::*;
pub use error::*;
pub use functor::*;
pub use stats::*;
pub use tuner::*;
