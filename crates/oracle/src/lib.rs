//! Format selection for sparse matrices: structural features, classifier
//! backed tuners and the `tune_multiply` entry points shared by every tuner.

pub mod features;
pub mod ml;
pub mod multiply;

pub use features::*;
pub use ml::*;
pub use multiply::*;
