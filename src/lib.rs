//! formtune: runtime storage format selection for sparse matrices.
//!
//! The workspace is split the same way the tuning flow is:
//!
//! - [`sparse`]: the sparse containers the tuner converts and multiplies.
//! - [`autotune`]: timing statistics, the run-first state machine and the
//!   run functor protocol.
//! - [`models`]: pre-trained decision trees and random forests.
//! - [`oracle`]: feature extraction, ML tuners and the SpMV entry points.

pub use formtune_autotune as autotune;
pub use formtune_models as models;
pub use formtune_oracle as oracle;
pub use formtune_sparse as sparse;
