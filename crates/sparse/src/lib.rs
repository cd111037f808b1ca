//! Sparse matrix containers consumed by the formtune tuners.

pub mod dynamic;
pub mod error;
pub mod format;
pub mod matrix;
pub mod mtx;
pub mod spmv;
pub mod structure;

pub use dynamic::*;
pub use error::*;
pub use format::*;
pub use matrix::*;
pub use mtx::*;
pub use spmv::*;
