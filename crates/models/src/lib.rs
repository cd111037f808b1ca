//! Pre-trained classifiers used to predict the best storage format without
//! timing every candidate.

pub mod error;
pub mod forest;
mod io;
pub mod tree;

pub use error::*;
pub use forest::*;
pub use tree::*;
