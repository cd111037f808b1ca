//! Model loading and evaluation errors.

use std::path::PathBuf;
use thiserror::Error;

pub type LoadResult<T> = std::result::Result<T, LoadError>;

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("failed to read model file {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("line {line}: expected {expected} entries, found {found}")]
    TokenCount {
        line: usize,
        expected: usize,
        found: usize,
    },

    #[error("line {line}: cannot parse '{token}'")]
    Parse { line: usize, token: String },

    #[error("unexpected end of input while reading {what}")]
    UnexpectedEof { what: &'static str },

    /// The model parsed but violates a structural invariant.
    #[error("invalid model: {0}")]
    Invalid(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    #[error("sample has {found} features, model needs {expected}")]
    SampleTooShort { expected: usize, found: usize },

    #[error("descent did not reach a leaf within {nodes} nodes")]
    CycleDetected { nodes: usize },
}
