//! Tuner error kinds.

use thiserror::Error;

pub type TunerResult<T> = std::result::Result<T, TunerError>;

#[derive(Error, Debug)]
pub enum TunerError {
    /// The call is not valid for the tuner's current position.
    #[error("tuner is in an inconsistent state: {0}")]
    Inconsistent(&'static str),

    /// Every candidate state failed, so none can be elected.
    #[error("no state produced a finite timing")]
    NoViableState,

    #[error("failed to write tuner report")]
    Io(#[from] std::io::Error),
}
