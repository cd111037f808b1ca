//! formtune command line front end.

pub mod cli;
pub mod session;

pub use cli::*;
pub use session::*;
