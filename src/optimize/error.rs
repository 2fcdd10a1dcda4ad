//! Root finding error types

use thiserror::Error;

/// Errors that can occur while locating the root of a scalar function
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RootError {
    /// Geometric expansion never produced a sign change
    #[error("no sign change found in [{lo}, {hi}] after {expansions} expansions")]
    NoBracket { lo: f64, hi: f64, expansions: usize },

    /// The bracketed solver hit its iteration bound
    #[error("root search did not converge within {iterations} iterations (last estimate {estimate})")]
    NotConverged { iterations: u64, estimate: f64 },

    /// The objective returned NaN or an infinity
    #[error("objective is not finite at x = {x}")]
    NonFinite { x: f64 },

    /// Invalid solver configuration
    #[error("invalid root finder option: {0}")]
    InvalidOption(String),

    /// The underlying solver reported an error
    #[error("solver error: {0}")]
    Solver(String),
}
