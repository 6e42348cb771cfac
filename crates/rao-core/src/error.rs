//! Unified error types for the RAO workspace
//!
//! [`RaoError`] covers every hard failure the optimiser can raise. Recoverable
//! situations (a failed sensitivity computation on one leaf, a solver that
//! stops early) are reported through statuses instead and never reach this
//! type; what remains are contract violations and configuration problems.
//!
//! # Example
//!
//! ```ignore
//! use rao_core::{RaoError, RaoResult};
//!
//! fn check_depth(depth: usize) -> RaoResult<()> {
//!     if depth == 0 {
//!         return Err(RaoError::Config("max depth must be positive".into()));
//!     }
//!     Ok(())
//! }
//! ```

use thiserror::Error;

/// Unified error type for all RAO operations.
#[derive(Error, Debug)]
pub enum RaoError {
    /// I/O errors (configuration files, exports)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Parsing/deserialization errors
    #[error("Parse error: {0}")]
    Parse(String),

    /// Data validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Solver/algorithm errors
    #[error("Solver error: {0}")]
    Solver(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Network model errors
    #[error("Network error: {0}")]
    Network(String),

    /// An operation was called on an object in the wrong lifecycle state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// A network action could not be applied on a network
    #[error("Could not apply network action '{0}'")]
    ActionApplication(String),

    /// Generic errors (for wrapping external errors)
    #[error("{0}")]
    Other(String),
}

/// Convenience type alias for Results using RaoError.
pub type RaoResult<T> = Result<T, RaoError>;

impl From<anyhow::Error> for RaoError {
    fn from(err: anyhow::Error) -> Self {
        RaoError::Other(err.to_string())
    }
}

impl From<String> for RaoError {
    fn from(s: String) -> Self {
        RaoError::Other(s)
    }
}

impl From<&str> for RaoError {
    fn from(s: &str) -> Self {
        RaoError::Other(s.to_string())
    }
}

impl From<serde_json::Error> for RaoError {
    fn from(err: serde_json::Error) -> Self {
        RaoError::Parse(err.to_string())
    }
}
