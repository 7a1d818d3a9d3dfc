//! Error types for lazyground
//!
//! Satisfiability outcomes are never errors: `solve` returns `Option` and
//! `solve_all` returns a (possibly empty) list. Errors cover malformed input
//! syntax and constraint combinations that are rejected eagerly at
//! construction time.

use thiserror::Error;

/// Errors produced while parsing clauses or compiling a ground theory.
#[derive(Debug, Clone, Error)]
pub enum SolverError {
    /// Syntax error in the textual clause format.
    #[error("syntax error at position {position}: {message}")]
    Syntax { position: usize, message: String },

    /// An unsupported or contradictory constraint configuration,
    /// e.g. a cardinality literal mixed with other literals in one clause.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl SolverError {
    pub fn config(message: impl Into<String>) -> Self {
        SolverError::Config(message.into())
    }
}

/// Convenience alias used throughout the crate.
pub type SolverResult<T> = Result<T, SolverError>;
