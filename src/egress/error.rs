//! Egress pool error types.

use thiserror::Error;

/// Failure releasing an egress pool.
///
/// These are collected during shutdown and logged; they never abort the
/// release of the remaining pools.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EgressPoolCloseError {
    /// The pool had already been closed.
    #[error("egress pool '{pool}' is already closed")]
    AlreadyClosed {
        /// Name of the pool.
        pool: String,
    },

    /// The pool failed to release its resources.
    #[error("failed to release egress pool '{pool}': {message}")]
    Release {
        /// Name of the pool.
        pool: String,
        /// Description of the failure.
        message: String,
    },
}

impl EgressPoolCloseError {
    /// Name of the pool the error refers to.
    pub fn pool(&self) -> &str {
        match self {
            EgressPoolCloseError::AlreadyClosed { pool } => pool,
            EgressPoolCloseError::Release { pool, .. } => pool,
        }
    }
}
