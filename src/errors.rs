//! Error types for the resource pool

use thiserror::Error;

/// Errors surfaced to callers of [`Pool::allocate`](crate::Pool::allocate).
///
/// Resource failures (creation, runtime, close) are contained inside the
/// pool and never show up here.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    #[error("No resource became available within {0:?}")]
    RequestTimeout(std::time::Duration),

    #[error("The pool has been shut down")]
    Closed,
}

pub type PoolResult<T> = Result<T, PoolError>;
