//! Typed error kinds for epodb.
//!
//! Fatal failures carry one of these kinds so callers can match on the
//! class of failure through `eyre::Report::downcast_ref`. Normal
//! control-flow outcomes (a search miss, an empty iteration scope, an
//! exhausted cursor, a transient probe condition) are never errors; they
//! are `Option`s or outcome enums on the operations that produce them.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EpodbError {
    /// Uniqueness was requested and two elements compared equal. The
    /// array may have been partially reordered; it must be discarded or
    /// re-sorted before reuse.
    #[error("duplicate key during unique sort")]
    DuplicateKey,

    /// A caller precondition was violated. Fatal to the call.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The engine reported an update/fetch failure.
    #[error("i/o failure: {0}")]
    IoFailure(String),

    /// The cooperative worker could not accept or complete a task.
    /// Fatal to the run, unlike an operation returning its own failure.
    #[error("dispatch failure: {0}")]
    DispatchFailure(String),
}

pub(crate) fn invalid_arg(msg: impl Into<String>) -> eyre::Report {
    eyre::Report::new(EpodbError::InvalidArgument(msg.into()))
}

pub(crate) fn io_failure(msg: impl Into<String>) -> eyre::Report {
    eyre::Report::new(EpodbError::IoFailure(msg.into()))
}
