//! Error types for the mediator.
//!
//! A lookup miss is never an error: `request` answers `Ok(None)` and `notify`
//! answers `Ok(0)`. Everything here describes a handler, a receiver factory or
//! the execution context failing.

use crate::descriptor::OwnerId;
use thiserror::Error;

/// Failure raised by (or on behalf of) a single handler invocation.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// The handler was called with the wrong number of arguments.
    #[error("expected {expected} argument(s), got {actual}")]
    Arity { expected: usize, actual: usize },

    /// A positional argument could not be decoded into the parameter type.
    #[error("argument {index} could not be decoded: {source}")]
    Argument {
        index: usize,
        #[source]
        source: serde_json::Error,
    },

    /// The handler's return value could not be encoded.
    #[error("return value could not be encoded: {0}")]
    Encode(#[source] serde_json::Error),

    /// The cached receiver is not of the type the handler was declared on.
    #[error("receiver is not a `{expected}`")]
    ReceiverType { expected: &'static str },

    /// The handler panicked; the panic was contained.
    #[error("handler panicked: {0}")]
    Panicked(String),

    /// The handler reported a failure of its own.
    #[error("{0}")]
    Failed(String),
}

impl HandlerError {
    /// Wrap any displayable error returned by a handler body.
    pub fn failed<E: std::fmt::Display>(err: E) -> Self {
        HandlerError::Failed(err.to_string())
    }
}

/// A receiver factory could not produce an instance.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct ConstructionError(pub String);

impl ConstructionError {
    pub fn new<E: std::fmt::Display>(err: E) -> Self {
        ConstructionError(err.to_string())
    }
}

/// One subscriber that failed during a `notify` call.
#[derive(Debug)]
pub struct SubscriberFailure {
    /// Owner of the failing subscriber
    pub owner: OwnerId,
    /// Short name of the failing handler
    pub handler: String,
    /// What went wrong
    pub error: MediatorError,
}

/// Main error type for all mediator operations.
#[derive(Debug, Error)]
pub enum MediatorError {
    /// The target's handler failed.
    #[error("target '{target}' failed: {source}")]
    Handler {
        target: String,
        #[source]
        source: HandlerError,
    },

    /// The owner's receiver could not be constructed.
    #[error("receiver for owner '{owner}' could not be constructed: {source}")]
    Construction {
        owner: OwnerId,
        #[source]
        source: ConstructionError,
    },

    /// Some subscribers of a notification failed; the rest still ran.
    #[error("{} of {invoked} subscriber(s) of '{name}' failed", failures.len())]
    SubscriberFailures {
        name: String,
        invoked: usize,
        failures: Vec<SubscriberFailure>,
    },

    /// The execution context refused the job.
    #[error("executor refused the job: {0}")]
    ExecutorClosed(String),

    /// An asynchronous dispatch was dropped before it produced a result.
    #[error("asynchronous dispatch of '{0}' ended without a result")]
    Abandoned(String),
}

/// Result type alias using MediatorError.
pub type Result<T> = std::result::Result<T, MediatorError>;

/// Result of a single handler invocation.
pub type HandlerResult = std::result::Result<serde_json::Value, HandlerError>;
