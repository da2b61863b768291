use std::result;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::task::TaskId;

pub type Result<T, E = Error> = result::Result<T, E>;

/// Failure raised while a task executes against the proxied object.
///
/// These travel inside a [`TaskResult`](crate::task::TaskResult) and are only ever
/// observed through the future of the task that produced them.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
pub enum RemoteError {
    #[error("object has no attribute `{0}`")]
    NoAttribute(String),
    #[error("attribute `{0}` is not callable")]
    NotCallable(String),
    #[error("attribute `{0}` can not be read as a value")]
    NotAValue(String),
    #[error("missing argument `{0}`")]
    MissingArgument(String),
    #[error("invalid argument `{name}`: {reason}")]
    InvalidArgument { name: String, reason: String },
    #[error("{0}")]
    Raised(String),
    #[error("target panicked: {0}")]
    Panicked(String),
}

impl RemoteError {
    pub fn raised(message: impl Into<String>) -> Self {
        RemoteError::Raised(message.into())
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Remote(#[from] RemoteError),
    #[error("task {0} was never submitted or has already been resolved")]
    InvalidTaskReference(TaskId),
    #[error("task {0} was cancelled")]
    Cancelled(TaskId),
    #[error("{0} is not supported")]
    NotSupported(&'static str),
    #[error("no result arrived within {0:?}")]
    Timeout(Duration),
    #[error("worker has been terminated")]
    Terminated,
    #[error("worker stopped before delivering every result")]
    Disconnected,
    #[error("can not block on a result from inside an async runtime")]
    BlockingInRuntime,
    #[error("failed to start worker runtime: {0}")]
    Io(#[from] std::io::Error),
}
