use std::time::Duration;
use thiserror::Error;

/// Why an isolated task produced no value.
///
/// `Raised` carries the task's own error; every other variant is raised by
/// the runner about the worker process.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum IsolateError<E> {
    #[error("task did not finish within {0:?}")]
    Timeout(Duration),
    #[error("{0}")]
    Raised(E),
    #[error("task panicked: {0}")]
    Panicked(String),
    #[error("result could not cross the worker channel: {0}")]
    Serialization(String),
    #[error("worker exited without a result ({0})")]
    WorkerCrashed(String),
    #[error("isolation failed: {0}")]
    Os(String),
}

impl<E> IsolateError<E> {
    pub fn is_timeout(&self) -> bool {
        matches!(self, IsolateError::Timeout(_))
    }

    /// The task's own error, if it returned one.
    pub fn raised(&self) -> Option<&E> {
        match self {
            IsolateError::Raised(err) => Some(err),
            _ => None,
        }
    }
}

pub(crate) fn os_error<E>(prefix: &str, err: impl std::fmt::Display) -> IsolateError<E> {
    IsolateError::Os(format!("{prefix}: {err}"))
}
