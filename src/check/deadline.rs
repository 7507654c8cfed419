//! Hard wall-clock bound around a backend operation.
//!
//! The guarded future is dropped when the deadline expires. Everything it
//! owns (socket halves, the child process handle, the temporary input file)
//! is released by that drop, so the timeout path needs no cleanup code of its
//! own.

use std::future::Future;
use std::time::Duration;

tokio::task_local! {
    static DEADLINE_ACTIVE: ();
}

/// Outcome of a guarded operation.
#[derive(Debug)]
pub enum Deadline<T, E> {
    /// The operation finished in time and succeeded.
    Completed(T),
    /// The deadline expired first. Partial results are gone.
    TimedOut,
    /// The guard could not run the operation, or the operation failed.
    Failed(DeadlineError<E>),
}

/// Failure of a guarded operation that is not a timeout.
#[derive(thiserror::Error, Debug)]
pub enum DeadlineError<E> {
    /// The timer could not be armed.
    #[error("Deadline could not be armed: {0}")]
    Unarmed(String),

    /// A deadline is already active on this task.
    #[error("Nested deadline")]
    Nested,

    /// The operation itself failed before the deadline.
    #[error(transparent)]
    Operation(E),
}

impl<T, E> Deadline<T, E> {
    #[must_use]
    pub fn is_timed_out(&self) -> bool {
        matches!(self, Self::TimedOut)
    }
}

/// Run `operation` with an upper bound of `timeout` wall-clock time.
///
/// Exactly one deadline may be active per task: a call made from inside
/// another guarded operation fails with [`DeadlineError::Nested`]. A zero
/// timeout or a missing tokio runtime fails with [`DeadlineError::Unarmed`].
pub async fn run_with_deadline<F, T, E>(timeout: Duration, operation: F) -> Deadline<T, E>
where
    F: Future<Output = Result<T, E>>,
{
    if timeout.is_zero() {
        return Deadline::Failed(DeadlineError::Unarmed("zero timeout".to_string()));
    }
    if let Err(e) = tokio::runtime::Handle::try_current() {
        return Deadline::Failed(DeadlineError::Unarmed(e.to_string()));
    }
    if DEADLINE_ACTIVE.try_with(|_| ()).is_ok() {
        return Deadline::Failed(DeadlineError::Nested);
    }

    let guarded = DEADLINE_ACTIVE.scope((), tokio::time::timeout(timeout, operation));
    match guarded.await {
        Ok(Ok(value)) => Deadline::Completed(value),
        Ok(Err(e)) => Deadline::Failed(DeadlineError::Operation(e)),
        Err(_) => {
            tracing::debug!(timeout_ms = timeout.as_millis(), "Deadline expired");
            Deadline::TimedOut
        }
    }
}
