//! Errors.

use thiserror::Error;

/// An error arming a timer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum TimerError {
    /// There is no async runtime to run the timer on.
    #[error("Unable to arm timer: not running inside a tokio runtime")]
    NoRuntime,

    /// Whatever was going to receive the timer firing has gone away.
    #[error("Unable to arm timer: receiver closed")]
    Closed,
}

/// An error returned by the [`Pacer`](crate::Pacer) entry points.
///
/// Steady-state failures never show up here: a timer that can't be re-armed mid-run just sends the
/// pacer into draining. Only `start()` and misuse are reported.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum PacerError {
    /// `start()` was called more than once.
    #[error("The load generator has already been started")]
    AlreadyStarted,

    /// A reply arrived before `start()`.
    #[error("Reply received before the load generator was started")]
    NotStarted,

    /// A reply arrived after the run already reported that it was done.
    #[error("Reply received after the load generator finished")]
    Finished,

    /// A reply arrived while there were no requests outstanding.
    #[error("Reply received with no requests outstanding")]
    UnexpectedReply,

    /// The first timer could not be armed, so nothing was sent.
    #[error("Unable to start pacing")]
    Timer(#[source] TimerError),
}

/// An error talking to a background [`LoadGenerator`](crate::LoadGenerator).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum GeneratorError {
    /// The worker task is no longer running.
    ///
    /// Unrecoverable.
    #[error("The load generator worker has shut down")]
    WorkerGone,

    /// The worker could not start the run.
    #[error("The load generator failed to start")]
    Start(#[source] PacerError),
}

impl From<TimerError> for PacerError {
    fn from(err: TimerError) -> Self {
        PacerError::Timer(err)
    }
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for GeneratorError {
    fn from(_tx_err: tokio::sync::mpsc::error::SendError<T>) -> Self {
        GeneratorError::WorkerGone
    }
}

impl From<tokio::sync::oneshot::error::RecvError> for GeneratorError {
    fn from(_rx_err: tokio::sync::oneshot::error::RecvError) -> Self {
        GeneratorError::WorkerGone
    }
}

/// Result alias for [`GeneratorError`].
pub type GeneratorResult<T> = std::result::Result<T, GeneratorError>;
