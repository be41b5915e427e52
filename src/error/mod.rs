use std::{error::Error, fmt};

const ERR_MSG_TIMEOUT: &str = "operation timed out";
const ERR_MSG_CLOSED: &str = "queue is shut down and drained";
const ERR_MSG_INTERRUPTED: &str = "wait interrupted";

/// Why a fetch from a [`BlockingQueue`](crate::io::queue::BlockingQueue) produced no item.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum RecvError {
    /// Timed wait elapsed with nothing queued.
    Timeout,
    /// Queue is shut down and has no items left.
    Closed,
    /// The caller's activity predicate turned false while waiting.
    Interrupted,
}

impl Error for RecvError {}

impl fmt::Display for RecvError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecvError::Timeout => write!(f, "{ERR_MSG_TIMEOUT}"),
            RecvError::Closed => write!(f, "{ERR_MSG_CLOSED}"),
            RecvError::Interrupted => write!(f, "{ERR_MSG_INTERRUPTED}"),
        }
    }
}

/// Lifecycle and construction errors, reported synchronously to the caller.
#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
    #[error("executor is already running")]
    AlreadyRunning,
    #[error("control command target executor is gone")]
    MissingTarget,
    #[error("cannot join the worker from the worker thread")]
    JoinFromWorker,
    #[error("worker thread panicked")]
    WorkerPanicked,
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("invalid executor config: {0}")]
    InvalidConfig(String),
}

/// What went wrong inside a single `execute()` call.
#[derive(Debug)]
pub enum FailureReason {
    Error(anyhow::Error),
    Panic(String),
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::Error(err) => write!(f, "{err:#}"),
            FailureReason::Panic(msg) => write!(f, "panicked: {msg}"),
        }
    }
}

/// A command failure as seen by the worker loop and the failure hook.
#[derive(Debug)]
pub struct CommandFailure {
    pub command: String,
    pub reason: FailureReason,
}

impl CommandFailure {
    pub fn is_panic(&self) -> bool {
        matches!(self.reason, FailureReason::Panic(_))
    }
}

impl fmt::Display for CommandFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "command {} failed: {}", self.command, self.reason)
    }
}

impl Error for CommandFailure {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match &self.reason {
            FailureReason::Error(err) => Some(err.as_ref()),
            FailureReason::Panic(_) => None,
        }
    }
}
