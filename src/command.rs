use anyhow::Result;
use std::sync::Arc;

/// A unit of work executed by the [`Executor`](crate::executor::Executor) worker.
///
/// Commands carry whatever state they need and are executed at most once per
/// enqueue, on the worker thread only. A command that never returns stalls the
/// whole executor.
pub trait Command: Send + Sync {
    /// Perform the work. Errors are reported by the worker and never reach producers.
    fn execute(&self) -> Result<()>;

    /// Name used in diagnostics.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// Shared handle to a command, as stored in the queue.
pub type CommandRef = Arc<dyn Command>;

impl<F> Command for F
where
    F: Fn() -> Result<()> + Send + Sync,
{
    #[inline]
    fn execute(&self) -> Result<()> {
        self()
    }
}

/// Wrap a closure into a [`CommandRef`].
#[inline]
pub fn command<F>(f: F) -> CommandRef
where
    F: Fn() -> Result<()> + Send + Sync + 'static,
{
    Arc::new(f)
}
