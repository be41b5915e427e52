use crate::command::Command;
use crate::error::ExecutorError;
use crate::executor::Executor;
use crate::state::ExecutorState;
use anyhow::{Result, anyhow};
use std::sync::{Arc, Weak};

/// Weak link from a queued control command back to its executor.
///
/// Weak so that a command sitting in the queue does not keep the executor
/// (which owns the queue) alive.
#[derive(Clone)]
struct Target(Weak<Executor>);

impl Target {
    fn new(executor: &Arc<Executor>) -> Self {
        Self(Arc::downgrade(executor))
    }

    fn from_weak(target: Weak<Executor>) -> Result<Self, ExecutorError> {
        if target.strong_count() == 0 {
            return Err(ExecutorError::MissingTarget);
        }
        Ok(Self(target))
    }

    fn get(&self) -> Result<Arc<Executor>> {
        self.0
            .upgrade()
            .ok_or_else(|| anyhow!(ExecutorError::MissingTarget))
    }
}

/// Queued request for a graceful stop: everything ahead of and behind it in
/// the queue still runs, then the worker halts.
#[derive(Clone)]
pub struct SoftStopCommand {
    target: Target,
}

impl SoftStopCommand {
    pub fn new(executor: &Arc<Executor>) -> Self {
        Self {
            target: Target::new(executor),
        }
    }

    pub fn from_weak(executor: Weak<Executor>) -> Result<Self, ExecutorError> {
        Ok(Self {
            target: Target::from_weak(executor)?,
        })
    }
}

impl Command for SoftStopCommand {
    fn execute(&self) -> Result<()> {
        self.target.get()?.soft_stop();
        Ok(())
    }

    fn name(&self) -> &str {
        "soft-stop"
    }
}

/// Queued request for an immediate stop: commands behind it are discarded.
#[derive(Clone)]
pub struct HardStopCommand {
    target: Target,
}

impl HardStopCommand {
    pub fn new(executor: &Arc<Executor>) -> Self {
        Self {
            target: Target::new(executor),
        }
    }

    pub fn from_weak(executor: Weak<Executor>) -> Result<Self, ExecutorError> {
        Ok(Self {
            target: Target::from_weak(executor)?,
        })
    }
}

impl Command for HardStopCommand {
    fn execute(&self) -> Result<()> {
        self.target.get()?.hard_stop();
        Ok(())
    }

    fn name(&self) -> &str {
        "hard-stop"
    }
}

/// Queued state replacement. Switching to [`ExecutorState::Stopped`] ends
/// the loop but leaves the queue open.
#[derive(Clone)]
pub struct StateChangeCommand {
    target: Target,
    state: ExecutorState,
}

impl StateChangeCommand {
    pub fn new(executor: &Arc<Executor>, state: ExecutorState) -> Self {
        Self {
            target: Target::new(executor),
            state,
        }
    }

    pub fn from_weak(executor: Weak<Executor>, state: ExecutorState) -> Result<Self, ExecutorError> {
        Ok(Self {
            target: Target::from_weak(executor)?,
            state,
        })
    }

    pub fn state(&self) -> ExecutorState {
        self.state
    }
}

impl Command for StateChangeCommand {
    fn execute(&self) -> Result<()> {
        self.target.get()?.set_state(self.state);
        Ok(())
    }

    fn name(&self) -> &str {
        "state-change"
    }
}
