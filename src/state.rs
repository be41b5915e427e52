use crate::command::CommandRef;
use crate::error::RecvError;
use crate::io::queue::CommandQueue;
use crossbeam::utils::CachePadded;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

/// Lifecycle phase of an [`Executor`](crate::executor::Executor).
///
/// Each phase decides how the worker fetches its next command and whether the
/// loop keeps going.
#[derive(Debug, Copy, Clone, Hash, Eq, PartialEq)]
#[repr(u8)]
pub enum ExecutorState {
    /// Blocking fetch; an empty queue keeps the worker parked.
    Running = 0,
    /// Non-blocking fetch; an empty queue ends the loop.
    SoftStopping = 1,
    /// Terminal. The loop does not run.
    Stopped = 2,
}

/// Events that move the state machine.
#[derive(Debug, Copy, Clone, Hash, Eq, PartialEq)]
pub enum Transition {
    SoftStop,
    HardStop,
    /// The fetch policy found nothing more to do.
    Drained,
}

/// Result of one fetch step.
pub enum Fetch {
    Command(CommandRef),
    /// State changed under the worker; fetch again with the new state.
    Retry,
    Exit,
}

impl ExecutorState {
    /// Transition table. `None` means the event does not apply in this state.
    #[inline]
    pub fn next(self, t: Transition) -> Option<ExecutorState> {
        use ExecutorState::*;
        match (self, t) {
            (Running, Transition::SoftStop) => Some(SoftStopping),
            (Running | SoftStopping, Transition::HardStop) => Some(Stopped),
            (Running | SoftStopping, Transition::Drained) => Some(Stopped),
            _ => None,
        }
    }

    /// Fetch the next command according to this state's policy.
    pub fn fetch(self, queue: &CommandQueue, flag: &StateFlag) -> Fetch {
        match self {
            ExecutorState::Running => {
                match queue.pop_while(|| flag.get() == ExecutorState::Running) {
                    Ok(cmd) => Fetch::Command(cmd),
                    Err(RecvError::Closed) => match flag.apply(Transition::Drained) {
                        Some(_) => {
                            tracing::warn!("[Executor] queue closed while running");
                            Fetch::Exit
                        }
                        None => Fetch::Retry,
                    },
                    Err(RecvError::Interrupted | RecvError::Timeout) => Fetch::Retry,
                }
            }
            ExecutorState::SoftStopping => match queue.try_pop() {
                Some(cmd) => Fetch::Command(cmd),
                None if flag.compare_exchange(self, ExecutorState::Stopped) => Fetch::Exit,
                None => Fetch::Retry,
            },
            ExecutorState::Stopped => Fetch::Exit,
        }
    }

    #[inline]
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => ExecutorState::Running,
            1 => ExecutorState::SoftStopping,
            _ => ExecutorState::Stopped,
        }
    }
}

impl fmt::Display for ExecutorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExecutorState::Running => "running",
            ExecutorState::SoftStopping => "soft-stopping",
            ExecutorState::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

/// Atomically swappable handle to the current [`ExecutorState`].
///
/// Shared between the executor, its worker and any control command.
#[derive(Clone)]
#[repr(transparent)]
pub struct StateFlag(Arc<CachePadded<AtomicU8>>);

impl StateFlag {
    pub fn new(initial: ExecutorState) -> Self {
        Self(Arc::new(CachePadded::new(AtomicU8::new(initial as u8))))
    }

    #[inline]
    pub fn get(&self) -> ExecutorState {
        ExecutorState::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Unconditionally replace the state, returning the previous one.
    #[inline]
    pub fn set(&self, next: ExecutorState) -> ExecutorState {
        ExecutorState::from_u8(self.0.swap(next as u8, Ordering::AcqRel))
    }

    /// Replace `current` with `next` only if the state is still `current`.
    #[inline]
    pub fn compare_exchange(&self, current: ExecutorState, next: ExecutorState) -> bool {
        self.0
            .compare_exchange(current as u8, next as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Apply `t` to the current state. Returns the `(from, to)` pair if the
    /// transition happened, `None` if it does not apply.
    pub fn apply(&self, t: Transition) -> Option<(ExecutorState, ExecutorState)> {
        let mut cur = self.get();
        loop {
            let next = cur.next(t)?;
            match self.0.compare_exchange_weak(
                cur as u8,
                next as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Some((cur, next)),
                Err(raw) => cur = ExecutorState::from_u8(raw),
            }
        }
    }
}

impl fmt::Debug for StateFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateFlag")
            .field("state", &self.get())
            .finish()
    }
}
