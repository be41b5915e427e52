pub use crate::command::{Command, CommandRef, command};
pub use crate::config::ExecutorConfig;
pub use crate::control::{HardStopCommand, SoftStopCommand, StateChangeCommand};
pub use crate::error::{CommandFailure, ExecutorError, FailureReason, RecvError};
pub use crate::executor::{Executor, StatsSnapshot};
pub use crate::io::queue::{BlockingQueue, CommandQueue};
pub use crate::state::ExecutorState;
pub use crate::utils::logger::LoggerConfig;
