pub mod queue;

pub use queue::{BlockingQueue, CommandQueue};
