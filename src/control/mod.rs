mod commands;

pub use commands::{HardStopCommand, SoftStopCommand, StateChangeCommand};
