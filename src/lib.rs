pub mod command;
pub mod config;
pub mod control;
pub mod error;
pub mod executor;
pub mod io;
pub mod state;
pub mod utils;

pub mod prelude;
