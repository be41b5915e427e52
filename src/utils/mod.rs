pub use config_io::*;
pub use core_pinner::*;
pub use health_flag::*;

mod config_io;
mod core_pinner;
mod health_flag;
pub mod logger;
