//! External process execution.

mod runner;

pub use runner::{run_checked, run_command, CommandOutput, CommandSpec};
