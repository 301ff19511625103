//! Shell command assembly and execution.
//!
//! The shell channel returns what a command printed but not its exit
//! status, so checked commands are suffixed with ` || echo ERR-ERR-ERR-ERR`
//! and failure is read back from the last lines of output.

mod command;
mod runner;

pub use command::{
    escape_path, Privilege, ShellCommand, ShellCommandBuilder, COMMAND_ERROR_CHECK_SUFFIX,
    ERROR_LINE_MARKER,
};
pub use runner::{CommandResult, ShellRunner};
