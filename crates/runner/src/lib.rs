//! Process plumbing for the patcher tools
//!
//! Everything here talks to the operating system on behalf of the tracer:
//!
//! 1. [`process`] runs a command line through the shell, merging stdout and
//!    stderr, optionally echoing live and enforcing a timeout
//! 2. [`resolver`] finds commands on a clean, de-duplicated `PATH`
//! 3. [`classify`] asks `file(1)` whether a path is a shell script or a
//!    terminal binary

#[cfg(not(unix))]
compile_error!("patcher-runner needs a Unix host with a POSIX shell and file(1)");

pub mod classify;
pub mod process;
pub mod resolver;

pub use classify::{is_shell_script_description, FileProbe, ScriptProbe};
pub use process::{
    run, shell_quote, CommandOutput, CommandRunner, ProcessError, RunOptions, ShellRunner,
};
pub use resolver::{is_executable, which};
