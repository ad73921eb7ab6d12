//! Exec-chain tracing for wrapper scripts.
//!
//! Distribution launchers like `hadoop` or `hive` are layers of shell
//! scripts that set environment variables and `exec` into one another
//! before a JVM finally starts. This crate runs such a command under
//! `bash -x`, scrapes the variable assignments and hand-offs out of the
//! trace, and keeps re-tracing synthesized debug scripts until the chain
//! ends in a binary.
//!
//! ```no_run
//! use patcher_runner::{FileProbe, ShellRunner};
//! use patcher_trace::{ResultStore, Tracer, TracerConfig};
//! use std::path::Path;
//!
//! let tracer = Tracer::new(ShellRunner::default(), FileProbe::default(), TracerConfig::default());
//! let result = tracer.trace(Path::new("/usr/bin/hadoop"), "fs -ls /")?;
//! let store = ResultStore::for_format("yaml")?;
//! store.save(&result, &store.results_path(Path::new("."), "/usr/bin/hadoop"))?;
//! # Ok::<(), patcher_trace::TraceError>(())
//! ```

pub mod error;
pub mod exec;
pub mod output;
pub mod scrape;
pub mod synth;
pub mod tracer;
pub mod vars;

pub use error::TraceError;
pub use exec::ExecEvent;
pub use output::ResultStore;
pub use scrape::{
    extract_exec_events, extract_exec_lines, parse_assignment, scan_script_file, scrape,
    scrape_variables, strip_trace_prefix, ScrapedTrace,
};
pub use synth::{render_debug_script, synthesize, trace_command_line, DebugScript};
pub use tracer::{TraceResult, Tracer, TracerConfig};
pub use vars::{EnvVarRecord, VarHistory};
