//! Debug script synthesis.
//!
//! The generated script re-creates the captured environment and re-invokes
//! each known exec target under trace mode, so the next level of the chain
//! shows up in the trace output.

use patcher_runner::shell_quote;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::TempPath;
use tracing::{debug, info};

use crate::error::TraceError;
use crate::exec::ExecEvent;
use crate::vars::VarHistory;

/// A synthesized script on disk. Removed on drop unless it was kept.
#[derive(Debug)]
pub struct DebugScript {
    path: PathBuf,
    _temp: Option<TempPath>,
}

impl DebugScript {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Render the script text.
///
/// Each variable is exported with its last observed value, except array
/// literals, which can only be assigned. A JVM exec target stops rendering
/// with [`TraceError::UnsupportedTerminal`].
pub fn render_debug_script(
    vars: &VarHistory,
    events: &[ExecEvent],
    trace_shell: &str,
) -> Result<String, TraceError> {
    let mut script = format!("#!/usr/bin/env {trace_shell}\n");

    for record in vars.iter() {
        let Some(value) = record.last_value() else {
            continue;
        };
        if record.is_array() {
            script.push_str(&format!("{}={}\n", record.name(), value));
        } else {
            script.push_str(&format!("export {}={}\n", record.name(), value));
        }
    }

    for event in events {
        if event.is_jvm_launch() {
            return Err(TraceError::UnsupportedTerminal {
                target: event.target.clone(),
            });
        }
        let mut line = format!("{trace_shell} -x {}", quote_target(&event.target));
        if !event.args.is_empty() {
            line.push(' ');
            line.push_str(&event.args);
        }
        script.push_str(&line);
        script.push('\n');
    }

    Ok(script)
}

/// Exec targets may carry `$VAR` references from the wrapper script, so
/// they are double-quoted (expansion still happens) only when they need it.
fn quote_target(target: &str) -> String {
    let plain = !target.is_empty()
        && target
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "/._-+:,@%=${}".contains(c));
    if plain {
        return target.to_string();
    }
    let mut quoted = String::with_capacity(target.len() + 2);
    quoted.push('"');
    for c in target.chars() {
        if matches!(c, '"' | '\\' | '`') {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('"');
    quoted
}

/// Render and write the script to a freshly created temporary file.
pub fn synthesize(
    vars: &VarHistory,
    events: &[ExecEvent],
    trace_shell: &str,
    keep: bool,
) -> Result<DebugScript, TraceError> {
    let script = render_debug_script(vars, events, trace_shell)?;

    let mut file = tempfile::Builder::new()
        .prefix("patcher-debug-")
        .suffix(".sh")
        .tempfile()
        .map_err(|e| TraceError::io(std::env::temp_dir(), e))?;
    file.write_all(script.as_bytes())
        .and_then(|_| file.flush())
        .map_err(|e| TraceError::io(file.path(), e))?;

    let temp = file.into_temp_path();
    let path = temp.to_path_buf();
    debug!(path = %path.display(), vars = vars.len(), execs = events.len(), "wrote debug script");

    if keep {
        let kept = temp.keep().map_err(|e| TraceError::io(&path, e.error))?;
        info!(path = %kept.display(), "keeping debug script");
        return Ok(DebugScript {
            path: kept,
            _temp: None,
        });
    }

    Ok(DebugScript {
        path,
        _temp: Some(temp),
    })
}

/// Command line that runs `script` under trace mode with `args`.
pub fn trace_command_line(trace_shell: &str, script: &Path, args: &str) -> String {
    let mut line = format!(
        "{trace_shell} -x {}",
        shell_quote(&script.display().to_string())
    );
    if !args.is_empty() {
        line.push(' ');
        line.push_str(args);
    }
    line
}
