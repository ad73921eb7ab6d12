use anyhow::Result;
use patcher_common::PatcherSettings;
use patcher_runner::{shell_quote, which, FileProbe, ShellRunner};
use patcher_trace::{ResultStore, Tracer, TracerConfig};
use tracing::{error, info, warn};

/// Commands traced when none is given: one entry point per common
/// Hadoop-ecosystem client.
const PRESETS: &[(&str, &str)] = &[
    ("hadoop", "fs -ls /"),
    ("mapred", "job -list all"),
    ("yarn", "application -list"),
    ("hive", "-e \"show tables\""),
    ("beeline", "-e \"show tables\""),
    ("spark-shell", "--version"),
];

/// A command name or path plus its arguments as shell text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceTarget {
    pub command: String,
    pub args: String,
}

impl TraceTarget {
    /// Build from argv-style words, quoting each argument for the shell.
    pub fn from_words(words: &[String]) -> Option<Self> {
        let (command, args) = words.split_first()?;
        Some(Self {
            command: command.clone(),
            args: args
                .iter()
                .map(|arg| shell_quote(arg))
                .collect::<Vec<_>>()
                .join(" "),
        })
    }
}

pub fn presets() -> Vec<TraceTarget> {
    PRESETS
        .iter()
        .map(|(command, args)| TraceTarget {
            command: command.to_string(),
            args: args.to_string(),
        })
        .collect()
}

/// Trace every target in turn and write one result file per command.
///
/// Returns the exit code of the last traced subprocess, or 1 if any trace
/// aborted.
pub fn run(settings: &PatcherSettings, targets: &[TraceTarget]) -> Result<i32> {
    let store = ResultStore::for_format(&settings.format)?;
    let tracer = Tracer::new(
        ShellRunner::default(),
        FileProbe::default(),
        TracerConfig {
            trace_shell: settings.trace_shell.clone(),
            stream: settings.stream,
            timeout: settings.timeout,
            max_depth: settings.max_depth,
            keep_scripts: settings.keep_scripts,
        },
    );

    let mut exit_code = 0;
    let mut aborted = false;

    for target in targets {
        let Some(path) = which(&target.command) else {
            warn!(command = %target.command, "command not found; skipping");
            continue;
        };

        let result = match tracer.trace(&path, &target.args) {
            Ok(result) => result,
            Err(err) => {
                error!(command = %target.command, "trace aborted: {err}");
                aborted = true;
                continue;
            }
        };

        let results_path = store.results_path(&settings.output_dir, &target.command);
        if let Err(err) = store.save(&result, &results_path) {
            error!(command = %target.command, "could not save results: {err}");
            aborted = true;
            continue;
        }
        info!(
            command = %target.command,
            path = %results_path.display(),
            "results written"
        );
        exit_code = result.exit_code;
    }

    Ok(if aborted { 1 } else { exit_code })
}
