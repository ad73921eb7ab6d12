//! Recursive tracing of wrapper scripts.
//!
//! A top-level trace runs the command once under `bash -x`, then hands the
//! captured environment and the script's exec target to [`Tracer::step`].
//! Each step writes a debug script, runs it under trace mode, and follows a
//! single discovered hand-off into the next script until a binary is hit.

use patcher_runner::{CommandRunner, RunOptions, ScriptProbe};
use serde::Serialize;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::TraceError;
use crate::exec::{unquote, ExecEvent};
use crate::scrape::{scan_script_file, scrape};
use crate::synth::{synthesize, trace_command_line};
use crate::vars::VarHistory;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TracerConfig {
    pub trace_shell: String,
    pub stream: bool,
    pub timeout: Option<Duration>,
    pub max_depth: usize,
    pub keep_scripts: bool,
}

impl Default for TracerConfig {
    fn default() -> Self {
        Self {
            trace_shell: "bash".to_string(),
            stream: true,
            timeout: None,
            max_depth: 8,
            keep_scripts: false,
        }
    }
}

impl TracerConfig {
    fn run_options(&self) -> RunOptions {
        RunOptions {
            stream: self.stream,
            timeout: self.timeout,
        }
    }
}

/// Merged outcome of one top-level trace.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TraceResult {
    pub vars: VarHistory,
    pub execs: Vec<ExecEvent>,
    /// Exit code of the last traced subprocess
    #[serde(skip)]
    pub exit_code: i32,
}

/// What one step and everything below it discovered.
#[derive(Debug, Default)]
struct Discovered {
    vars: VarHistory,
    execs: Vec<ExecEvent>,
    exit_code: i32,
}

pub struct Tracer<R, P> {
    runner: R,
    probe: P,
    config: TracerConfig,
}

impl<R: CommandRunner, P: ScriptProbe> Tracer<R, P> {
    pub fn new(runner: R, probe: P, config: TracerConfig) -> Self {
        Self {
            runner,
            probe,
            config,
        }
    }

    pub fn config(&self) -> &TracerConfig {
        &self.config
    }

    /// Trace `command` (a script path) invoked with the shell-level `args`.
    pub fn trace(&self, command: &Path, args: &str) -> Result<TraceResult, TraceError> {
        let origin = command.display().to_string();
        info!(command = %origin, args, "tracing");

        let mut seed = scan_script_file(command)?;
        let first = self.run_traced(command, args)?;
        let scraped = scrape(&first.output, &self.probe);
        debug!(
            vars = scraped.vars.len(),
            static_execs = seed.len(),
            "scraped top-level trace"
        );

        if seed.is_empty() {
            debug!("no literal exec in script; seeding from the first trace");
            seed = scraped
                .events
                .into_iter()
                .map(|event| event.or_origin(Some(&origin)))
                .collect();
            if seed.len() > 1 {
                return Err(TraceError::AmbiguousExecChain {
                    reason: format!("first trace of {origin} produced {} exec lines", seed.len()),
                    events: seed,
                });
            }
        }

        let mut vars = scraped.vars;
        let mut execs = seed.clone();
        let mut exit_code = first.exit_code;

        if !seed.is_empty() {
            let below = self.step(&vars, seed, args, 1)?;
            vars.merge(below.vars);
            execs.extend(below.execs);
            exit_code = below.exit_code;
        }

        if let Some(last) = execs.last() {
            if self.args_name_a_script(&last.args) {
                return Err(TraceError::AmbiguousExecChain {
                    reason: format!(
                        "arguments of final exec `{}` still reference a script",
                        last.target
                    ),
                    events: execs,
                });
            }
        }

        info!(
            command = %origin,
            vars = vars.len(),
            execs = execs.len(),
            exit_code,
            "trace complete"
        );
        Ok(TraceResult {
            vars,
            execs,
            exit_code,
        })
    }

    /// Re-run `chain` under the `known` environment and follow what it
    /// hands off to. Returns only what this step and its children found.
    fn step(
        &self,
        known: &VarHistory,
        chain: Vec<ExecEvent>,
        args: &str,
        depth: usize,
    ) -> Result<Discovered, TraceError> {
        let origin = chain.last().map(|event| event.target.clone());
        if depth > self.config.max_depth {
            return Err(TraceError::DepthExceeded {
                max_depth: self.config.max_depth,
                target: origin.unwrap_or_default(),
            });
        }

        let script = synthesize(
            known,
            &chain,
            &self.config.trace_shell,
            self.config.keep_scripts,
        )?;
        let output = self.run_traced(script.path(), args)?;
        let scraped = scrape(&output.output, &self.probe);

        let found: Vec<ExecEvent> = scraped
            .events
            .into_iter()
            .map(|event| event.or_origin(origin.as_deref()))
            .collect();
        debug!(depth, vars = scraped.vars.len(), execs = found.len(), "scraped debug trace");

        if found.len() > 1 {
            return Err(TraceError::AmbiguousExecChain {
                reason: format!("debug trace at depth {depth} produced {} exec lines", found.len()),
                events: found,
            });
        }

        let mut discovered = Discovered {
            vars: scraped.vars,
            execs: found,
            exit_code: output.exit_code,
        };

        let next = discovered.execs.last().cloned();
        if let Some(next) = next {
            if self.probe.is_script(&next.target) {
                info!(depth, target = %next.target, "exec target is a script; recursing");
                let mut accumulated = known.clone();
                accumulated.merge(discovered.vars.clone());

                let reentry = vec![ExecEvent::reentry(&next.target, &next.args)];
                let below = self.step(&accumulated, reentry, &next.args, depth + 1)?;
                discovered.vars.merge(below.vars);
                discovered.execs.extend(below.execs);
                discovered.exit_code = below.exit_code;
            } else {
                debug!(depth, target = %next.target, "exec target is terminal");
            }
        }

        Ok(discovered)
    }

    fn run_traced(
        &self,
        script: &Path,
        args: &str,
    ) -> Result<patcher_runner::CommandOutput, TraceError> {
        let command_line = trace_command_line(&self.config.trace_shell, script, args);
        let output = self.runner.run(&command_line, &self.config.run_options())?;
        if output.timed_out {
            warn!(command = %command_line, "trace timed out; scraping partial output");
        }
        Ok(output)
    }

    fn args_name_a_script(&self, args: &str) -> bool {
        args.split_whitespace()
            .map(unquote)
            .filter(|word| word.contains('/'))
            .any(|word| self.probe.is_script(word))
    }
}
