//! patcher - trace Hadoop-ecosystem wrapper scripts to their final exec
//!
//! `patcher trace` records the environment each wrapper layer builds and
//! the chain of hand-offs down to the JVM launch, and writes one result
//! file per command. `jar-dump`/`jar-diff` check whether a cluster's JAR
//! still offers the API a build was compiled against.

use anyhow::Result;
use clap::Parser;
use patcher_common::PatcherSettings;
use std::process::ExitCode;

mod cli;
mod commands;

use cli::{Cli, SubCommands};
use commands::trace::TraceTarget;

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run_main(cli) {
        Ok(code) => ExitCode::from(u8::try_from(code).unwrap_or(1)),
        Err(e) => {
            eprintln!("patcher error: {e:#}");
            ExitCode::from(2)
        }
    }
}

fn run_main(cli: Cli) -> Result<i32> {
    patcher_common::logging::init(cli.verbose)?;

    match cli.sub {
        SubCommands::Trace(args) => {
            let settings = PatcherSettings::resolve(args.overrides(), cli.config.as_deref())?;
            tracing::debug!(?settings, "resolved settings");
            let targets = match TraceTarget::from_words(&args.command) {
                Some(target) => vec![target],
                None => commands::trace::presets(),
            };
            commands::trace::run(&settings, &targets)
        }
        SubCommands::JarDump(args) => commands::jar::dump(&args.jar, args.output.as_deref()),
        SubCommands::JarDiff(args) => commands::jar::diff(&args.a, &args.b),
    }
}
